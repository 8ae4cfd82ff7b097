//! PS/2 keyboard scancode decoding and line editing.
//!
//! Two flat scancode-to-ASCII tables index straight off the make-code
//! byte, and a bitflag word tracks shift/control/alt/caps-lock. Ctrl+C
//! does not call `halt` from inside the ISR — it only marks the active
//! terminal `to_be_halt` and lets the next scheduler tick raise `halt(6)`,
//! since calling `halt`'s stack-unwinding `leave; ret` from inside a
//! `pushad`/`popad`-wrapped naked ISR would never restore the saved
//! registers its `iretd` epilogue expects.

use bitflags::bitflags;
use spin::Mutex;

use crate::pic;
use crate::port;

const KEYBOARD_PORT: u16 = 0x60;
const KEYBOARD_IRQ: u32 = 1;

const SC_BACKSPACE: u8 = 0x0E;
const SC_TAB: u8 = 0x0F;
const SC_ENTER: u8 = 0x1C;
const SC_LEFT_CONTROL: u8 = 0x1D;
const SC_LEFT_CONTROL_RELEASE: u8 = 0x9D;
const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_LEFT_SHIFT_RELEASE: u8 = 0xAA;
const SC_RIGHT_SHIFT_RELEASE: u8 = 0xB6;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_CTRL_L: u8 = 0x26;
const SC_CTRL_C: u8 = 0x2E;
const SC_LEFT_ALT: u8 = 0x38;
const SC_LEFT_ALT_RELEASE: u8 = 0xB8;
const SC_F1: u8 = 0x3B;
const SC_F2: u8 = 0x3C;
const SC_F3: u8 = 0x3D;

bitflags! {
    #[derive(Clone, Copy, Default)]
    struct Modifiers: u8 {
        const LEFT_SHIFT = 1 << 0;
        const RIGHT_SHIFT = 1 << 1;
        const ALT = 1 << 2;
        const CAPS_LOCK = 1 << 3;
        const CONTROL = 1 << 4;
    }
}

impl Modifiers {
    fn shifted(self) -> bool {
        self.intersects(Self::LEFT_SHIFT | Self::RIGHT_SHIFT)
    }
}

static MODIFIERS: Mutex<Modifiers> = Mutex::new(Modifiers::empty());

#[rustfmt::skip]
const UNSHIFTED: [u8; 58] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6',
    b'7', b'8', b'9', b'0', b'-', b'=', 0, 0,
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i',
    b'o', b'p', b'[', b']', 0, 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';',
    b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, 0,
    0, b' ',
];

#[rustfmt::skip]
const SHIFTED: [u8; 58] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^',
    b'&', b'*', b'(', b')', b'_', b'+', 0, 0,
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I',
    b'O', b'P', b'[', b']', 0, 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':',
    b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, 0,
    0, b' ',
];

/// Unmasks IRQ 1.
///
/// # Safety
/// Must run once, after [`crate::idt::init`], before `sti`.
pub unsafe fn init() {
    pic::enable_irq(KEYBOARD_IRQ);
}

/// Called from the keyboard's IDT gate on every scancode byte. Sends its
/// own EOI as the last step, after any editing or dispatch work is done.
pub fn handle_scancode() {
    // SAFETY: reading the keyboard's data port in its own ISR is always
    // valid and is required to clear the controller's output buffer.
    let scancode = unsafe { port::inb(KEYBOARD_PORT) };

    let mut modifiers = MODIFIERS.lock();
    match scancode {
        SC_LEFT_SHIFT => modifiers.insert(Modifiers::LEFT_SHIFT),
        SC_RIGHT_SHIFT => modifiers.insert(Modifiers::RIGHT_SHIFT),
        SC_LEFT_SHIFT_RELEASE | SC_RIGHT_SHIFT_RELEASE => {
            modifiers.remove(Modifiers::LEFT_SHIFT | Modifiers::RIGHT_SHIFT);
        }
        SC_CAPS_LOCK => modifiers.toggle(Modifiers::CAPS_LOCK),
        SC_LEFT_CONTROL => modifiers.insert(Modifiers::CONTROL),
        SC_LEFT_CONTROL_RELEASE => modifiers.remove(Modifiers::CONTROL),
        SC_LEFT_ALT => modifiers.insert(Modifiers::ALT),
        SC_LEFT_ALT_RELEASE => modifiers.remove(Modifiers::ALT),
        SC_F1 | SC_F2 | SC_F3 if modifiers.contains(Modifiers::ALT) => {
            drop(modifiers);
            let index = usize::from(scancode - SC_F1);
            crate::process::scheduler::switch_shown_terminal(index);
        }
        SC_TAB => {
            drop(modifiers);
            crate::process::scheduler::active_terminal_mut().type_tab();
        }
        SC_BACKSPACE => {
            drop(modifiers);
            crate::process::scheduler::active_terminal_mut().backspace();
        }
        SC_ENTER => {
            drop(modifiers);
            crate::process::scheduler::active_terminal_mut().enter();
        }
        _ => {
            let control = modifiers.contains(Modifiers::CONTROL);
            if control && scancode == SC_CTRL_L {
                drop(modifiers);
                super::console::clear_screen();
            } else if control && scancode == SC_CTRL_C {
                drop(modifiers);
                crate::process::scheduler::active_terminal_mut().to_be_halt = true;
            } else if let Some(&ch) = UNSHIFTED.get(usize::from(scancode)) {
                let shifted = modifiers.shifted();
                drop(modifiers);
                if ch != 0 {
                    let ch = if shifted {
                        SHIFTED[usize::from(scancode)]
                    } else {
                        ch
                    };
                    crate::process::scheduler::active_terminal_mut().type_char(ch);
                }
            }
        }
    }

    // SAFETY: acknowledging the IRQ this function was invoked for.
    unsafe { pic::send_eoi(KEYBOARD_IRQ) };
}
