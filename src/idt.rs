//! Interrupt descriptor table and exception/interrupt dispatch.
//!
//! IA-32 has no `extern "x86-interrupt"` calling convention, so the table
//! is hand-encoded here: one static table, one `init()` that loads it. The 20
//! CPU-exception handlers never return: each prints its name (and, for
//! 0x0E, the faulting address from CR2), marks the process exceptioning,
//! and calls [`crate::process::halt`], which unwinds into the parent's
//! `execute` frame and never comes back here — so, unlike a hosted
//! `x86-interrupt` handler, these are ordinary `fn() -> !`, entered by the
//! CPU's raw jump-with-pushed-frame and never expected to execute a
//! trailing `ret`. Hardware IRQs and the syscall trap genuinely return to
//! the interrupted context, so those three gates point at naked
//! save-everything/`iretd` wrappers instead.

use core::arch::naked_asm;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::SYSCALL_INTERRUPT_INDEX;
use crate::{gdt, pic, port};

const IDT_ENTRY_COUNT: usize = 256;

const KEYBOARD_VECTOR: u8 = 0x21;
const PIT_VECTOR: u8 = 0x20;
const RTC_VECTOR: u8 = 0x28;

const KEYBOARD_IRQ: u32 = 1;
const PIT_IRQ: u32 = 0;
const RTC_IRQ: u32 = 8;

/// Status `halt` reports to the parent's `execute` when the child was
/// terminated by a CPU exception rather than calling `halt` itself.
pub const EXCEPTION_HALT_STATUS: u32 = 255;

/// Set by every exception handler immediately before it calls
/// [`crate::process::halt`]; `halt` reads and clears it to decide between
/// reporting the real status and the reserved value 256.
pub static EXCEPTION_OCCURRED: AtomicBool = AtomicBool::new(false);

/// Records that the currently running process took a CPU exception.
pub fn mark_exception() {
    EXCEPTION_OCCURRED.store(true, Ordering::SeqCst);
}

/// Consumes the exception flag, returning whether it had been set.
pub fn take_exception_flag() -> bool {
    EXCEPTION_OCCURRED.swap(false, Ordering::SeqCst)
}

#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

#[derive(Clone, Copy)]
#[repr(C)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

/// Present, DPL 0, 32-bit interrupt gate (IF cleared on entry).
const INTERRUPT_GATE_DPL0: u8 = 0x8E;
/// Present, DPL 0, 32-bit trap gate (IF left alone on entry).
const TRAP_GATE_DPL0: u8 = 0x8F;
/// Present, DPL 3, 32-bit trap gate: reachable by `int` from ring 3.
const TRAP_GATE_DPL3: u8 = 0xEF;

static mut IDT: [IdtEntry; IDT_ENTRY_COUNT] = [IdtEntry::missing(); IDT_ENTRY_COUNT];

macro_rules! exception_handler {
    ($name:ident, $message:literal) => {
        extern "C" fn $name() -> ! {
            crate::serial_println!("Exception: {}", $message);
            mark_exception();
            crate::process::halt(EXCEPTION_HALT_STATUS)
        }
    };
}

exception_handler!(divide_by_zero, "0x00 Divide By Zero");
exception_handler!(debug, "0x01 Debug");
exception_handler!(non_maskable_interrupt, "0x02 Non-Maskable Interrupt");
exception_handler!(breakpoint, "0x03 Breakpoint");
exception_handler!(overflow, "0x04 Overflow");
exception_handler!(bound_range_exceeded, "0x05 Bound Range Exceeded");
exception_handler!(invalid_opcode, "0x06 Invalid Opcode");
exception_handler!(device_not_available, "0x07 Device Not Available");
exception_handler!(double_fault, "0x08 Double Fault");
exception_handler!(coprocessor_segment_overrun, "0x09 Coprocessor Segment Overrun");
exception_handler!(invalid_tss, "0x0A Invalid TSS");
exception_handler!(segment_not_present, "0x0B Segment Not Present");
exception_handler!(stack_segment_fault, "0x0C Stack-Segment Fault");
exception_handler!(general_protection, "0x0D General Protection");
exception_handler!(reserved_0f, "0x0F Reserved");
exception_handler!(x87_floating_point, "0x10 x87 FPU Floating-Point Error");
exception_handler!(alignment_check, "0x11 Alignment Check");
exception_handler!(machine_check, "0x12 Machine Check");
exception_handler!(simd_floating_point, "0x13 SIMD Floating-Point");

extern "C" fn page_fault() -> ! {
    // SAFETY: reading CR2 inside a page-fault handler is always valid; it
    // holds the linear address that faulted.
    let faulting_address = unsafe { port::read_cr2() };
    crate::serial_println!("Exception: 0x0E Page Fault (at {:#x})", faulting_address);
    mark_exception();
    crate::process::halt(EXCEPTION_HALT_STATUS)
}

/// Saves every caller-visible register, runs `$body`, restores them, and
/// `iretd`s back to the interrupted context. The one asm block every
/// hardware IRQ and the syscall trap share.
macro_rules! interrupt_wrapper {
    ($name:ident, $body:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            // SAFETY: this is the sole body of an IDT gate target; the CPU
            // has already pushed EFLAGS/CS/EIP (and SS/ESP on a ring
            // change) and entered with IF cleared.
            naked_asm!(
                "pushad",
                "call {body}",
                "popad",
                "iretd",
                body = sym $body,
            );
        }
    };
}

extern "C" fn pit_body() {
    crate::devices::pit::handle_tick();
}

extern "C" fn keyboard_body() {
    crate::devices::keyboard::handle_scancode();
}

extern "C" fn rtc_body() {
    crate::devices::rtc::handle_tick();
}

interrupt_wrapper!(pit_wrapper, pit_body);
interrupt_wrapper!(keyboard_wrapper, keyboard_body);
interrupt_wrapper!(rtc_wrapper, rtc_body);

extern "C" fn syscall_body(number: u32, arg1: u32, arg2: u32, arg3: u32) -> u32 {
    crate::syscall::dispatch(number, arg1, arg2, arg3)
}

/// The syscall trap needs its own wrapper rather than [`interrupt_wrapper`]:
/// the dispatcher's return value must end up in the `iretd`ed `EAX`, but a
/// plain `popad` would restore whatever `EAX` held at entry (the syscall
/// number), clobbering it. Overwriting `pushad`'s saved `EAX` slot — at
/// `[esp+28]`, the last of the eight 4-byte slots it pushes — before
/// `popad` runs is the fix.
///
/// `EAX`/`EBX`/`ECX`/`EDX` are read and pushed as explicit `cdecl`
/// arguments to `syscall_body` immediately after `pushad`, before any
/// ordinary (non-naked) Rust call can use `ECX`/`EDX` as scratch or
/// otherwise disturb them — only the stack copies `pushad` made are relied
/// on past this point.
#[unsafe(naked)]
extern "C" fn syscall_wrapper() {
    // SAFETY: sole body of the syscall IDT gate; `syscall_body` returns its
    // result in `eax` per the `extern "C"` ABI, which this overwrites the
    // pushed `eax` slot with before the saved registers are restored.
    naked_asm!(
        "pushad",
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "call {body}",
        "add esp, 16",
        "mov [esp + 28], eax",
        "popad",
        "iretd",
        body = sym syscall_body,
    );
}

/// Populates every IDT entry and loads it.
///
/// # Safety
/// Must run once, after [`gdt::init`], before `sti`.
pub unsafe fn init() {
    let cs = gdt::kernel_code_selector();

    let idt = &raw mut IDT;

    (*idt)[0x00] = IdtEntry::new(divide_by_zero as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x01] = IdtEntry::new(debug as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x02] = IdtEntry::new(non_maskable_interrupt as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x03] = IdtEntry::new(breakpoint as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x04] = IdtEntry::new(overflow as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x05] = IdtEntry::new(bound_range_exceeded as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x06] = IdtEntry::new(invalid_opcode as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x07] = IdtEntry::new(device_not_available as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x08] = IdtEntry::new(double_fault as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x09] = IdtEntry::new(coprocessor_segment_overrun as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0A] = IdtEntry::new(invalid_tss as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0B] = IdtEntry::new(segment_not_present as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0C] = IdtEntry::new(stack_segment_fault as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0D] = IdtEntry::new(general_protection as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0E] = IdtEntry::new(page_fault as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x0F] = IdtEntry::new(reserved_0f as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x10] = IdtEntry::new(x87_floating_point as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x11] = IdtEntry::new(alignment_check as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x12] = IdtEntry::new(machine_check as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[0x13] = IdtEntry::new(simd_floating_point as u32, cs, INTERRUPT_GATE_DPL0);

    (*idt)[usize::from(PIT_VECTOR)] = IdtEntry::new(pit_wrapper as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[usize::from(KEYBOARD_VECTOR)] =
        IdtEntry::new(keyboard_wrapper as u32, cs, INTERRUPT_GATE_DPL0);
    (*idt)[usize::from(RTC_VECTOR)] = IdtEntry::new(rtc_wrapper as u32, cs, INTERRUPT_GATE_DPL0);

    (*idt)[usize::from(SYSCALL_INTERRUPT_INDEX)] =
        IdtEntry::new(syscall_wrapper as u32, cs, TRAP_GATE_DPL3);

    let ptr = DescriptorTablePointer {
        limit: (size_of::<[IdtEntry; IDT_ENTRY_COUNT]>() - 1) as u16,
        base: idt as u32,
    };
    port::lidt(&ptr);

    pic::enable_irq(PIT_IRQ);
    pic::enable_irq(KEYBOARD_IRQ);
    pic::enable_irq(RTC_IRQ);
}
