//! 8259 programmable interrupt controller driver.
//!
//! Two cascaded PICs, remapped so IRQs 0-7 land at vectors 0x20-0x27 and
//! IRQs 8-15 at 0x28-0x2F (clear of the CPU's own exception vectors
//! 0-0x1F), masks tracked in two bytes, and the dual-acknowledge rule for
//! slave IRQs.

use spin::Mutex;

use crate::port;

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1: u8 = 0x11;
const ICW2_MASTER: u8 = 0x20;
const ICW2_SLAVE: u8 = 0x28;
const ICW3_MASTER: u8 = 0x04; // slave attached to master's IRQ2
const ICW3_SLAVE: u8 = 0x02; // slave's cascade identity
const ICW4: u8 = 0x01; // 8086/88 mode

const EOI: u8 = 0x20;

/// IRQ line the slave PIC is cascaded onto.
const SLAVE_IRQ: u32 = 2;
const IRQ_MASTER_MAX: u32 = 7;
const IRQ_MAX: u32 = 15;

struct Masks {
    master: u8,
    slave: u8,
}

static MASKS: Mutex<Masks> = Mutex::new(Masks {
    master: 0xFF,
    slave: 0xFF,
});

/// Remaps both PICs past the CPU exception vectors and masks every line
/// except the master's cascade input.
///
/// # Safety
/// Must run once, before `sti`, with interrupts still disabled.
pub unsafe fn init() {
    port::outb(MASTER_DATA, 0xFF);
    port::outb(SLAVE_DATA, 0xFF);

    port::outb(MASTER_COMMAND, ICW1);
    port::outb(SLAVE_COMMAND, ICW1);

    port::outb(MASTER_DATA, ICW2_MASTER);
    port::outb(SLAVE_DATA, ICW2_SLAVE);

    port::outb(MASTER_DATA, ICW3_MASTER);
    port::outb(SLAVE_DATA, ICW3_SLAVE);

    port::outb(MASTER_DATA, ICW4);
    port::outb(SLAVE_DATA, ICW4);

    let mut masks = MASKS.lock();
    masks.master = 0xFB; // mask all but IRQ2 (the slave cascade)
    masks.slave = 0xFF;
    port::outb(MASTER_DATA, masks.master);
    port::outb(SLAVE_DATA, masks.slave);
}

/// Unmasks `irq_num`, letting that line raise interrupts.
///
/// # Safety
/// `irq_num` must be a line a handler is installed for in the IDT; an
/// unmasked line with no handler will fault on delivery.
pub unsafe fn enable_irq(irq_num: u32) {
    if irq_num > IRQ_MAX {
        return;
    }
    let mut masks = MASKS.lock();
    if irq_num <= IRQ_MASTER_MAX {
        masks.master &= !(1 << irq_num);
        port::outb(MASTER_DATA, masks.master);
    } else {
        masks.slave &= !(1 << (irq_num - 8));
        port::outb(SLAVE_DATA, masks.slave);
    }
}

/// Masks `irq_num`, silencing that line until the matching [`enable_irq`].
///
/// # Safety
/// Disabling a line a caller is still expecting events from will silently
/// drop them.
pub unsafe fn disable_irq(irq_num: u32) {
    if irq_num > IRQ_MAX {
        return;
    }
    let mut masks = MASKS.lock();
    if irq_num <= IRQ_MASTER_MAX {
        masks.master |= 1 << irq_num;
        port::outb(MASTER_DATA, masks.master);
    } else {
        masks.slave |= 1 << (irq_num - 8);
        port::outb(SLAVE_DATA, masks.slave);
    }
}

/// Acknowledges `irq_num`, re-arming it for the next interrupt. Slave IRQs
/// require an EOI to both PICs; the master alone needs only its own.
///
/// # Safety
/// Must be called exactly once per delivered IRQ, from that IRQ's own
/// handler, after any scheduler-visible state is updated.
pub unsafe fn send_eoi(irq_num: u32) {
    if irq_num > IRQ_MAX {
        return;
    }
    if irq_num > IRQ_MASTER_MAX {
        port::outb(SLAVE_COMMAND, EOI | ((irq_num - 8) as u8));
        port::outb(MASTER_COMMAND, EOI | (SLAVE_IRQ as u8));
    } else {
        port::outb(MASTER_COMMAND, EOI | (irq_num as u8));
    }
}
