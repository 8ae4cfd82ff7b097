//! Programmable interval timer — the kernel's sole scheduling trigger.
//!
//! Channel 0, square-wave mode, programmed from a requested tick frequency
//! in Hz. Every tick calls into [`crate::process::scheduler`], which does
//! the actual terminal round-robin and stack switch; this module only
//! owns the hardware-facing half (programming the divisor, acknowledging
//! IRQ 0).

use crate::pic;
use crate::port;

const CHANNEL_0: u16 = 0x40;
const COMMAND: u16 = 0x43;
const SQUARE_WAVE_MODE: u8 = 0x36;

/// The PIT's fixed input oscillator frequency.
const PIT_INPUT_HZ: u32 = 1_193_182;

const PIT_IRQ: u32 = 0;

/// Programs channel 0 to fire at approximately `frequency_hz`.
///
/// # Safety
/// Must run once, after [`crate::pic::init`], before `sti`.
pub unsafe fn init(frequency_hz: u32) {
    let divisor = (PIT_INPUT_HZ / frequency_hz) as u16;
    port::outb(COMMAND, SQUARE_WAVE_MODE);
    port::outb(CHANNEL_0, (divisor & 0xFF) as u8);
    port::outb(CHANNEL_0, ((divisor >> 8) & 0xFF) as u8);
    pic::enable_irq(PIT_IRQ);
}

/// Called from the PIT's IDT gate on every tick. EOIs the PIC first, so
/// further IRQs can still preempt the process being switched in, then
/// hands off to the scheduler.
pub fn handle_tick() {
    // SAFETY: acknowledging the IRQ this function was invoked for.
    unsafe { pic::send_eoi(PIT_IRQ) };
    crate::process::scheduler::on_tick();
}
