//! Real-time clock: one real 1024 Hz chip, virtualized per process.
//!
//! Register B's periodic interrupt bit is set once at init and never
//! touched again; every process instead gets its own software-divided
//! rate (`rtc_rate`/`rtc_curr`/`rtc_fired` on its PCB) that the real tick
//! decrements. [`crate::process::pcb::for_each_present`] iterates every
//! present process each tick, so the virtualized rate applies uniformly
//! regardless of how many processes are actually running.

use crate::config::{RTC_MAX_FREQ, RTC_MIN_FREQ};
use crate::error::{KernelError, KernelResult};
use crate::pic;
use crate::port;
use crate::process::pcb;

const CMOS_INDEX: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;
const REGISTER_A: u8 = 0x8A;
const REGISTER_B: u8 = 0x8B;
const REGISTER_C: u8 = 0x8C;
const NMI_DISABLE: u8 = 0x80;

const RTC_IRQ: u32 = 8;

/// The per-process rate a freshly opened RTC descriptor starts at: 2 Hz.
const DEFAULT_OPEN_DIVISOR: u32 = RTC_MAX_FREQ / RTC_MIN_FREQ;

/// Programs the real chip to ~1024 Hz and unmasks IRQ 8.
///
/// # Safety
/// Must run once, after [`crate::idt::init`], before `sti`.
pub unsafe fn init() {
    port::outb(CMOS_INDEX, NMI_DISABLE | REGISTER_B);
    let previous = port::inb(CMOS_DATA);
    port::outb(CMOS_INDEX, NMI_DISABLE | REGISTER_B);
    port::outb(CMOS_DATA, previous | 0x40); // enable periodic interrupt

    port::outb(CMOS_INDEX, NMI_DISABLE | REGISTER_A);
    let previous = port::inb(CMOS_DATA);
    port::outb(CMOS_INDEX, NMI_DISABLE | REGISTER_A);
    // Rate 6 -> 1024 Hz: frequency = 32768 >> (rate - 1).
    port::outb(CMOS_DATA, (previous & 0xF0) | 0x06);

    pic::enable_irq(RTC_IRQ);
}

/// Called from the RTC's IDT gate on every real tick. Owns its own EOI and
/// register-C read (required to re-arm the chip), then decrements every
/// present process's software divider.
pub fn handle_tick() {
    pcb::for_each_present(|_, process| {
        if !process.rtc || process.rtc_fired {
            return;
        }
        if process.rtc_curr <= 1 {
            process.rtc_fired = true;
        } else {
            process.rtc_curr -= 1;
        }
    });

    // SAFETY: reading register C is required after every RTC interrupt to
    // let the chip raise the next one.
    unsafe {
        port::outb(CMOS_INDEX, REGISTER_C);
        port::inb(CMOS_DATA);
        pic::send_eoi(RTC_IRQ);
    }
}

/// Arms the calling process's virtualized RTC at the default 2 Hz rate.
pub fn open() -> KernelResult<()> {
    let mut process = pcb::current();
    process.rtc = true;
    process.rtc_rate = DEFAULT_OPEN_DIVISOR;
    process.rtc_curr = DEFAULT_OPEN_DIVISOR;
    process.rtc_fired = false;
    Ok(())
}

/// Disarms the calling process's virtualized RTC.
pub fn close() -> KernelResult<()> {
    pcb::current().rtc = false;
    Ok(())
}

/// Spins until the calling process's `rtc_fired` flag is set, then clears
/// it and reloads the divider for the next interval.
pub fn read() -> KernelResult<usize> {
    loop {
        {
            let mut process = pcb::current();
            if process.rtc_fired {
                process.rtc_fired = false;
                process.rtc_curr = process.rtc_rate;
                return Ok(0);
            }
        }
        // SAFETY: halting until the next interrupt is always sound; the
        // RTC tick handler is what sets `rtc_fired`.
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

/// Validates `buf` as a 4-byte little-endian power-of-two frequency in
/// `[RTC_MIN_FREQ, RTC_MAX_FREQ]` and sets the calling process's divider.
pub fn write(buf: &[u8]) -> KernelResult<usize> {
    if buf.len() != 4 {
        return Err(KernelError::InvalidArgument);
    }
    let frequency = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if !(RTC_MIN_FREQ..=RTC_MAX_FREQ).contains(&frequency) || !frequency.is_power_of_two() {
        return Err(KernelError::InvalidArgument);
    }

    let divisor = RTC_MAX_FREQ / frequency;
    let mut process = pcb::current();
    process.rtc_rate = divisor;
    process.rtc_curr = divisor;
    Ok(4)
}

#[cfg(test)]
mod tests {
    #[test_case]
    fn rejects_non_power_of_two() {
        assert!(super::write(&100u32.to_le_bytes()).is_err());
    }

    #[test_case]
    fn rejects_out_of_range() {
        assert!(super::write(&1024u32.to_le_bytes()).is_err());
        assert!(super::write(&1u32.to_le_bytes()).is_err());
    }
}
