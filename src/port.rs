//! Port I/O and other low-level primitives.
//!
//! Every other subsystem reaches hardware only through this module: raw
//! `in`/`out` on the legacy I/O bus, the interrupt-flag toggles, and TLB/CR3
//! management. Keeping these in one place is what lets the rest of the
//! kernel be ordinary, safe-looking Rust around a handful of documented
//! `unsafe` primitives.

use core::arch::asm;

/// Reads one byte from `port`.
///
/// # Safety
/// The caller must know that reading `port` has no side effect it isn't
/// prepared for (some I/O ports are read-to-clear or read-to-acknowledge).
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    x86::io::inb(port)
}

/// Writes one byte to `port`.
///
/// # Safety
/// The caller must know that `port` accepts a byte write and that issuing
/// it now is correct (wrong timing can wedge real hardware).
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    x86::io::outb(port, value);
}

/// Writes a 32-bit value to `port`. Only used by the QEMU debug-exit device
/// under the test runner.
///
/// # Safety
/// Same caveats as [`outb`].
#[inline]
pub unsafe fn outl(port: u16, value: u32) {
    x86::io::outl(port, value);
}

/// Reads one 16-bit word from `port`. Used for the ATA PIO data register,
/// which transfers a full word per access.
///
/// # Safety
/// Same caveats as [`inb`].
#[inline]
pub unsafe fn inw(port: u16) -> u16 {
    x86::io::inw(port)
}

/// Writes one 16-bit word to `port`.
///
/// # Safety
/// Same caveats as [`outb`].
#[inline]
pub unsafe fn outw(port: u16, value: u16) {
    x86::io::outw(port, value);
}

/// Disables maskable interrupts.
///
/// # Safety
/// Leaves a region with no reentrancy protection against hardware IRQs;
/// callers must re-enable with [`sti`] before returning to any code that
/// expects interrupts to be live (scheduling, blocking I/O).
#[inline]
pub unsafe fn cli() {
    asm!("cli", options(nomem, nostack, preserves_flags));
}

/// Enables maskable interrupts.
///
/// # Safety
/// Must only be called once the caller has finished any state mutation
/// that an interrupt handler could observe half-done.
#[inline]
pub unsafe fn sti() {
    asm!("sti", options(nomem, nostack, preserves_flags));
}

/// Runs `f` with interrupts disabled, restoring the prior interrupt-enable
/// state (read from `EFLAGS.IF`) afterward. Mirrors the `cli()`/`sti()`
/// bracketing `terminal_write` uses around the whole VGA write in the
/// original kernel so that nested callers don't leak interrupts on.
pub fn without_interrupts<F: FnOnce() -> R, R>(f: F) -> R {
    let flags: u32;
    // SAFETY: reading EFLAGS has no side effect.
    unsafe {
        asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        cli();
    }
    let result = f();
    let was_enabled = flags & (1 << 9) != 0;
    if was_enabled {
        // SAFETY: restoring a previously-observed interrupt state.
        unsafe { sti() };
    }
    result
}

/// Reloads CR3 with its own value, flushing the entire TLB.
///
/// Must be called after any mutation of the page directory or a mapped
/// PTE, so stale translations are never used.
///
/// # Safety
/// CR3 must currently hold the physical address of a valid page directory.
#[inline]
pub unsafe fn flush_tlb() {
    let cr3: u32;
    asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
    asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
}

/// Loads a new page directory base address into CR3.
///
/// # Safety
/// `phys_addr` must be the physical address of a 4 KiB-aligned, fully
/// constructed page directory.
#[inline]
pub unsafe fn load_cr3(phys_addr: u32) {
    asm!("mov cr3, {}", in(reg) phys_addr, options(nostack, preserves_flags));
}

/// Enables page-size extension (CR4.PSE) and paging (CR0.PG | CR0.PE).
///
/// # Safety
/// CR3 must already hold a valid page directory; called exactly once, at
/// boot, by [`crate::paging::init`].
#[inline]
pub unsafe fn enable_paging() {
    asm!(
        "mov eax, cr4",
        "or eax, 0x10",      // CR4.PSE: enable 4 MiB pages
        "mov cr4, eax",
        "mov eax, cr0",
        "or eax, 0x80000001", // CR0.PG | CR0.PE
        "mov cr0, eax",
        out("eax") _,
        options(nostack, preserves_flags),
    );
}

/// Reads CR2, the faulting linear address left by the last page fault.
///
/// # Safety
/// Only meaningful when called from within a page-fault handler.
#[inline]
pub unsafe fn read_cr2() -> u32 {
    let value: u32;
    asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
    value
}

/// Loads the GDT register from a descriptor-table pointer.
///
/// # Safety
/// `ptr` must reference a GDT that outlives the load and that the caller
/// is prepared to have the CPU start consulting mid-instruction-stream.
#[inline]
pub unsafe fn lgdt(ptr: &super::gdt::DescriptorTablePointer) {
    asm!("lgdt [{}]", in(reg) ptr, options(nostack, preserves_flags, readonly));
}

/// Loads the IDT register from a descriptor-table pointer.
///
/// # Safety
/// `ptr` must reference a fully populated IDT that outlives the load.
#[inline]
pub unsafe fn lidt(ptr: &super::idt::DescriptorTablePointer) {
    asm!("lidt [{}]", in(reg) ptr, options(nostack, preserves_flags, readonly));
}

/// Loads the task register with `selector`, activating the TSS it names.
///
/// # Safety
/// `selector` must index a valid, available TSS descriptor in the GDT.
#[inline]
pub unsafe fn ltr(selector: u16) {
    asm!("ltr {:x}", in(reg) selector, options(nostack, preserves_flags));
}
