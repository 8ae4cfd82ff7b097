//! vtos: a small protected-mode teaching kernel.
//!
//! This crate is the fused core of a single-CPU 32-bit x86 kernel:
//! interrupt and exception dispatch, paging and address-space management,
//! a fixed pool of process control blocks scheduled round-robin across
//! three virtual terminals, the system-call surface, and a read-mostly
//! indexed file system over a flat block image. The bootloader, VGA font
//! rendering, chip-register protocols, the user C library, and user-space
//! `shell`/test binaries are external collaborators whose interfaces only
//! are assumed here.

#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![feature(naked_functions)]

extern crate alloc;

use core::panic::PanicInfo;

pub mod allocator;
pub mod boot;
pub mod config;
pub mod devices;
pub mod error;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod paging;
pub mod pic;
pub mod port;
pub mod process;
pub mod serial;
pub mod syscall;

/// I/O port the `isa-debug-exit` QEMU device listens on. Test-only; the
/// real boot path never touches it.
const QEMU_EXIT_PORT: u16 = 0xf4;

/// Brings up every layer leaves-first: the PIC, then the GDT/TSS, then the
/// IDT (which wires in devices), then paging, then the heap, then the file
/// system, and finally the process table, which creates the three
/// terminal shells.
///
/// # Safety
///
/// Must be called exactly once, early in `_start`, before interrupts are
/// enabled and before any code touches paging, the GDT, or the heap.
pub unsafe fn init(multiboot_info_addr: usize) {
    serial_println!("[vtos] booting");

    gdt::init();
    pic::init();
    idt::init();

    boot::parse(multiboot_info_addr);

    paging::init();
    allocator::init_heap().expect("heap init must succeed at boot");

    let image_base = fs::load_from_disk();
    serial_println!("[vtos] fs image loaded from disk at {:#x}", image_base);
    fs::init(image_base);

    devices::pit::init(config::PIT_FREQUENCY_HZ);
    devices::rtc::init();
    devices::keyboard::init();

    process::scheduler::start_terminals();
}

/// Halts the CPU until the next interrupt, forever. The kernel's idle loop
/// once nothing else is runnable.
pub fn hlt_loop() -> ! {
    loop {
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

/// Exit code reported to the `isa-debug-exit` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// A successful test run.
    Success = 0x10,
    /// A failed test run.
    Failure = 0x11,
}

/// Exits QEMU with the given code. Test-only.
pub fn exit_qemu(exit_code: QemuExitCode) {
    // SAFETY: the debug-exit port is only present under the QEMU test
    // runner configured in `.cargo/config.toml`.
    unsafe {
        port::outl(QEMU_EXIT_PORT, exit_code as u32);
    }
}

/// Panic handler used by integration tests.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failure);
    hlt_loop()
}

/// Custom test runner for `no_std` testing.
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

/// Encapsulates a test case so the runner can print its name uniformly.
pub trait Testable {
    /// Runs the test, printing its name before and `[ok]` after.
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        use core::any::type_name;

        serial_print!("{}...\t", type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}
