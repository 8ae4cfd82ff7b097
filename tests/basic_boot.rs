//! Simple boot test for the kernel: confirms the test harness itself comes
//! up and the serial log sink works, without running full hardware init.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![feature(naked_functions)]
#![test_runner(vtos::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::arch::asm;
use core::panic::PanicInfo;

use vtos::serial_println;

const MULTIBOOT2_MAGIC: u32 = 0xE852_50D6;
const ARCHITECTURE_I386: u32 = 0;

#[repr(C, align(8))]
struct MultibootHeader {
    magic: u32,
    architecture: u32,
    header_length: u32,
    checksum: u32,
    end_tag_type: u16,
    end_tag_flags: u16,
    end_tag_size: u32,
}

const HEADER_LENGTH: u32 = core::mem::size_of::<MultibootHeader>() as u32;

#[link_section = ".multiboot_header"]
#[used]
static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
    magic: MULTIBOOT2_MAGIC,
    architecture: ARCHITECTURE_I386,
    header_length: HEADER_LENGTH,
    checksum: 0u32
        .wrapping_sub(MULTIBOOT2_MAGIC)
        .wrapping_sub(ARCHITECTURE_I386)
        .wrapping_sub(HEADER_LENGTH),
    end_tag_type: 0,
    end_tag_flags: 0,
    end_tag_size: 8,
};

const BOOT_STACK_SIZE: usize = 16 * 1024;

#[repr(align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

/// GRUB's entry point. Sets up a stack, then hands off to ordinary Rust:
/// this test needs no hardware beyond the serial port, which
/// [`vtos::serial_println`] drives directly over port I/O.
#[naked]
#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    asm!(
        "lea esp, [{stack} + {size}]",
        "call {main}",
        stack = sym BOOT_STACK,
        size = const BOOT_STACK_SIZE,
        main = sym kernel_main,
        options(noreturn),
    );
}

extern "C" fn kernel_main() -> ! {
    test_main();
    vtos::hlt_loop()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    vtos::test_panic_handler(info)
}

/// Test that we can log a line over serial.
#[test_case]
fn test_serial_println() {
    serial_println!("test_serial_println output");
}
