//! Checks the address-space layout constants every process's user image,
//! stack, and syscall ABI depend on — pure arithmetic, run without
//! bringing up paging or a process.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![feature(naked_functions)]
#![test_runner(vtos::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]

use core::arch::asm;
use core::panic::PanicInfo;

use vtos::config;
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

/// GRUB's entry point. Sets up a stack, then hands off to ordinary Rust.
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

#[test_case]
fn user_image_and_program_layout_is_consistent() {
    assert_eq!(
        config::USER_IMAGE_BASE % 4096,
        0,
        "USER_IMAGE_BASE must be page-aligned.",
    );
    assert_eq!(
        config::PROGRAM_IMAGE % 4096,
        0,
        "PROGRAM_IMAGE must be page-aligned.",
    );
    assert!(
        config::PROGRAM_IMAGE >= config::USER_IMAGE_BASE,
        "PROGRAM_IMAGE must lie inside the user image window.",
    );
    assert_eq!(
        config::PROGRAM_IMAGE + config::PROGRAM_IMAGE_LIMIT,
        config::USER_IMAGE_BASE + config::USER_IMAGE_SIZE,
        "PROGRAM_IMAGE_LIMIT must reach exactly to the end of the user image window.",
    );

    serial_println!("[ok] user image and program layout is consistent");
}

#[test_case]
fn user_stack_lies_inside_the_user_image() {
    assert_eq!(config::USER_STACK % 4096, 0, "USER_STACK must be page-aligned.");
    assert!(
        config::USER_STACK > config::PROGRAM_IMAGE,
        "USER_STACK must sit above the program image.",
    );
    assert!(
        config::USER_STACK <= config::USER_IMAGE_BASE + config::USER_IMAGE_SIZE,
        "USER_STACK must not run past the end of the user image window.",
    );
}

#[test_case]
fn syscall_interrupt_index_is_0x80() {
    assert_eq!(
        config::SYSCALL_INTERRUPT_INDEX,
        0x80,
        "Syscall interrupt vector must be 0x80.",
    );
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    vtos::test_panic_handler(info)
}
