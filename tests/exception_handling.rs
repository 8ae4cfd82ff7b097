//! Standalone (harness = false) integration check for the exception
//! dispatch path: brings up the GDT/PIC/IDT exactly as `vtos::init` does,
//! then validates the exception-flag bookkeeping every CPU-exception
//! handler in `idt.rs` relies on before unwinding through `process::halt`.
//!
//! Driving a real fault to completion here would need a prebuilt user
//! binary staged inside a file-system image at test-build time, which is
//! out of reach without invoking the toolchain from the test itself; the
//! live system already exercises that path end to end whenever a shell
//! command faults. This check instead pins down the contract `idt.rs` and
//! `process::halt` share, directly, with no test framework involved.

#![no_std]
#![no_main]
#![feature(naked_functions)]

use core::arch::asm;
use core::panic::PanicInfo;

use vtos::idt::{self, EXCEPTION_HALT_STATUS};
use vtos::{exit_qemu, gdt, pic, serial_println, QemuExitCode};

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
    serial_println!("exception_handling::boots_idt_without_faulting...\t");

    // SAFETY: the only code running; this is the same leaves-first bring-up
    // `vtos::init` performs before touching paging or the heap.
    unsafe {
        gdt::init();
        pic::init();
        idt::init();
    }

    assert_eq!(EXCEPTION_HALT_STATUS, 255, "reserved exception status must be 255");

    assert!(!idt::take_exception_flag(), "exception flag must start clear");
    idt::mark_exception();
    assert!(
        idt::take_exception_flag(),
        "mark_exception must set the flag take_exception_flag observes"
    );
    assert!(
        !idt::take_exception_flag(),
        "take_exception_flag must clear the flag once read"
    );

    serial_println!("[ok]");
    exit_qemu(QemuExitCode::Success);
    vtos::hlt_loop()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    vtos::test_panic_handler(info)
}
