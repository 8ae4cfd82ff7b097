//! Multiboot2 boot information parsing.
//!
//! GRUB (or any Multiboot2-compliant loader) leaves a pointer to an
//! information structure in `EBX` at kernel entry. The file-system image is
//! loaded later, off the primary ATA disk (see [`crate::fs::load_from_disk`])
//! rather than as a loader module, so the only thing left for this module to
//! do is walk the tag list with the `multiboot2` crate and log the memory
//! map the loader discovered.
use multiboot2::{BootInformation, BootInformationHeader};

use crate::serial_println;

/// Parses the Multiboot2 structure at `multiboot_info_addr` and logs the
/// memory regions the loader reported, for diagnostic purposes only —
/// nothing downstream of boot consults this information.
///
/// # Safety
/// `multiboot_info_addr` must be the untouched value `_start` received in
/// `EBX`, still pointing at the loader-provided structure.
pub unsafe fn parse(multiboot_info_addr: usize) {
    let header = multiboot_info_addr as *const BootInformationHeader;
    let boot_info =
        BootInformation::load(header).expect("bootloader must provide valid Multiboot2 info");

    match boot_info.memory_map_tag() {
        Some(memory_map) => {
            for area in memory_map.memory_areas() {
                serial_println!(
                    "[vtos] memory area {:#x}..{:#x}",
                    area.start_address(),
                    area.end_address()
                );
            }
        }
        None => serial_println!("[vtos] no memory map tag present"),
    }
}
