//! Address space layout: one page directory, PSE 4 MiB kernel/user frames,
//! and the 4 KiB video-page indirection the scheduler uses to hide
//! background terminals' screens.
//!
//! IA-32 has no long-mode page-table format, so this module hand-builds a
//! classic two-level 32-bit directory: one `init()` plus a handful of named
//! mapping helpers. [`init`] lays out three
//! mappings: PDE 0 as a 4 KiB table identity-mapping the low 4 MiB (video
//! memory and the three hidden per-terminal backing pages live here), PDE 1
//! as a single 4 MiB PSE frame identity-mapping the kernel's own code, data,
//! and per-process kernel stacks, and PDE 32 as the per-process "user
//! image" window [`map_user_image`] repoints on every `execute`/`halt`/
//! context switch.

use crate::config::{KERNEL_ADDR, TERMINAL_COUNT, USER_ENTRY_PDE, VIDMEM_INDEX};
use crate::port;

const PAGE_PRESENT: u32 = 1 << 0;
const PAGE_WRITABLE: u32 = 1 << 1;
const PAGE_USER: u32 = 1 << 2;
const PAGE_SIZE_4M: u32 = 1 << 7;

const PDE_COUNT: usize = 1024;
const PTE_COUNT: usize = 1024;

/// Page-directory index of the one-entry table a user program's `vidmap()`
/// result points into: virtual address `USER_VIDMAP_ADDR`.
const USER_VIDMAP_PDE: usize = 33;
/// Virtual address returned to user space by a successful `vidmap()`.
pub const USER_VIDMAP_ADDR: u32 = (USER_VIDMAP_PDE as u32) * 0x0040_0000;

/// Physical frame number (in 4 KiB units) of the real VGA text buffer.
const LIVE_VIDEO_FRAME: u32 = 0xB8;
/// First physical frame number of the three hidden per-terminal backing
/// pages, immediately following the live buffer.
const HIDDEN_VIDEO_BASE_FRAME: u32 = 0xB9;

#[repr(align(4096))]
struct PageTable([u32; PTE_COUNT]);

static mut PAGE_DIRECTORY: [u32; PDE_COUNT] = [0; PDE_COUNT];
static mut LOW_MEMORY_TABLE: PageTable = PageTable([0; PTE_COUNT]);
static mut USER_VIDMAP_TABLE: PageTable = PageTable([0; PTE_COUNT]);

/// Builds the identity-mapped low 4 MiB, the 4 MiB kernel region, and the
/// (initially empty) user-image and vidmap slots, then loads CR3 and turns
/// on paging.
///
/// # Safety
/// Must run once, after [`crate::gdt::init`]/[`crate::idt::init`], before
/// the heap or the file system are touched.
pub unsafe fn init() {
    let low_table = &raw mut LOW_MEMORY_TABLE;
    for (frame, entry) in (*low_table).0.iter_mut().enumerate() {
        *entry = ((frame as u32) << 12) | PAGE_PRESENT | PAGE_WRITABLE;
    }

    let dir = &raw mut PAGE_DIRECTORY;
    (*dir)[0] = (low_table as u32) | PAGE_PRESENT | PAGE_WRITABLE;
    (*dir)[1] = KERNEL_ADDR | PAGE_PRESENT | PAGE_WRITABLE | PAGE_SIZE_4M;

    let vidmap_table = &raw mut USER_VIDMAP_TABLE;
    (*dir)[USER_VIDMAP_PDE] = (vidmap_table as u32) | PAGE_PRESENT | PAGE_WRITABLE | PAGE_USER;

    port::load_cr3(dir as u32);
    port::enable_paging();

    map_video_page_live();
}

/// Points the per-process user-image PDE at frame `2 + pid` (physical
/// `(2 + pid) * 4 MiB`), present/writable/user/4 MiB. Every pid gets a
/// distinct frame so a descendant never aliases its parent's image.
///
/// # Safety
/// Must be followed by a reload of any CPU context depending on the old
/// mapping; the caller must not be executing out of the image window being
/// replaced.
pub unsafe fn map_user_image(pid: usize) {
    let frame_number = 2 + pid as u32;
    let dir = &raw mut PAGE_DIRECTORY;
    (*dir)[USER_ENTRY_PDE] =
        (frame_number * 0x0040_0000) | PAGE_PRESENT | PAGE_WRITABLE | PAGE_USER | PAGE_SIZE_4M;
    port::flush_tlb();
}

fn set_video_frame(frame: u32) {
    let low_table = &raw mut LOW_MEMORY_TABLE;
    let vidmap_table = &raw mut USER_VIDMAP_TABLE;
    // SAFETY: both tables were built by `init` and are only ever mutated
    // here, under the scheduler's exclusive control during a tick.
    unsafe {
        (*low_table).0[VIDMEM_INDEX] = (frame << 12) | PAGE_PRESENT | PAGE_WRITABLE;
        let existing_present = (*vidmap_table).0[0] & PAGE_PRESENT;
        (*vidmap_table).0[0] =
            (frame << 12) | PAGE_WRITABLE | PAGE_USER | existing_present;
        port::flush_tlb();
    }
}

/// Re-points the virtual `0xB8000` video page (and, if mapped, the user
/// vidmap page) at the real VGA buffer. Called when the scheduler is about
/// to run the terminal currently shown on screen.
pub fn map_video_page_live() {
    set_video_frame(LIVE_VIDEO_FRAME);
}

/// Re-points the video page at `terminal_index`'s hidden backing buffer.
/// Called when the scheduler is about to run a terminal that isn't shown,
/// so its writes land off-screen instead of corrupting the visible one.
pub fn map_video_page_hidden(terminal_index: usize) {
    debug_assert!(terminal_index < TERMINAL_COUNT);
    set_video_frame(HIDDEN_VIDEO_BASE_FRAME + terminal_index as u32);
}

/// Sets the user vidmap page's present bit to `present`, per the
/// incoming process's `pcb.vidmap` flag. The frame itself tracks whichever
/// buffer [`map_video_page_live`]/[`map_video_page_hidden`] last selected.
pub fn set_user_video_present(present: bool) {
    let vidmap_table = &raw mut USER_VIDMAP_TABLE;
    // SAFETY: single-writer, called only from the scheduler's tick path.
    unsafe {
        if present {
            (*vidmap_table).0[0] |= PAGE_PRESENT;
        } else {
            (*vidmap_table).0[0] &= !PAGE_PRESENT;
        }
        port::flush_tlb();
    }
}
