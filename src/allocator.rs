//! Kernel heap.
//!
//! On IA-32 the whole 4 MiB kernel region `[KERNEL_ADDR, KERNEL_ADDR + 4
//! MiB)` is already identity mapped by [`crate::paging::init`] as one PSE
//! page, so there is no per-frame mapping step to do before the heap can
//! come up: carving a fixed range out of that region and handing it to
//! `linked_list_allocator::LockedHeap` is the whole job.

use linked_list_allocator::LockedHeap;

use crate::config::KERNEL_ADDR;

/// Start address of the heap: well clear of the kernel image loaded at
/// `KERNEL_ADDR`, leaving the top of the 4 MiB region for per-process
/// kernel stacks counting down from `KERNEL_STACK_TOP`.
pub const HEAP_START: usize = (KERNEL_ADDR as usize) + 0x0020_0000;
/// Size of the heap in bytes.
pub const HEAP_SIZE: usize = 512 * 1024;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initializes the global allocator over the fixed heap range.
///
/// # Errors
/// Never fails; the range is always valid once [`crate::paging::init`] has
/// run. Returns a `Result` to keep the same "fallible setup step" call
/// shape as the rest of boot.
pub fn init_heap() -> Result<(), &'static str> {
    // SAFETY: `HEAP_START..HEAP_START + HEAP_SIZE` lies entirely inside the
    // 4 MiB kernel region paging identity-maps before this runs, and no
    // other code claims it.
    unsafe {
        ALLOCATOR.lock().init(HEAP_START, HEAP_SIZE);
    }
    Ok(())
}
