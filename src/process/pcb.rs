//! Process control block layout and the fixed PCB pool.
//!
//! Each PCB lives at a fixed offset from the base of its own kernel stack,
//! so "the current process" can in principle be recovered by masking
//! `esp` against `KERNEL_STACK_SIZE - 1`. [`pcb_slot_address`] computes
//! that same address for anyone (tests included) that wants to check the
//! invariant; the kernel itself additionally tracks the running pid
//! directly in [`CURRENT_PID`], updated on every scheduler dispatch and at
//! the `execute`/`halt` boundary, since the kernel stacks here aren't
//! guaranteed to land on the power-of-two boundary the mask trick needs.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};

use crate::config::{ARGV_CAPACITY, FD_TABLE_SIZE, KERNEL_STACK_SIZE, KERNEL_STACK_TOP, MAX_PROCESS};
use crate::fs::ops::FileOps;

/// One open-file slot. `ops == None` marks the slot free.
#[derive(Clone, Copy)]
pub struct FileDescriptor {
    pub ops: Option<FileOps>,
    pub inode: u32,
    pub file_pos: u32,
}

impl FileDescriptor {
    const fn closed() -> Self {
        Self {
            ops: None,
            inode: 0,
            file_pos: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.ops.is_some()
    }
}

/// One process control block.
pub struct Pcb {
    pub present: bool,
    pub pid: usize,
    pub parent: Option<usize>,
    /// Saved base pointer of the parent's `execute` stack frame; `halt`
    /// restores `ebp` to this value and returns out of it.
    pub parent_ebp: u32,
    /// Saved base pointer for the scheduler's own context switch.
    pub ebp: u32,
    pub esp0: u32,
    pub vidmap: bool,
    pub rtc: bool,
    pub rtc_rate: u32,
    pub rtc_curr: u32,
    pub rtc_fired: bool,
    pub argv: [u8; ARGV_CAPACITY],
    pub files: [FileDescriptor; FD_TABLE_SIZE],
}

impl Pcb {
    const fn empty() -> Self {
        Self {
            present: false,
            pid: 0,
            parent: None,
            parent_ebp: 0,
            ebp: 0,
            esp0: 0,
            vidmap: false,
            rtc: false,
            rtc_rate: 0,
            rtc_curr: 0,
            rtc_fired: false,
            argv: [0; ARGV_CAPACITY],
            files: [FileDescriptor::closed(); FD_TABLE_SIZE],
        }
    }

    /// Closes every descriptor above stdin/stdout, per `halt`'s resource
    /// reclamation step.
    pub fn close_user_files(&mut self) {
        for fd in &mut self.files[2..] {
            if let Some(ops) = fd.ops.take() {
                let _ = ops.close();
            }
        }
    }
}

static PCBS: [Mutex<Pcb>; MAX_PROCESS] =
    [const { Mutex::new(Pcb::empty()) }; MAX_PROCESS];

/// The pid the CPU is currently executing on behalf of. Updated by
/// [`super::scheduler`] on every tick and by `execute`/`halt` at process
/// boundaries — the software-tracked twin of the esp-masking lookup.
static CURRENT_PID: AtomicUsize = AtomicUsize::new(0);

/// Computes the address of pid `p`'s PCB as if it lived at the base of its
/// own kernel stack: `KERNEL_STACK_TOP - (p+1) * KERNEL_STACK_SIZE`. Exists
/// to keep that invariant checkable, even though the pool itself is an
/// ordinary static array rather than literally stack-resident.
#[must_use]
pub fn pcb_slot_address(pid: usize) -> u32 {
    KERNEL_STACK_TOP - ((pid as u32) + 1) * (KERNEL_STACK_SIZE as u32)
}

/// Returns the kernel-stack top address reserved for pid `p`: the TSS.ESP0
/// value while `p` runs.
#[must_use]
pub fn kernel_stack_top(pid: usize) -> u32 {
    KERNEL_STACK_TOP - (pid as u32) * (KERNEL_STACK_SIZE as u32)
}

pub fn set_current_pid(pid: usize) {
    CURRENT_PID.store(pid, Ordering::SeqCst);
}

#[must_use]
pub fn current_pid() -> usize {
    CURRENT_PID.load(Ordering::SeqCst)
}

/// Locks and returns the PCB of the currently running process.
pub fn current() -> MutexGuard<'static, Pcb> {
    PCBS[current_pid()].lock()
}

/// Locks and returns the PCB of `pid`.
pub fn get(pid: usize) -> MutexGuard<'static, Pcb> {
    PCBS[pid].lock()
}

/// Finds the lowest-numbered free slot and returns it without marking it
/// present; the caller fills in the PCB and sets `present = true` under
/// the same lock to avoid a second process racing the same slot.
pub fn allocate() -> Option<usize> {
    PCBS.iter().position(|pcb| !pcb.lock().present)
}

/// Runs `f` on every present PCB's slot index, without holding any lock
/// across iterations. Used by RTC tick virtualization, which must touch
/// every present process with `rtc == true`, not a fixed pid range.
pub fn for_each_present(mut f: impl FnMut(usize, &mut Pcb)) {
    for (pid, pcb) in PCBS.iter().enumerate() {
        let mut guard = pcb.lock();
        if guard.present {
            f(pid, &mut guard);
        }
    }
}
