//! Process lifecycle: `execute`/`halt` and the fixed PCB pool they share
//! with [`scheduler`].
//!
//! `execute` returns a plain `i32` rather than a `Result`: on the success
//! path it never returns through ordinary generated code at all — control
//! resumes here only when some descendant's `halt` restores the saved
//! `ebp` and executes a bare `leave; ret` with the reported status sitting
//! in `eax`. A `Result<i32, KernelError>` can't be reconstructed that way,
//! since `i32` has no spare bit pattern for the compiler to fold the
//! discriminant into and the real layout needs more than one register;
//! a scalar `i32` always fits in `eax` alone, so that's what both ends of
//! the handoff agree on. Failures `execute` detects itself, before the
//! point of no return, collapse to the same `-1` convention directly.

pub mod pcb;
pub mod scheduler;

use core::arch::asm;

use crate::config::{
    ARGV_CAPACITY, EXECUTABLE_MAGIC, PROGRAM_IMAGE, PROGRAM_IMAGE_LIMIT, USER_STACK,
};
use crate::error::{KernelError, KernelResult};
use crate::fs::ops::FileOps;
use crate::{fs, gdt, idt, paging};

/// Parses `command` into a file name (no spaces, capped at `ARGV_CAPACITY`)
/// and a single trailing argument string: leading spaces are skipped, the
/// name ends at the next space or NUL, remaining spaces are skipped, and
/// the argument runs to the next space or NUL.
fn parse_command(command: &[u8]) -> Option<([u8; ARGV_CAPACITY], [u8; ARGV_CAPACITY])> {
    let mut file_name = [0u8; ARGV_CAPACITY];
    let mut argument = [0u8; ARGV_CAPACITY];

    let mut pos = 0;
    while pos < command.len() && command[pos] == b' ' {
        pos += 1;
    }
    if pos == command.len() {
        return None;
    }

    let mut i = 0;
    while pos < command.len() && command[pos] != b' ' && i < ARGV_CAPACITY {
        file_name[i] = command[pos];
        i += 1;
        pos += 1;
    }

    while pos < command.len() && command[pos] == b' ' {
        pos += 1;
    }

    let mut j = 0;
    while pos < command.len() && command[pos] != b' ' && j < ARGV_CAPACITY {
        argument[j] = command[pos];
        j += 1;
        pos += 1;
    }

    Some((file_name, argument))
}

fn trim_nul(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(len) => &buf[..len],
        None => buf,
    }
}

/// Reads the little-endian entry point stored at bytes 24..27 of the
/// executable named by `dentry`.
fn read_entry_point(inode: u32) -> KernelResult<u32> {
    let mut entry = [0u8; 4];
    let read = fs::read_data(inode, 24, &mut entry)?;
    if read != 4 {
        return Err(KernelError::NotExecutable);
    }
    Ok(u32::from_le_bytes(entry))
}

fn verify_executable(inode: u32) -> KernelResult<()> {
    let mut magic = [0u8; 4];
    let read = fs::read_data(inode, 0, &mut magic)?;
    if read != 4 || magic != EXECUTABLE_MAGIC {
        return Err(KernelError::NotExecutable);
    }
    Ok(())
}

/// Loads the program's bytes flat into the currently mapped user image.
fn load_image(inode: u32) -> KernelResult<()> {
    // SAFETY: the caller has already pointed the user-image PDE at this
    // process's frame and reloaded CR3, so `PROGRAM_IMAGE` is writable and
    // large enough for `PROGRAM_IMAGE_LIMIT` bytes.
    let dest = unsafe {
        core::slice::from_raw_parts_mut(PROGRAM_IMAGE as *mut u8, PROGRAM_IMAGE_LIMIT as usize)
    };
    fs::read_data(inode, 0, dest)?;
    Ok(())
}

/// Runs the program named by the first token of `command`, replacing the
/// calling kernel context with a ring-3 entry into it. Returns `-1`
/// (logging the reason) on failure before the point of no return; on
/// success this function's caller next regains control only when the
/// child eventually `halt`s, via the parent's saved `ebp`, not via a
/// normal return from this call — at which point this call reads as
/// having returned the child's reported status.
pub fn execute(command: &[u8]) -> i32 {
    let Some((file_name, argument)) = parse_command(command) else {
        crate::serial_println!("[vtos] execute failed: {}", KernelError::InvalidArgument);
        return -1;
    };
    let name = trim_nul(&file_name);

    let Some(dentry) = fs::read_dentry_by_name(name) else {
        crate::serial_println!("[vtos] execute failed: {}", KernelError::FileNotFound);
        return -1;
    };
    if let Err(err) = verify_executable(dentry.inode_num) {
        crate::serial_println!("[vtos] execute failed: {err}");
        return -1;
    }

    let Some(pid) = pcb::allocate() else {
        crate::serial_println!("[vtos] execute failed: {}", KernelError::NoFreeProcess);
        return -1;
    };
    let parent_pid = pcb::current_pid();

    let mut parent_ebp: u32 = 0;
    // SAFETY: reads the caller's own frame pointer; does not mutate state.
    unsafe {
        asm!("mov {}, ebp", out(reg) parent_ebp, options(nomem, nostack, preserves_flags));
    }

    {
        let mut pcb = pcb::get(pid);
        pcb.present = true;
        pcb.pid = pid;
        pcb.parent = Some(parent_pid);
        pcb.parent_ebp = parent_ebp;
        pcb.esp0 = pcb::kernel_stack_top(pid);
        pcb.argv = argument;
        pcb.vidmap = false;
        pcb.rtc = false;
        pcb.files[0].ops = Some(FileOps::Stdin);
        pcb.files[1].ops = Some(FileOps::Stdout);
        for fd in &mut pcb.files[2..] {
            fd.ops = None;
        }
    }

    // SAFETY: pid was just allocated and is not yet running anywhere else.
    unsafe { paging::map_user_image(pid) };

    let entry = match read_entry_point(dentry.inode_num) {
        Ok(entry) => entry,
        Err(err) => {
            crate::serial_println!("[vtos] execute failed: {err}");
            return -1;
        }
    };
    if let Err(err) = load_image(dentry.inode_num) {
        crate::serial_println!("[vtos] execute failed: {err}");
        return -1;
    }

    gdt::set_kernel_stack(pcb::kernel_stack_top(pid));
    pcb::set_current_pid(pid);

    // SAFETY: `entry` was read from a verified executable's header and the
    // user image was just populated at `PROGRAM_IMAGE`; the IRET frame
    // matches a ring-3 entry into that image.
    unsafe { enter_user_mode(entry) };
}

/// Builds the `{SS, ESP, EFLAGS, CS, EIP}` IRET frame and jumps to ring 3.
/// Isolated here as the kernel's one "jump into user mode" primitive.
///
/// # Safety
/// `entry` must be a valid, executable virtual address inside the
/// currently mapped user image; the user stack must be mapped and usable.
unsafe fn enter_user_mode(entry: u32) -> ! {
    let user_cs = u32::from(gdt::user_code_selector());
    let user_ds = u32::from(gdt::user_data_selector());

    asm!(
        "mov ax, {ds:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push {ds:e}",
        "push {stack:e}",
        "pushfd",
        "pop eax",
        "or eax, 0x200", // EFLAGS.IF = 1
        "push eax",
        "push {cs:e}",
        "push {entry:e}",
        "iretd",
        ds = in(reg) user_ds,
        stack = in(reg) USER_STACK,
        cs = in(reg) user_cs,
        entry = in(reg) entry,
        out("ax") _,
        out("eax") _,
        options(noreturn),
    );
}

/// Terminates the current process with `status`, reclaiming its resources
/// and resuming the parent's `execute` call. Terminal roots (pid 0..2)
/// are never reaped: the caller is expected to re-`execute` `shell` on that
/// terminal afterward, which [`scheduler`] does from the PIT tick when it
/// observes `to_be_halt`.
pub fn halt(status: u32) -> ! {
    let pid = pcb::current_pid();
    let (parent_ebp, parent_pid) = {
        let mut pcb = pcb::get(pid);
        pcb.close_user_files();
        pcb.present = false;
        (pcb.parent_ebp, pcb.parent)
    };

    let Some(parent_pid) = parent_pid else {
        // A terminal root halting (e.g. the shell exiting its own prompt
        // loop) has nowhere to return to; the scheduler restarts it.
        scheduler::restart_terminal_root(pid);
    };

    // SAFETY: `parent_pid` was this process's real parent, still present.
    unsafe { paging::map_user_image(parent_pid) };

    let parent_esp0 = pcb::get(parent_pid).esp0;
    gdt::set_kernel_stack(parent_esp0);
    pcb::set_current_pid(parent_pid);

    let reported_status = if idt::take_exception_flag() {
        256
    } else {
        status
    };

    // SAFETY: `parent_ebp` was saved by this process's own `execute` call
    // into the parent's still-live kernel stack frame; restoring it and
    // executing `leave; ret` resumes exactly where that `execute` call
    // left off, with the accumulator holding the reported status.
    unsafe {
        asm!(
            "mov ebp, {ebp}",
            "leave",
            "ret",
            ebp = in(reg) parent_ebp,
            in("eax") reported_status,
            options(noreturn),
        );
    }
}
