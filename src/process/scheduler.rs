//! Round-robin scheduler across the three virtual terminals.
//!
//! Three terminal roots, each with its own saved `ebp`/`esp0`, rotated one
//! PIT tick at a time. The `ebp`-swap-then-`ret` trick that resumes a
//! parked process exactly where it yielded is isolated in
//! [`dispatch_tick`], the scheduler's one hand-written asm block.

use core::arch::asm;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::TERMINAL_COUNT;
use crate::devices::terminal::Terminal;
use crate::fs::ops::FileOps;
use crate::{fs, gdt, paging, process};

static TERMINALS: [Mutex<Terminal>; TERMINAL_COUNT] =
    [const { Mutex::new(Terminal::new()) }; TERMINAL_COUNT];

/// Which terminal's video page is mapped to the live VGA buffer.
static SHOWN_TERMINAL: AtomicUsize = AtomicUsize::new(0);
/// Which terminal's process is presently running on the CPU.
static ACTIVE_TERMINAL: AtomicUsize = AtomicUsize::new(0);

#[must_use]
pub fn shown_terminal() -> usize {
    SHOWN_TERMINAL.load(Ordering::SeqCst)
}

#[must_use]
pub fn active_terminal() -> usize {
    ACTIVE_TERMINAL.load(Ordering::SeqCst)
}

/// Switches which terminal is shown on the live VGA page (Alt+F1..F3).
pub fn switch_shown_terminal(index: usize) {
    if index < TERMINAL_COUNT {
        SHOWN_TERMINAL.store(index, Ordering::SeqCst);
    }
}

/// Locks and returns terminal `index`.
pub fn terminal(index: usize) -> spin::MutexGuard<'static, Terminal> {
    TERMINALS[index].lock()
}

/// Locks and returns the terminal the CPU is currently executing on
/// behalf of.
pub fn active_terminal_mut() -> spin::MutexGuard<'static, Terminal> {
    terminal(active_terminal())
}

const SHELL_NAME: &[u8] = b"shell";

/// Launches one `shell` per terminal, arranging each one's saved `ebp` so
/// that the first scheduler dispatch onto it resumes into a ring-3 entry
/// rather than an ordinary function return. Called once at boot.
///
/// # Safety
/// Must run once, after paging/the heap/the file system are initialized
/// and before `sti`.
pub unsafe fn start_terminals() {
    let dentry = fs::read_dentry_by_name(SHELL_NAME).expect("shell executable must be present");

    for pid in (0..TERMINAL_COUNT).rev() {
        {
            let mut terminal = TERMINALS[pid].lock();
            *terminal = Terminal::new();
            terminal.pid = pid;
        }

        let mut pcb = process::pcb::get(pid);
        pcb.present = true;
        pcb.pid = pid;
        pcb.parent = None;
        pcb.parent_ebp = 0;
        pcb.esp0 = process::pcb::kernel_stack_top(pid);
        pcb.files[0].ops = Some(FileOps::Stdin);
        pcb.files[1].ops = Some(FileOps::Stdout);
        for fd in &mut pcb.files[2..] {
            fd.ops = None;
        }
        drop(pcb);

        // SAFETY: pid is a terminal root, not yet running.
        paging::map_user_image(pid);

        let mut entry_bytes = [0u8; 4];
        fs::read_data(dentry.inode_num, 24, &mut entry_bytes).ok();
        let entry = u32::from_le_bytes(entry_bytes);

        let dest = core::slice::from_raw_parts_mut(
            crate::config::PROGRAM_IMAGE as *mut u8,
            crate::config::PROGRAM_IMAGE_LIMIT as usize,
        );
        fs::read_data(dentry.inode_num, 0, dest).ok();

        let user_cs = u32::from(gdt::user_code_selector());
        let user_ds = u32::from(gdt::user_data_selector());
        let kernel_stack_top = process::pcb::kernel_stack_top(pid);

        let mut saved_ebp: u32;
        // SAFETY: builds a parked IRET frame on this process's own kernel
        // stack (switched to temporarily via `esp0`), recording the
        // resulting `ebp` so the first scheduler dispatch can `ret` into
        // it exactly as it would a process that yielded mid-`execute`. The
        // pushed EFLAGS has IF forced on regardless of the boot thread's
        // current flags, since `sti` is never called: interrupts turn on
        // the moment this frame's `iretd` runs.
        asm!(
            "mov esi, esp",
            "mov esp, {kernel_stack_top:e}",
            "push {user_ds:e}",
            "push {user_stack:e}",
            "pushfd",
            "or dword ptr [esp], 0x200",
            "push {user_cs:e}",
            "push {entry:e}",
            "push 2f",
            "push {entry:e}",
            "mov {saved_ebp}, esp",
            "mov esp, esi",
            "jmp 3f",
            "2:",
            "iretd",
            "3:",
            kernel_stack_top = in(reg) kernel_stack_top,
            user_ds = in(reg) user_ds,
            user_stack = in(reg) crate::config::USER_STACK,
            user_cs = in(reg) user_cs,
            entry = in(reg) entry,
            saved_ebp = out(reg) saved_ebp,
            out("esi") _,
        );

        process::pcb::get(pid).ebp = saved_ebp;
    }

    let mut first = process::pcb::get(0);
    let first_ebp = first.ebp;
    first.esp0 = process::pcb::kernel_stack_top(0);
    let first_esp0 = first.esp0;
    drop(first);

    paging::map_user_image(0);
    gdt::set_kernel_stack(first_esp0);
    process::pcb::set_current_pid(0);

    // SAFETY: jumps into the first terminal's parked frame, built above.
    asm!(
        "mov ebp, {ebp}",
        "leave",
        "ret",
        ebp = in(reg) first_ebp,
        options(noreturn),
    );
}

/// Called once the PIC has acknowledged IRQ 0. Saves the outgoing
/// terminal's cursor and stack pointers, rotates `active_terminal`,
/// re-points the video page tables, swaps `TSS.ESP0` and the user-image
/// PDE, and resumes the incoming process exactly where it last yielded.
pub fn on_tick() {
    let active = active_terminal();
    let next = (active + 1) % TERMINAL_COUNT;

    let cursor = crate::devices::console::cursor_position();
    terminal(active).cursor = cursor;

    if next == shown_terminal() {
        paging::map_video_page_live();
    } else {
        paging::map_video_page_hidden(next);
    }
    crate::devices::console::set_cursor_position(terminal(next).cursor);

    ACTIVE_TERMINAL.store(next, Ordering::SeqCst);

    let next_pid = terminal(next).pid;
    let to_be_halt = {
        let mut t = terminal(next);
        core::mem::replace(&mut t.to_be_halt, false)
    };

    dispatch_tick(next_pid, to_be_halt);
}

/// The actual stack swap. Saves the outgoing process's `ebp`/`esp0` into
/// its PCB, loads the incoming process's, and either `ret`s into it or —
/// if the user requested Ctrl+C on that terminal — calls `halt(6)` on its
/// behalf instead.
fn dispatch_tick(next_pid: usize, to_be_halt: bool) {
    let current_pid = process::pcb::current_pid();

    let mut saved_ebp: u32;
    // SAFETY: `current_pid`'s PCB belongs to the process this function was
    // invoked on behalf of (the PIT ISR runs on its kernel stack).
    unsafe {
        asm!("mov {}, ebp", out(reg) saved_ebp, options(nomem, nostack, preserves_flags));
    }
    {
        let mut current = process::pcb::get(current_pid);
        current.ebp = saved_ebp;
        current.esp0 = process::pcb::kernel_stack_top(current_pid);
    }

    let next_esp0 = process::pcb::get(next_pid).esp0;
    let next_pcb_ebp = process::pcb::get(next_pid).ebp;
    let next_vidmap = process::pcb::get(next_pid).vidmap;

    gdt::set_kernel_stack(next_esp0);
    paging::set_user_video_present(next_vidmap);
    // SAFETY: the user-image PDE must track whichever process is about to
    // run; reloading CR3 after is required TLB discipline.
    unsafe { paging::map_user_image(next_pid) };
    process::pcb::set_current_pid(next_pid);

    if to_be_halt {
        process::halt(6);
    }

    // SAFETY: `next_pcb_ebp` is the frame this process last yielded from
    // (either a prior `dispatch_tick`, or the parked frame built by
    // `start_terminals`); restoring it and `leave;ret`-ing resumes it.
    unsafe {
        asm!(
            "mov ebp, {ebp}",
            "leave",
            "ret",
            ebp = in(reg) next_pcb_ebp,
            options(noreturn),
        );
    }
}

/// Re-executes `shell` on the terminal pid `pid` belonged to; none of the
/// three terminal roots ever truly die, so `halt` reaching one of them
/// means the terminal just gets a fresh shell instead.
pub fn restart_terminal_root(pid: usize) -> ! {
    let mut pcb = process::pcb::get(pid);
    pcb.present = true;
    pcb.parent = None;
    pcb.vidmap = false;
    pcb.rtc = false;
    pcb.files[0].ops = Some(FileOps::Stdin);
    pcb.files[1].ops = Some(FileOps::Stdout);
    for fd in &mut pcb.files[2..] {
        fd.ops = None;
    }
    drop(pcb);

    process::execute(SHELL_NAME);
    crate::hlt_loop()
}
