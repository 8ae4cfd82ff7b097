//! Virtual terminal state: the line-edited input buffer and the saved
//! cursor the scheduler swaps in and out as it rotates terminals.
//!
//! One instance per terminal, owned by [`crate::process::scheduler`],
//! bundling `input`, `length`, and `input_in_progress` into a single
//! `Terminal` struct behind a `Mutex` rather than scattering bare statics.

use crate::config::TERMINAL_INPUT_CAPACITY;
use crate::port;

/// How many trailing cells a single Tab keystroke may have written, so
/// Backspace knows how far back to erase. Every other keystroke writes
/// exactly one cell.
const TAB_WIDTH: usize = 4;

pub struct Terminal {
    /// pid of the terminal-root shell running on this terminal.
    pub pid: usize,
    /// Column/row the on-screen cursor had when this terminal was last
    /// swapped out, so swapping back in resumes it exactly.
    pub cursor: (usize, usize),
    /// Set by the keyboard handler on Ctrl+C; consumed by the scheduler's
    /// next tick, which raises `halt(6)` on this terminal's process.
    pub to_be_halt: bool,

    buffer: [u8; TERMINAL_INPUT_CAPACITY],
    /// Number of cells each buffer position's keystroke wrote, read
    /// backwards from `length` by Backspace; 1 for an ordinary character,
    /// up to `TAB_WIDTH` for the last cell of a Tab.
    group_len: [u8; TERMINAL_INPUT_CAPACITY],
    length: usize,
    in_progress: bool,
}

impl Terminal {
    pub const fn new() -> Self {
        Self {
            pid: 0,
            cursor: (0, 0),
            to_be_halt: false,
            buffer: [0; TERMINAL_INPUT_CAPACITY],
            group_len: [0; TERMINAL_INPUT_CAPACITY],
            length: 0,
            in_progress: false,
        }
    }

    fn push(&mut self, byte: u8, group_len: u8) -> bool {
        if self.length >= TERMINAL_INPUT_CAPACITY {
            return false;
        }
        self.buffer[self.length] = byte;
        self.group_len[self.length] = group_len;
        self.length += 1;
        true
    }

    /// Appends one printable character and echoes it.
    pub fn type_char(&mut self, ch: u8) {
        if self.push(ch, 1) {
            super::console::write_byte_raw(ch);
        }
    }

    /// Writes up to `TAB_WIDTH` spaces, bringing the cursor column to the
    /// next multiple of `TAB_WIDTH`, and marks the last one so a later
    /// Backspace erases the whole run at once.
    pub fn type_tab(&mut self) {
        let (column, _) = super::console::cursor_position();
        let mut spaces = TAB_WIDTH - (column % TAB_WIDTH);
        if spaces == 0 {
            spaces = TAB_WIDTH;
        }
        for i in 0..spaces {
            let marker = if i + 1 == spaces { spaces as u8 } else { 0 };
            if !self.push(b' ', marker) {
                break;
            }
            super::console::write_byte_raw(b' ');
        }
    }

    /// Erases one cell, or the whole tab run if the erased cell carries a
    /// tab marker.
    pub fn backspace(&mut self) {
        if self.length == 0 {
            return;
        }
        let marker = self.group_len[self.length - 1];
        let erase_count = if marker > 1 { marker as usize } else { 1 };
        for _ in 0..erase_count.min(self.length) {
            self.length -= 1;
            self.buffer[self.length] = 0;
            self.group_len[self.length] = 0;
            super::console::write_byte_raw(0x08);
        }
    }

    /// Echoes a newline and clears `in_progress`, waking a blocked read.
    pub fn enter(&mut self) {
        super::console::write_byte_raw(b'\n');
        self.in_progress = false;
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

/// Arms `in_progress` on the active terminal and spins until Enter clears
/// it, then copies up to `min(buf.len(), length)` bytes, NUL-terminating
/// if room remains, and clears the input buffer.
pub fn read_active(buf: &mut [u8]) -> usize {
    {
        let mut terminal = crate::process::scheduler::active_terminal_mut();
        terminal.in_progress = true;
    }

    loop {
        let done = !crate::process::scheduler::active_terminal_mut().in_progress;
        if done {
            break;
        }
        // SAFETY: halting until the next interrupt is always sound; the
        // keyboard handler is what clears `in_progress`.
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }

    let mut terminal = crate::process::scheduler::active_terminal_mut();
    let copy_len = buf.len().min(terminal.length);
    buf[..copy_len].copy_from_slice(&terminal.buffer[..copy_len]);
    if copy_len < buf.len() {
        buf[copy_len] = 0;
    }
    terminal.length = 0;
    terminal.group_len = [0; TERMINAL_INPUT_CAPACITY];
    copy_len
}

/// Prints `buf` (including embedded NULs) to the active terminal
/// atomically, then clears its input buffer.
pub fn write_active(buf: &[u8]) -> usize {
    port::without_interrupts(|| {
        for &byte in buf {
            super::console::write_byte_raw(byte);
        }
        let mut terminal = crate::process::scheduler::active_terminal_mut();
        terminal.length = 0;
        terminal.group_len = [0; TERMINAL_INPUT_CAPACITY];
    });
    buf.len()
}
