//! VGA text-mode console writer.
//!
//! An 80x25 `ScreenChar` grid at a fixed physical address, a `Writer`
//! tracking column position and color, scroll-on-overflow, and a hardware
//! cursor kept in sync via the CRTC index/data ports. The physical frame
//! behind that virtual address changes out from under this module every
//! scheduler tick ([`crate::paging`]
//! repoints it to a hidden per-terminal buffer), so every write below goes
//! through the same fixed virtual address and simply renders onto whatever
//! buffer is currently live for the running process's terminal.

use core::fmt;

use spin::Mutex;
use volatile::Volatile;

use crate::port;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;
const VIDEO_VIRT_ADDR: usize = 0xB8000;

const CRTC_INDEX_PORT: u16 = 0x3D4;
const CRTC_DATA_PORT: u16 = 0x3D5;
const CRTC_CURSOR_HIGH: u8 = 0x0E;
const CRTC_CURSOR_LOW: u8 = 0x0F;

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    LightGray = 7,
    Yellow = 14,
    White = 15,
}

#[derive(Clone, Copy)]
#[repr(transparent)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> Self {
        Self((background as u8) << 4 | (foreground as u8))
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

struct Writer {
    column: usize,
    row: usize,
    color_code: ColorCode,
}

impl Writer {
    const fn new() -> Self {
        Self {
            column: 0,
            row: 0,
            color_code: ColorCode::new(Color::LightGray, Color::Black),
        }
    }

    fn buffer(&mut self) -> &'static mut Buffer {
        // SAFETY: the VGA/hidden-buffer frame behind this virtual address
        // is always present, mapped, and large enough for an 80x25 grid;
        // paging guarantees the mapping for the whole kernel's lifetime.
        unsafe { &mut *(VIDEO_VIRT_ADDR as *mut Buffer) }
    }

    fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            0x08 => self.backspace(),
            byte => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }
                let (row, col, color_code) = (self.row, self.column, self.color_code);
                self.buffer().chars[row][col].write(ScreenChar {
                    ascii_character: byte,
                    color_code,
                });
                self.column += 1;
                self.move_cursor();
            }
        }
    }

    fn backspace(&mut self) {
        if self.column > 0 {
            self.column -= 1;
            let (row, col, color_code) = (self.row, self.column, self.color_code);
            self.buffer().chars[row][col].write(ScreenChar {
                ascii_character: b' ',
                color_code,
            });
            self.move_cursor();
        }
    }

    fn new_line(&mut self) {
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
        } else {
            for row in 1..BUFFER_HEIGHT {
                for col in 0..BUFFER_WIDTH {
                    let character = self.buffer().chars[row][col].read();
                    self.buffer().chars[row - 1][col].write(character);
                }
            }
            self.clear_row(BUFFER_HEIGHT - 1);
        }
        self.column = 0;
        self.move_cursor();
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.buffer().chars[row][col].write(blank);
        }
    }

    fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.column = 0;
        self.move_cursor();
    }

    fn move_cursor(&self) {
        let position = (self.row * BUFFER_WIDTH + self.column) as u16;
        // SAFETY: the CRTC index/data port pair is always present on a VGA
        // text-mode adapter; this only changes where the blinking cursor
        // is drawn.
        unsafe {
            port::outb(CRTC_INDEX_PORT, CRTC_CURSOR_LOW);
            port::outb(CRTC_DATA_PORT, (position & 0xFF) as u8);
            port::outb(CRTC_INDEX_PORT, CRTC_CURSOR_HIGH);
            port::outb(CRTC_DATA_PORT, ((position >> 8) & 0xFF) as u8);
        }
    }

    fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' | 0x08 => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

static WRITER: Mutex<Writer> = Mutex::new(Writer::new());

/// Writes `s` to the currently mapped video page.
pub fn write_str(s: &str) {
    use core::fmt::Write as _;
    let _ = WRITER.lock().write_str(s);
}

/// Clears the currently mapped video page and homes the cursor (Ctrl+L).
pub fn clear_screen() {
    WRITER.lock().clear_screen();
}

/// Writes one raw byte, including control bytes that are not printable
/// ASCII (used by `write_active` to echo NULs embedded in a buffer).
pub fn write_byte_raw(byte: u8) {
    WRITER.lock().write_byte(byte);
}

/// Current on-screen cursor position as `(column, row)`.
pub fn cursor_position() -> (usize, usize) {
    let writer = WRITER.lock();
    (writer.column, writer.row)
}

/// Restores a previously saved cursor position, e.g. after a terminal
/// switch re-points the video page at that terminal's own buffer.
pub fn set_cursor_position(position: (usize, usize)) {
    let mut writer = WRITER.lock();
    writer.column = position.0;
    writer.row = position.1;
    writer.move_cursor();
}
