//! Serial-port logging.
//!
//! A 16550 UART driven directly over [`crate::port`], behind `lazy_static!`
//! + `spin::Mutex` (disable interrupts, set the baud-rate divisor, 8N1,
//! enable FIFO). The `_print`/`serial_print!`/`serial_println!` macros are
//! the kernel's only log sink: every subsystem
//! init, scheduler decision, syscall dispatch, and exception writes a line
//! here.

use lazy_static::lazy_static;
use spin::Mutex;

const COM1: u16 = 0x3F8;

/// A minimal 16550 UART driver, programmed for 38400 8N1 with FIFOs on.
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    /// Creates a driver for the UART at `base`. Does not touch hardware
    /// until [`Self::init`] runs.
    ///
    /// # Safety
    /// `base` must be the I/O base of a real (or emulated) 16550-compatible
    /// UART.
    const unsafe fn new(base: u16) -> Self {
        Self { base }
    }

    /// Programs the UART: disables its interrupts, sets the baud-rate
    /// divisor latch, selects 8 data bits/no parity/1 stop bit, and enables
    /// the FIFOs.
    fn init(&mut self) {
        // SAFETY: `self.base` is a UART I/O base and this is the standard
        // 16550 init sequence (interrupt-enable off, DLAB on to set the
        // divisor, DLAB off, FIFO on, RTS/DSR set).
        unsafe {
            crate::port::outb(self.base + 1, 0x00); // disable interrupts
            crate::port::outb(self.base + 3, 0x80); // enable DLAB
            crate::port::outb(self.base, 0x03); // divisor low byte (38400 baud)
            crate::port::outb(self.base + 1, 0x00); // divisor high byte
            crate::port::outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
            crate::port::outb(self.base + 2, 0xC7); // enable FIFO, clear, 14-byte threshold
            crate::port::outb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
        }
    }

    fn line_is_ready_to_transmit(&self) -> bool {
        // SAFETY: reading the line-status register has no side effect.
        unsafe { crate::port::inb(self.base + 5) & 0x20 != 0 }
    }

    fn send(&mut self, byte: u8) {
        while !self.line_is_ready_to_transmit() {
            core::hint::spin_loop();
        }
        // SAFETY: the line-status register just confirmed the transmit
        // holding register is empty.
        unsafe {
            crate::port::outb(self.base, byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    /// The kernel's single serial log sink, on COM1.
    pub static ref SERIAL1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 base; called once here.
        let mut serial_port = unsafe { SerialPort::new(COM1) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    #[expect(
        clippy::expect_used,
        reason = "Serial port should be correctly initialized."
    )]
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("Failed to print on serial port.");
}

/// Print to the host machine through the serial port interface.
#[macro_export]
macro_rules! serial_print {
    ($($args:tt)*) => {
        $crate::serial::_print(format_args!($($args)*));
    };
}

/// Print a line to the host machine through the serial port interface.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*));
}
