//! Hardware-facing device drivers: the PIT tick source, the virtualized
//! RTC, the keyboard line editor, and the VGA text console each terminal
//! writes to.

pub mod console;
pub mod keyboard;
pub mod pit;
pub mod rtc;
pub mod terminal;
