//! Per-file-type operation tables.
//!
//! `read`/`write`/`open`/`close` dispatch through [`FileOps`], a tagged
//! enum rather than a vtable of function pointers, with one variant per
//! file type (stdin, stdout, RTC, directory, regular file) selected by the
//! dentry's type tag in `open()`.

use spin::Mutex;

use crate::config::FS_NAME_LEN;
use crate::error::{KernelError, KernelResult};

/// Which operations table a file descriptor dispatches through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOps {
    /// Line-buffered keyboard input; writes always fail.
    Stdin,
    /// Terminal output; reads always fail.
    Stdout,
    /// The virtualized real-time clock.
    Rtc,
    /// The single root directory.
    Directory,
    /// A regular file backed by inode data blocks.
    Regular,
}

/// Cursor shared by every open directory descriptor: there is only one
/// directory, so one cursor suffices. Rewinds to 0 once every dentry has
/// been visited.
static DIR_CURSOR: Mutex<usize> = Mutex::new(0);

/// Resets the shared directory cursor. Called by `dir_open`.
pub fn reset_dir_cursor() {
    *DIR_CURSOR.lock() = 0;
}

impl FileOps {
    pub fn open(self, name: &[u8]) -> KernelResult<()> {
        match self {
            Self::Stdin | Self::Stdout => Ok(()),
            Self::Rtc => crate::devices::rtc::open(),
            Self::Directory => {
                if super::read_dentry_by_name(name).is_none() {
                    return Err(KernelError::FileNotFound);
                }
                reset_dir_cursor();
                Ok(())
            }
            Self::Regular => {
                if super::read_dentry_by_name(name).is_none() {
                    return Err(KernelError::FileNotFound);
                }
                Ok(())
            }
        }
    }

    pub fn close(self) -> KernelResult<()> {
        match self {
            Self::Rtc => crate::devices::rtc::close(),
            _ => Ok(()),
        }
    }

    pub fn read(self, inode: u32, file_pos: u32, buf: &mut [u8]) -> KernelResult<usize> {
        match self {
            Self::Stdin => Ok(crate::devices::terminal::read_active(buf)),
            Self::Stdout => Err(KernelError::InvalidArgument),
            Self::Rtc => crate::devices::rtc::read(),
            Self::Directory => Ok(read_next_dentry_name(buf)),
            Self::Regular => super::read_data(inode, file_pos, buf),
        }
    }

    pub fn write(self, buf: &[u8]) -> KernelResult<usize> {
        match self {
            Self::Stdin => Err(KernelError::InvalidArgument),
            Self::Stdout => Ok(crate::devices::terminal::write_active(buf)),
            Self::Rtc => crate::devices::rtc::write(buf),
            Self::Directory | Self::Regular => Err(KernelError::InvalidArgument),
        }
    }
}

/// Copies the next present dentry's name into `buf` (clamped to
/// `FS_NAME_LEN + 1`), advances the shared cursor, and rewinds it to 0
/// once the table is exhausted.
fn read_next_dentry_name(buf: &mut [u8]) -> usize {
    let mut cursor = DIR_CURSOR.lock();
    let Some(dentry) = super::read_dentry_by_index(*cursor as u32) else {
        *cursor = 0;
        return 0;
    };
    let name = dentry.name_bytes();
    let max = core::cmp::min(buf.len(), FS_NAME_LEN + 1);
    let len = core::cmp::min(name.len(), max);
    buf[..len].copy_from_slice(&name[..len]);
    *cursor += 1;
    len
}
