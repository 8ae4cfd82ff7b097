//! Kernel-internal error type.
//!
//! A single enum so call sites can match on failure kind instead of
//! string-sniffing fallible setup steps. Syscall handlers catch every
//! variant at the ABI boundary and collapse it to the `-1` the syscall
//! surface promises; `KernelError` itself never crosses into user space.
use core::fmt;

/// Everything that can go wrong inside the kernel below the syscall
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A physical frame could not be allocated.
    OutOfMemory,
    /// No PCB slot was free for `execute`.
    NoFreeProcess,
    /// No file-descriptor slot was free for `open`.
    NoFreeFileDescriptor,
    /// No inode was free for `create`.
    NoFreeInode,
    /// No data block was free for a write.
    NoFreeDataBlock,
    /// A directory entry by that name does not exist.
    FileNotFound,
    /// The dentry/inode index was out of the file system's range.
    InvalidIndex,
    /// The requested inode is currently open; mutation refused.
    FileBusy,
    /// A file failed the executable-magic check.
    NotExecutable,
    /// A caller-supplied pointer was null, out of range, or otherwise
    /// invalid for the requested operation.
    InvalidArgument,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::OutOfMemory => "out of memory",
            Self::NoFreeProcess => "no free process slot",
            Self::NoFreeFileDescriptor => "no free file descriptor",
            Self::NoFreeInode => "no free inode",
            Self::NoFreeDataBlock => "no free data block",
            Self::FileNotFound => "file not found",
            Self::InvalidIndex => "index out of range",
            Self::FileBusy => "file is open elsewhere",
            Self::NotExecutable => "not an executable",
            Self::InvalidArgument => "invalid argument",
        };
        f.write_str(message)
    }
}

/// Shorthand used throughout the kernel for fallible setup steps.
pub type KernelResult<T> = Result<T, KernelError>;

/// Collapses any `KernelResult` to the syscall ABI's `-1`-on-error
/// convention, logging the reason to the serial console first.
pub fn to_syscall_result(result: KernelResult<i32>) -> i32 {
    match result {
        Ok(value) => value,
        Err(err) => {
            crate::serial_println!("[vtos] syscall failed: {err}");
            -1
        }
    }
}
