//! Kernel-wide constants.
//!
//! Every address, size, and magic number shared across more than one
//! subsystem lives here instead of being scattered through the modules
//! that use it.

/// Number of process control block slots: three terminal roots plus three
/// user descendants.
pub const MAX_PROCESS: usize = 6;

/// Number of virtual terminals (and terminal-root shells).
pub const TERMINAL_COUNT: usize = 3;

/// Size in bytes of one process's kernel stack. The PCB for pid `p` lives
/// at the bottom of that stack.
pub const KERNEL_STACK_SIZE: usize = 8 * 1024;

/// Top of the kernel-stack region pids are carved out of, counting down.
pub const KERNEL_STACK_TOP: u32 = 0x0080_0000;

/// Physical/virtual address of the first 4 MiB kernel identity region.
pub const KERNEL_ADDR: u32 = 0x0040_0000;

/// Virtual base address of the per-process 4 MiB user image window
/// (page-directory index 32, i.e. 128 MiB).
pub const USER_ENTRY_PDE: usize = 32;

/// Virtual base address of the 4 MiB per-process user image window.
pub const USER_IMAGE_BASE: u32 = 0x0800_0000;

/// Size in bytes of the per-process user image window.
pub const USER_IMAGE_SIZE: u32 = 0x0040_0000;

/// Virtual address a user program's executable is flat-loaded at.
pub const PROGRAM_IMAGE: u32 = 0x0804_8000;

/// Maximum number of bytes copied into the user image for one executable:
/// everything from `PROGRAM_IMAGE` to the end of the user image window.
pub const PROGRAM_IMAGE_LIMIT: u32 = USER_IMAGE_BASE + USER_IMAGE_SIZE - PROGRAM_IMAGE;

/// Top of the user-mode stack (grows down from here).
pub const USER_STACK: u32 = 0x0840_0000;

/// Page-directory/page-table index shared by the kernel-video and
/// user-video page tables: `0xB8`, i.e. virtual address
/// `0x000B8000`/`0x083B8000`.
pub const VIDMEM_INDEX: usize = 0xB8;

/// `int` vector used for system calls.
pub const SYSCALL_INTERRUPT_INDEX: u8 = 0x80;

/// PIT tick rate driving the scheduler.
pub const PIT_FREQUENCY_HZ: u32 = 20;

/// The real RTC chip is programmed to this rate once, at init.
pub const RTC_MAX_FREQ: u32 = 1024;

/// Slowest frequency a process may request from the virtualized RTC.
pub const RTC_MIN_FREQ: u32 = 2;

/// Maximum number of directory entries the boot block can hold.
pub const FS_DENTRY_COUNT: usize = 63;

/// Length in bytes of a file/directory name, not counting a NUL unless the
/// name is shorter than this.
pub const FS_NAME_LEN: usize = 32;

/// Size in bytes of one file-system data block (and of one inode's header
/// block on disk).
pub const FS_BLOCK_SIZE: usize = 4096;

/// Number of `u32` data-block indices an inode can hold:
/// `(4096 - size_of::<u32>()) / size_of::<u32>()`.
pub const FS_INODE_BLOCK_COUNT: usize = 1023;

/// Size in bytes of one ATA PIO sector.
pub const ATA_SECTOR_SIZE: usize = 512;

/// LBA the file-system image starts at on the primary master disk.
pub const FS_IMAGE_LBA_START: u32 = 0;

/// Sectors reserved in RAM (and on disk) for the file-system image: a
/// 256 KiB budget, generous for a handful of small teaching-kernel
/// programs plus their directory and inode metadata.
pub const FS_IMAGE_SECTOR_COUNT: usize = 512;

/// Maximum length of a terminal's line-edited input buffer.
pub const TERMINAL_INPUT_CAPACITY: usize = 128;

/// Maximum length of the argument string captured at `execute`.
pub const ARGV_CAPACITY: usize = 128;

/// Number of file-descriptor slots per process.
pub const FD_TABLE_SIZE: usize = 8;

/// Magic bytes identifying an ELF-style executable file.
pub const EXECUTABLE_MAGIC: [u8; 4] = [0x7F, 0x45, 0x4C, 0x46];
