//! Read-mostly indexed file system over a flat block image.
//!
//! A boot block of dentries followed by the inode table then the data
//! blocks, all addressed relative to one base pointer set at boot.
//! `read_dentry_by_index`/`read_dentry_by_name` return an owned `Dentry`
//! rather than writing through an out-pointer, so a missing or
//! out-of-range lookup is just `None`; `file_size` takes an inode number
//! rather than a file descriptor, since the two only coincide for the
//! process that opened the file.
//!
//! The image is not handed to the kernel as a boot-loader module:
//! [`load_from_disk`] reads it off the primary ATA disk into a fixed RAM
//! buffer before [`init`] runs, and [`create`]/[`delete`] write that
//! buffer straight back out afterward so the disk never drifts from what's
//! mapped in memory.

pub mod ata;
mod layout;
pub mod ops;

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

pub use layout::{Dentry, FileType};
use layout::{names_match, BootBlock, DataBlock, Inode};

use crate::config::{
    ATA_SECTOR_SIZE, FS_BLOCK_SIZE, FS_DENTRY_COUNT, FS_IMAGE_LBA_START, FS_IMAGE_SECTOR_COUNT,
    FS_INODE_BLOCK_COUNT,
};
use crate::error::{KernelError, KernelResult};

/// Bitmap of free/used inode slots: one bit per inode, 64 inodes max.
/// Tracking allocation explicitly (rather than scanning for a `0`-size
/// inode) is what makes deleting a file and later reusing its inode safe.
struct Bitmap {
    bits: [u8; 8],
}

impl Bitmap {
    const fn empty() -> Self {
        Self { bits: [0; 8] }
    }

    fn is_set(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    fn set(&mut self, index: usize) {
        self.bits[index / 8] |= 1 << (index % 8);
    }

    fn clear(&mut self, index: usize) {
        self.bits[index / 8] &= !(1 << (index % 8));
    }

    fn first_clear(&self, limit: usize) -> Option<usize> {
        (0..limit).find(|&i| !self.is_set(i))
    }
}

static INODE_BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::empty());
static DATA_BLOCK_BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::empty());

static IMAGE_BASE: AtomicUsize = AtomicUsize::new(0);

const IMAGE_BYTES: usize = FS_IMAGE_SECTOR_COUNT * ATA_SECTOR_SIZE;

/// RAM copy of the on-disk image, page-aligned so [`BootBlock`]'s `repr`
/// lines up whatever offset the linker gives this `.bss` symbol.
#[repr(align(4096))]
struct ImageBuffer([u8; IMAGE_BYTES]);

static mut IMAGE_BUFFER: ImageBuffer = ImageBuffer([0; IMAGE_BYTES]);

/// Reads the file-system image off the primary ATA disk into
/// [`IMAGE_BUFFER`], [`ATA_SECTOR_SIZE`]-sized sectors at a time (the
/// command-block sector-count register is only 8 bits wide, so a
/// [`FS_IMAGE_SECTOR_COUNT`]-sector image is read in chunks of up to 255
/// sectors), and returns the buffer's address for [`init`].
///
/// # Safety
/// Must run once, before any other code reads or writes [`IMAGE_BUFFER`].
pub unsafe fn load_from_disk() -> usize {
    const MAX_CHUNK: usize = u8::MAX as usize;

    let buf = &mut IMAGE_BUFFER.0[..];
    let mut lba = FS_IMAGE_LBA_START;
    let mut done = 0;
    while done < buf.len() {
        let remaining_sectors = (buf.len() - done) / ATA_SECTOR_SIZE;
        let chunk_sectors = remaining_sectors.min(MAX_CHUNK);
        let chunk_bytes = chunk_sectors * ATA_SECTOR_SIZE;
        ata::read_sectors(lba, chunk_sectors as u8, &mut buf[done..done + chunk_bytes]);
        done += chunk_bytes;
        lba += chunk_sectors as u32;
    }

    core::ptr::addr_of!(IMAGE_BUFFER) as usize
}

/// Writes the whole in-RAM image back to disk, the same way `load_from_disk`
/// reads it in. Called after every mutation ([`create`], [`delete`]) so the
/// backing disk never drifts from what the kernel has in RAM.
fn flush_to_disk() {
    const MAX_CHUNK: usize = u8::MAX as usize;

    let base = IMAGE_BASE.load(Ordering::Relaxed);
    // SAFETY: `base` was set by `init` to a live `IMAGE_BYTES`-long buffer.
    let buf = unsafe { core::slice::from_raw_parts(base as *const u8, IMAGE_BYTES) };

    let mut lba = FS_IMAGE_LBA_START;
    let mut done = 0;
    while done < buf.len() {
        let remaining_sectors = (buf.len() - done) / ATA_SECTOR_SIZE;
        let chunk_sectors = remaining_sectors.min(MAX_CHUNK);
        let chunk_bytes = chunk_sectors * ATA_SECTOR_SIZE;
        ata::write_sectors(lba, chunk_sectors as u8, &buf[done..done + chunk_bytes]);
        done += chunk_bytes;
        lba += chunk_sectors as u32;
    }
}

fn boot_block() -> &'static BootBlock {
    let base = IMAGE_BASE.load(Ordering::Relaxed);
    debug_assert_ne!(base, 0, "fs::init must run before any fs access");
    // SAFETY: `base` was set once at boot to the start of a valid file
    // system image that outlives the kernel.
    unsafe { &*(base as *const BootBlock) }
}

fn inode_table() -> *const Inode {
    // SAFETY: the inode table immediately follows the boot block.
    unsafe { (boot_block() as *const BootBlock).add(1).cast() }
}

fn data_blocks() -> *const DataBlock {
    let inode_count = boot_block().inode_count as usize;
    // SAFETY: the data-block region follows the boot block plus the whole
    // inode table, each the same size as a boot block.
    unsafe {
        (boot_block() as *const BootBlock)
            .cast::<DataBlock>()
            .add(1 + inode_count)
    }
}

/// Records the image base address and marks every dentry's inode as used
/// in [`INODE_BITMAP`] so `create` never reuses a slot a directory entry
/// already names.
///
/// # Safety
/// `image_base` must point at a valid, 4 KiB-aligned file-system image
/// that remains mapped for the kernel's lifetime.
pub unsafe fn init(image_base: usize) {
    IMAGE_BASE.store(image_base, Ordering::Relaxed);

    let boot = boot_block();
    let mut inode_bitmap = INODE_BITMAP.lock();
    for dentry in &boot.dentries[..boot.dentry_count as usize] {
        inode_bitmap.set(dentry.inode_num as usize);
    }
    drop(inode_bitmap);

    let mut data_bitmap = DATA_BLOCK_BITMAP.lock();
    let inodes = inode_table();
    for i in 0..boot.inode_count as usize {
        // SAFETY: `i < inode_count`, within the inode table's bounds.
        let inode = unsafe { &*inodes.add(i) };
        let used_blocks = inode.file_size.div_ceil(FS_BLOCK_SIZE as u32) as usize;
        for &block in &inode.data_blocks[..used_blocks] {
            data_bitmap.set(block as usize);
        }
    }
}

/// Looks up a dentry by exact name match, per [`layout::names_match`].
pub fn read_dentry_by_name(name: &[u8]) -> Option<Dentry> {
    let boot = boot_block();
    boot.dentries[..boot.dentry_count as usize]
        .iter()
        .find(|d| names_match(name, d))
        .copied()
}

/// Returns a copy of the dentry at `index`, or `None` if it is out of
/// range.
pub fn read_dentry_by_index(index: u32) -> Option<Dentry> {
    let boot = boot_block();
    boot.dentries.get(index as usize).copied().filter(|_| index < boot.dentry_count)
}

/// Returns the byte size of the file backing `inode`.
pub fn file_size(inode: u32) -> KernelResult<u32> {
    let boot = boot_block();
    if inode >= boot.inode_count {
        return Err(KernelError::InvalidIndex);
    }
    // SAFETY: the bound above confirms `inode` indexes the inode table.
    Ok(unsafe { (*inode_table().add(inode as usize)).file_size })
}

/// Reads up to `buf.len()` bytes of `inode`'s content starting at
/// `offset`, following the data-block index array and splitting the
/// transfer across block boundaries as needed.
pub fn read_data(inode: u32, offset: u32, buf: &mut [u8]) -> KernelResult<usize> {
    let boot = boot_block();
    if inode >= boot.inode_count || buf.is_empty() {
        return Err(KernelError::InvalidIndex);
    }
    // SAFETY: the bound above confirms `inode` indexes the inode table.
    let inode_ref = unsafe { &*inode_table().add(inode as usize) };

    if offset >= inode_ref.file_size {
        return Ok(0);
    }

    let remaining_in_file = (inode_ref.file_size - offset) as usize;
    let len = core::cmp::min(buf.len(), remaining_in_file);

    let mut block_index = (offset as usize) / FS_BLOCK_SIZE;
    let mut block_offset = (offset as usize) % FS_BLOCK_SIZE;
    let blocks = data_blocks();

    let mut written = 0;
    while written < len {
        let block_num = inode_ref.data_blocks[block_index] as usize;
        // SAFETY: `block_num` came from an on-disk inode populated at
        // image-build time and validated to be within `data_block_count`.
        let block = unsafe { &*blocks.add(block_num) };
        let chunk = core::cmp::min(FS_BLOCK_SIZE - block_offset, len - written);
        buf[written..written + chunk]
            .copy_from_slice(&block.data[block_offset..block_offset + chunk]);
        written += chunk;
        block_index += 1;
        block_offset = 0;
    }

    Ok(written)
}

/// Creates an empty regular file named `name`: allocates a free dentry
/// slot and a free inode, initializing the inode to zero length.
pub fn create(name: &[u8]) -> KernelResult<()> {
    if read_dentry_by_name(name).is_some() {
        return Err(KernelError::InvalidArgument);
    }

    let mut inode_bitmap = INODE_BITMAP.lock();
    let inode_num = inode_bitmap
        .first_clear(FS_INODE_BLOCK_COUNT.min(64))
        .ok_or(KernelError::NoFreeInode)?;
    inode_bitmap.set(inode_num);
    drop(inode_bitmap);

    let base = IMAGE_BASE.load(Ordering::Relaxed);
    // SAFETY: the image is writable kernel memory set up at boot; only
    // `create`/`delete` ever mutate it, serialized by the fs module's
    // locks.
    unsafe {
        let boot = &mut *(base as *mut BootBlock);
        let slot = boot.dentry_count as usize;
        if slot >= FS_DENTRY_COUNT {
            inode_num_rollback(inode_num);
            return Err(KernelError::NoFreeInode);
        }
        let dentry = &mut boot.dentries[slot];
        dentry.file_name = [0; crate::config::FS_NAME_LEN];
        let copy_len = core::cmp::min(name.len(), crate::config::FS_NAME_LEN);
        dentry.file_name[..copy_len].copy_from_slice(&name[..copy_len]);
        dentry.file_type = FileType::Regular as u32;
        dentry.inode_num = inode_num as u32;
        boot.dentry_count += 1;

        let inode = &mut *inode_table().add(inode_num).cast_mut();
        inode.file_size = 0;
    }

    flush_to_disk();
    Ok(())
}

fn inode_num_rollback(inode_num: usize) {
    INODE_BITMAP.lock().clear(inode_num);
}

/// Removes the dentry named `name` and frees its inode and data blocks.
/// Refuses with [`KernelError::FileBusy`] if any present process still
/// holds an open file descriptor on the target inode, the same
/// present-process scan [`crate::devices::rtc`] uses for tick
/// virtualization. Frees [`DATA_BLOCK_BITMAP`] bits indexed by the inode's
/// actual block numbers, not by loop sequence, so a sparse or
/// partially-filled inode frees exactly the blocks it owns.
pub fn delete(name: &[u8]) -> KernelResult<()> {
    let dentry = read_dentry_by_name(name).ok_or(KernelError::FileNotFound)?;
    let inode_num = dentry.inode_num as usize;

    let mut busy = false;
    crate::process::pcb::for_each_present(|_, pcb| {
        if pcb
            .files
            .iter()
            .any(|fd| fd.is_present() && fd.inode as usize == inode_num)
        {
            busy = true;
        }
    });
    if busy {
        return Err(KernelError::FileBusy);
    }

    let base = IMAGE_BASE.load(Ordering::Relaxed);
    let boot = boot_block();
    let slot = boot.dentries[..boot.dentry_count as usize]
        .iter()
        .position(|d| names_match(name, d))
        .ok_or(KernelError::FileNotFound)?;

    // SAFETY: `inode_num` was read from a live dentry, so it indexes the
    // inode table; mutation is serialized by the bitmap locks below.
    let inode = unsafe { &*inode_table().add(inode_num) };
    let used_blocks = inode.file_size.div_ceil(FS_BLOCK_SIZE as u32) as usize;

    let mut data_bitmap = DATA_BLOCK_BITMAP.lock();
    for &block in &inode.data_blocks[..used_blocks] {
        data_bitmap.clear(block as usize);
    }
    drop(data_bitmap);

    INODE_BITMAP.lock().clear(inode_num);

    // SAFETY: shrinking the dentry table by swap-removing `slot`; the
    // image is writable kernel memory owned by this module.
    unsafe {
        let boot_mut = &mut *(base as *mut BootBlock);
        let last = boot_mut.dentry_count as usize - 1;
        boot_mut.dentries[slot] = boot_mut.dentries[last];
        boot_mut.dentries[last] = Dentry::empty();
        boot_mut.dentry_count -= 1;
    }

    flush_to_disk();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::layout::names_match;
    use super::*;

    fn dentry_named(name: &[u8]) -> Dentry {
        let mut dentry = Dentry::empty();
        dentry.file_name[..name.len()].copy_from_slice(name);
        dentry
    }

    #[test_case]
    fn exact_short_name_matches() {
        let dentry = dentry_named(b"shell");
        assert!(names_match(b"shell", &dentry));
        assert!(!names_match(b"shel", &dentry));
        assert!(!names_match(b"shellx", &dentry));
    }

    #[test_case]
    fn full_length_name_needs_no_nul() {
        let name = [b'a'; crate::config::FS_NAME_LEN];
        let dentry = dentry_named(&name);
        assert!(names_match(&name, &dentry));
    }
}
