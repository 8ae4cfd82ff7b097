//! One function per syscall number, each taking raw register values and
//! returning a [`KernelResult`] the dispatcher collapses to the ABI's
//! `-1`-on-error convention.

use crate::config::{ARGV_CAPACITY, FD_TABLE_SIZE, USER_IMAGE_BASE, USER_IMAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::fs::ops::FileOps;
use crate::{fs, paging, process};

/// True if `[ptr, ptr + len)` lies entirely inside the caller's 4 MiB user
/// image window — the bounds check every pointer-taking syscall performs
/// before touching user memory.
fn in_user_image(ptr: u32, len: u32) -> bool {
    let Some(end) = ptr.checked_add(len) else {
        return false;
    };
    ptr >= USER_IMAGE_BASE && end <= USER_IMAGE_BASE + USER_IMAGE_SIZE
}

/// Builds a mutable slice over `[ptr, ptr + len)`, validated to lie inside
/// the caller's user image.
///
/// # Safety
/// Relies on the caller's user-image PDE being the one currently mapped,
/// true for every syscall handler (they always run on behalf of the
/// process that trapped in).
unsafe fn user_slice_mut<'a>(ptr: u32, len: u32) -> KernelResult<&'a mut [u8]> {
    if !in_user_image(ptr, len) {
        return Err(KernelError::InvalidArgument);
    }
    Ok(core::slice::from_raw_parts_mut(ptr as *mut u8, len as usize))
}

unsafe fn user_slice<'a>(ptr: u32, len: u32) -> KernelResult<&'a [u8]> {
    if !in_user_image(ptr, len) {
        return Err(KernelError::InvalidArgument);
    }
    Ok(core::slice::from_raw_parts(ptr as *const u8, len as usize))
}

pub fn halt(status: u32) -> KernelResult<i32> {
    process::halt(status)
}

pub fn execute(command_ptr: u32) -> KernelResult<i32> {
    // SAFETY: bounded read below clamps to `ARGV_CAPACITY`, well inside any
    // plausible command string; `in_user_image` rejects anything that
    // would run past the user image.
    let command = unsafe { user_slice(command_ptr, ARGV_CAPACITY as u32)? };
    Ok(process::execute(command))
}

fn fd_table_index(fd: u32) -> KernelResult<usize> {
    let index = fd as usize;
    if index >= FD_TABLE_SIZE {
        return Err(KernelError::InvalidArgument);
    }
    Ok(index)
}

pub fn read(fd: u32, buf_ptr: u32, count: u32) -> KernelResult<i32> {
    let index = fd_table_index(fd)?;
    // SAFETY: validated against the caller's user image above.
    let buf = unsafe { user_slice_mut(buf_ptr, count)? };

    let (ops, inode, file_pos) = {
        let process = process::pcb::current();
        let descriptor = &process.files[index];
        let ops = descriptor.ops.ok_or(KernelError::InvalidArgument)?;
        (ops, descriptor.inode, descriptor.file_pos)
    };

    let read = ops.read(inode, file_pos, buf)?;
    process::pcb::current().files[index].file_pos += read as u32;
    Ok(read as i32)
}

pub fn write(fd: u32, buf_ptr: u32, count: u32) -> KernelResult<i32> {
    let index = fd_table_index(fd)?;
    // SAFETY: validated against the caller's user image above.
    let buf = unsafe { user_slice(buf_ptr, count)? };

    let ops = process::pcb::current().files[index]
        .ops
        .ok_or(KernelError::InvalidArgument)?;
    let written = ops.write(buf)?;
    Ok(written as i32)
}

pub fn open(name_ptr: u32) -> KernelResult<i32> {
    // SAFETY: validated against the caller's user image above.
    let name = unsafe { user_slice(name_ptr, crate::config::FS_NAME_LEN as u32)? };
    let name = match name.iter().position(|&b| b == 0) {
        Some(nul) => &name[..nul],
        None => name,
    };

    let dentry = fs::read_dentry_by_name(name).ok_or(KernelError::FileNotFound)?;
    let ops = match dentry.file_type {
        t if t == crate::fs::FileType::Rtc as u32 => FileOps::Rtc,
        t if t == crate::fs::FileType::Directory as u32 => FileOps::Directory,
        _ => FileOps::Regular,
    };

    let mut process = process::pcb::current();
    let slot = process.files[2..]
        .iter()
        .position(|fd| !fd.is_present())
        .map(|i| i + 2)
        .ok_or(KernelError::NoFreeFileDescriptor)?;
    drop(process);

    ops.open(name)?;

    let mut process = process::pcb::current();
    process.files[slot].ops = Some(ops);
    process.files[slot].inode = dentry.inode_num;
    process.files[slot].file_pos = 0;
    Ok(slot as i32)
}

pub fn close(fd: u32) -> KernelResult<i32> {
    let index = fd_table_index(fd)?;
    if index < 2 {
        return Err(KernelError::InvalidArgument);
    }
    let mut process = process::pcb::current();
    let ops = process.files[index]
        .ops
        .take()
        .ok_or(KernelError::InvalidArgument)?;
    drop(process);
    ops.close()?;
    Ok(0)
}

pub fn getargs(buf_ptr: u32, count: u32) -> KernelResult<i32> {
    // SAFETY: validated against the caller's user image above.
    let buf = unsafe { user_slice_mut(buf_ptr, count)? };
    if buf.is_empty() {
        return Err(KernelError::InvalidArgument);
    }

    let process = process::pcb::current();
    let argv = &process.argv;
    let argv_len = argv.iter().position(|&b| b == 0).unwrap_or(ARGV_CAPACITY);

    let copy_len = core::cmp::min(argv_len, buf.len() - 1);
    buf[..copy_len].copy_from_slice(&argv[..copy_len]);
    buf[copy_len] = 0;
    Ok(0)
}

pub fn vidmap(out_ptr: u32) -> KernelResult<i32> {
    // SAFETY: a `u32` pointer itself is 4 bytes; validated below.
    let out = unsafe { user_slice_mut(out_ptr, 4)? };

    let mut process = process::pcb::current();
    process.vidmap = true;
    drop(process);

    let active = process::scheduler::active_terminal();
    let present = active == process::scheduler::shown_terminal();
    if present {
        paging::map_video_page_live();
    }
    paging::set_user_video_present(true);

    out.copy_from_slice(&paging::USER_VIDMAP_ADDR.to_le_bytes());
    Ok(0)
}

pub fn set_handler() -> KernelResult<i32> {
    Ok(0)
}

pub fn sigreturn() -> KernelResult<i32> {
    Ok(0)
}

pub fn create(name_ptr: u32) -> KernelResult<i32> {
    // SAFETY: validated against the caller's user image above.
    let name = unsafe { user_slice(name_ptr, crate::config::FS_NAME_LEN as u32)? };
    let name = match name.iter().position(|&b| b == 0) {
        Some(nul) => &name[..nul],
        None => name,
    };
    fs::create(name)?;
    Ok(0)
}

pub fn delete(name_ptr: u32) -> KernelResult<i32> {
    // SAFETY: validated against the caller's user image above.
    let name = unsafe { user_slice(name_ptr, crate::config::FS_NAME_LEN as u32)? };
    let name = match name.iter().position(|&b| b == 0) {
        Some(nul) => &name[..nul],
        None => name,
    };
    fs::delete(name)?;
    Ok(0)
}
