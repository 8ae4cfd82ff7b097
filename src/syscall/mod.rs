//! System-call dispatch.
//!
//! Entered through `int 0x80`: the call number in `EAX`, up to three
//! arguments in `EBX`/`ECX`/`EDX`. [`crate::idt`]'s `syscall_wrapper` reads
//! those registers itself, immediately after `pushad`, and passes them into
//! [`dispatch`] as ordinary `cdecl` arguments, so nothing about their
//! survival depends on what an intervening Rust call does with caller-saved
//! registers.

mod handlers;

use crate::error::to_syscall_result;

/// Lowest valid syscall number.
const MIN_CALL: u32 = 1;
/// Highest valid syscall number.
const MAX_CALL: u32 = 12;

/// Dispatches the syscall identified by `number` with up to three
/// arguments, and returns the `EAX` value `syscall_wrapper` will splice
/// into the pushed register frame.
pub fn dispatch(number: u32, arg1: u32, arg2: u32, arg3: u32) -> u32 {
    if !(MIN_CALL..=MAX_CALL).contains(&number) {
        return (-1i32) as u32;
    }

    let result = match number {
        1 => handlers::halt(arg1),
        2 => handlers::execute(arg1),
        3 => handlers::read(arg1, arg2, arg3),
        4 => handlers::write(arg1, arg2, arg3),
        5 => handlers::open(arg1),
        6 => handlers::close(arg1),
        7 => handlers::getargs(arg1, arg2),
        8 => handlers::vidmap(arg1),
        9 => handlers::set_handler(),
        10 => handlers::sigreturn(),
        11 => handlers::create(arg1),
        12 => handlers::delete(arg1),
        _ => unreachable!("checked by the range guard above"),
    };

    to_syscall_result(result) as u32
}
