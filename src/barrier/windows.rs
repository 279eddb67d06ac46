//! Windows realization of the fault barrier via `SetUnhandledExceptionFilter`.
//!
//! This ports the non-MSVC branch of the original implementation (plain
//! vectored/unhandled exception filter plus `setjmp`/`longjmp`), not the
//! MSVC `__try`/`__except` branch — Rust's compiler has no front-end
//! support for structured exception handling, so that branch has no
//! equivalent here. Recorded as a scope reduction in `DESIGN.md`, not a
//! silent omission.

use super::ErrorCode;
use std::os::raw::c_long;
use std::sync::Once;
use winapi::shared::minwindef::DWORD;
use winapi::um::errhandlingapi::SetUnhandledExceptionFilter;
use winapi::um::winnt::{
    EXCEPTION_ACCESS_VIOLATION, EXCEPTION_ARRAY_BOUNDS_EXCEEDED, EXCEPTION_DATATYPE_MISALIGNMENT,
    EXCEPTION_ILLEGAL_INSTRUCTION, EXCEPTION_POINTERS, EXCEPTION_STACK_OVERFLOW,
};

type Long = c_long;

const EXCEPTION_CONTINUE_SEARCH: Long = 0;

static INSTALL_ONCE: Once = Once::new();
static mut PREV_FILTER: winapi::um::errhandlingapi::LPTOP_LEVEL_EXCEPTION_FILTER = None;

pub fn install() -> bool {
    INSTALL_ONCE.call_once(|| unsafe {
        PREV_FILTER = SetUnhandledExceptionFilter(Some(exception_filter));
    });
    true
}

pub fn uninstall() {
    unsafe {
        SetUnhandledExceptionFilter(PREV_FILTER);
    }
}

fn classify(code: DWORD) -> ErrorCode {
    match code {
        EXCEPTION_ACCESS_VIOLATION => ErrorCode::Segfault,
        EXCEPTION_ILLEGAL_INSTRUCTION => ErrorCode::IllegalInstruction,
        EXCEPTION_DATATYPE_MISALIGNMENT => ErrorCode::Misalign,
        EXCEPTION_ARRAY_BOUNDS_EXCEEDED => ErrorCode::OutOfBounds,
        EXCEPTION_STACK_OVERFLOW => ErrorCode::StackOverflow,
        _ => ErrorCode::None,
    }
}

unsafe extern "system" fn exception_filter(info: *mut EXCEPTION_POINTERS) -> Long {
    let record = (*info).ExceptionRecord;
    let code = classify((*record).ExceptionCode);

    if code != ErrorCode::None {
        // Returns only if no barrier region was armed on this thread;
        // otherwise it jumps back into `guard` and never comes back here.
        super::on_trap(code);
    }

    match PREV_FILTER {
        Some(prev) => prev(info),
        None => EXCEPTION_CONTINUE_SEARCH,
    }
}
