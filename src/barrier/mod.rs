//! The fault barrier: process-wide trap handlers plus a scoped region that
//! converts a hardware trap raised while calling into plug-in code into an
//! [`ErrorCode`] instead of terminating the host.
//!
//! The unwind target is thread-local: only the thread that entered
//! [`guard`] can be resumed by a trap on that thread. A trap on any other
//! thread is not this component's problem and is left to propagate.
//!
//! This is the one place in the crate that leans on a genuinely unsound-
//! in-the-general-case technique (raw `setjmp`/`longjmp` across an FFI
//! boundary the compiler doesn't model). That hazard is inherited from the
//! C original this engine is a port of and is not something this
//! implementation attempts to paper over — see the module's own doc above
//! and the crate-level caveat in `SPEC_FULL.md` section 4.2.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use crate::abi::ErrorCode;
use std::cell::Cell;

// Opaque jump-buffer storage big enough for any supported platform's
// `jmp_buf`. Sized generously; both glibc and the Windows CRT keep theirs
// well under this on every architecture this crate targets.
#[repr(align(16))]
pub(crate) struct JmpBuf([u8; 256]);

impl JmpBuf {
    const fn new() -> Self {
        JmpBuf([0u8; 256])
    }
}

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static JMP_BUF: std::cell::UnsafeCell<JmpBuf> = std::cell::UnsafeCell::new(JmpBuf::new());
    static CAUGHT: Cell<ErrorCode> = const { Cell::new(ErrorCode::None) };
}

extern "C" {
    #[cfg_attr(target_os = "macos", link_name = "setjmp")]
    fn setjmp(env: *mut u8) -> i32;
    #[cfg_attr(target_os = "macos", link_name = "longjmp")]
    fn longjmp(env: *mut u8, val: i32) -> !;
}

/// Install process-wide trap handlers. Idempotent-unsafe: calling this
/// twice without an intervening [`uninstall`] re-registers handlers on top
/// of whatever is already chained, which is harmless but pointless.
pub fn install() -> bool {
    #[cfg(unix)]
    {
        unix::install()
    }
    #[cfg(windows)]
    {
        windows::install()
    }
}

/// Restore whatever trap handling was in place before [`install`].
pub fn uninstall() {
    #[cfg(unix)]
    {
        unix::uninstall();
    }
    #[cfg(windows)]
    {
        windows::uninstall();
    }
}

/// Call `f` inside the fault barrier. Returns `f`'s result on normal
/// completion, or the classified [`ErrorCode`] if a trap was caught while
/// `f` was running.
///
/// `f` must not unwind (no Rust panics) — a barrier region is only
/// prepared to recover from a trap delivered by the signal/SEH handler via
/// `longjmp`, not from a Rust panic crossing the same frame.
pub fn guard<R>(f: impl FnOnce() -> R) -> Result<R, ErrorCode> {
    CAUGHT.with(|c| c.set(ErrorCode::None));

    let jumped = JMP_BUF.with(|buf| {
        // Safety: `setjmp` is called directly in this frame, which is the
        // frame `longjmp` will resume into; the pointer stays valid for as
        // long as this function's stack frame is live, which covers the
        // entire dynamic extent of the guarded call below.
        unsafe { setjmp(buf.get().cast()) }
    });

    if jumped != 0 {
        ARMED.with(|a| a.set(false));
        return Err(CAUGHT.with(|c| c.get()));
    }

    ARMED.with(|a| a.set(true));
    let result = f();
    ARMED.with(|a| a.set(false));
    Ok(result)
}

/// Called from a signal handler / exception filter on the thread that
/// trapped. Returns `true` if a barrier region was armed on this thread
/// and the jump was taken (in which case control does not return to the
/// caller of this function); `false` if the trap should be chained to the
/// previous handler instead.
fn on_trap(code: ErrorCode) -> bool {
    if !ARMED.with(|a| a.get()) {
        return false;
    }
    CAUGHT.with(|c| c.set(code));
    JMP_BUF.with(|buf| {
        // Safety: a barrier region armed this buffer via `setjmp` earlier
        // on this same thread and has not returned yet, so jumping back
        // into it is resuming a still-live frame.
        unsafe { longjmp(buf.get().cast(), 1) }
    })
}
