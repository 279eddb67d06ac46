//! Unix realization of the fault barrier: `sigaction` handlers for the
//! signals a plug-in trap can raise, chaining to whatever was previously
//! installed when the trap didn't happen inside an armed barrier region.
//!
//! Structure (per-signal previous-handler storage, `SA_SIGINFO |
//! SA_NODEFER`, explicit chaining) follows the signal handler in
//! wasmtime's runtime (`crates/wasmtime/src/runtime/vm/sys/unix/signals.rs`
//! in the reference pack), trimmed to this crate's much smaller trap
//! vocabulary — no JIT trap tables, no epoch/fiber handling, none of which
//! this domain needs.

use super::ErrorCode;
use std::mem::MaybeUninit;
use std::sync::Once;

const TRACKED_SIGNALS: &[i32] = &[
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGSYS,
    libc::SIGABRT,
];

// One slot per tracked signal, in the same order as `TRACKED_SIGNALS`.
static mut PREV_ACTIONS: [MaybeUninit<libc::sigaction>; 5] =
    [MaybeUninit::uninit(), MaybeUninit::uninit(), MaybeUninit::uninit(), MaybeUninit::uninit(), MaybeUninit::uninit()];

static INSTALL_ONCE: Once = Once::new();

pub fn install() -> bool {
    let mut ok = true;
    INSTALL_ONCE.call_once(|| {
        for (i, &signum) in TRACKED_SIGNALS.iter().enumerate() {
            let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
            action.sa_sigaction = trap_handler as usize;
            action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
            unsafe {
                libc::sigemptyset(&mut action.sa_mask);
                let mut prev: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(signum, &action, &mut prev) != 0 {
                    ok = false;
                    continue;
                }
                PREV_ACTIONS[i] = MaybeUninit::new(prev);
            }
        }
    });
    ok
}

pub fn uninstall() {
    for (i, &signum) in TRACKED_SIGNALS.iter().enumerate() {
        unsafe {
            let prev = PREV_ACTIONS[i].assume_init();
            libc::sigaction(signum, &prev, std::ptr::null_mut());
        }
    }
}

fn classify(signum: i32) -> ErrorCode {
    match signum {
        libc::SIGSEGV => ErrorCode::Segfault,
        libc::SIGBUS => ErrorCode::Misalign,
        libc::SIGILL => ErrorCode::IllegalInstruction,
        libc::SIGSYS => ErrorCode::Syscall,
        libc::SIGABRT => ErrorCode::Abort,
        _ => ErrorCode::None,
    }
}

extern "C" fn trap_handler(
    signum: i32,
    info: *mut libc::siginfo_t,
    context: *mut std::os::raw::c_void,
) {
    let code = classify(signum);
    if code != ErrorCode::None {
        // Returns only if no barrier region was armed on this thread;
        // otherwise it jumps back into `guard` and never comes back here.
        super::on_trap(code);
    }

    // No armed barrier on this thread: chain to whatever was installed
    // before us, same as wasmtime's delegate_signal_to_previous_handler.
    if let Some(index) = TRACKED_SIGNALS.iter().position(|&s| s == signum) {
        unsafe {
            let prev = PREV_ACTIONS[index].assume_init();
            if prev.sa_sigaction == libc::SIG_DFL || prev.sa_sigaction == libc::SIG_IGN {
                libc::signal(signum, prev.sa_sigaction);
                libc::raise(signum);
            } else {
                let prev_handler: extern "C" fn(i32, *mut libc::siginfo_t, *mut std::os::raw::c_void) =
                    std::mem::transmute(prev.sa_sigaction);
                prev_handler(signum, info, context);
            }
        }
    }
}
