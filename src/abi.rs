//! The plug-in ABI: lifecycle state codes, trap error codes, and the
//! signature of the single entry point the engine calls into.
//!
//! These numeric values are load-bearing — a plug-in compiled against one
//! version of this ABI must see the exact same integers from any other
//! version, so none of the discriminants below may be renumbered.

use std::os::raw::c_void;

/// Lifecycle state reported on every plug-in invocation and returned from
/// [`crate::Script::update`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No library loaded, nothing pending. The initial state, and the
    /// steady-state value `Update` keeps returning between changes.
    None = 0,
    /// Plug-in was just loaded for the first time.
    Init = 1,
    /// Host is tearing the Script down.
    Quit = 2,
    /// Old version was just released ahead of a reload.
    Unload = 3,
    /// New version was just loaded after an `Unload`.
    Reload = 4,
    /// A trap was caught while calling into the plug-in; sticky until the
    /// library file changes again.
    Failed = 5,
}

impl State {
    pub(crate) fn from_raw(value: i32) -> Self {
        match value {
            0 => State::None,
            1 => State::Init,
            2 => State::Quit,
            3 => State::Unload,
            4 => State::Reload,
            _ => State::Failed,
        }
    }
}

/// The kind of hardware trap the fault barrier last caught, or `None` if
/// the last guarded call returned normally.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None = 0,
    Abort = 1,
    IllegalInstruction = 2,
    Syscall = 3,
    Misalign = 4,
    Segfault = 5,
    OutOfBounds = 6,
    StackOverflow = 7,
}

/// Signature of the plug-in's single exported entry point:
///
/// ```c
/// void* csfx_main(void* userdata, int old_state, int new_state);
/// ```
///
/// The engine never interprets the returned pointer; it is carried forward
/// verbatim as `userdata` on the next invocation.
pub type PluginEntryFn =
    unsafe extern "C" fn(userdata: *mut c_void, old_state: i32, new_state: i32) -> *mut c_void;

/// The name the engine looks up in the loaded library.
pub const ENTRY_POINT_NAME: &[u8] = b"csfx_main";
