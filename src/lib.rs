//! hotswap is a hot-reload runtime for native plug-in modules.
//!
//! A host process loads a shared library, calls its single exported
//! `csfx_main` entry point, and keeps the library watched for rebuilds. On
//! change the old version is unloaded and the new one loaded in its place,
//! with an opaque `userdata` handle threaded through both calls so the
//! plug-in can migrate its own state.
//!
//! ```ignore
//! hotswap::init_process();
//!
//! let mut script = hotswap::Script::new("target/debug/libplugin.so").unwrap();
//! loop {
//!     match script.update() {
//!         hotswap::State::Failed => {
//!             // plug-in trapped; wait for the next rebuild
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! hotswap will not try to solve any stale data hanging around in the host
//! from a previous plug-in version beyond the single `userdata` pointer —
//! it is up to the plug-in to migrate whatever it needs through that
//! handle before returning it.
//!
//! A guarded call into plug-in code that raises a hardware trap (segfault,
//! illegal instruction, ...) is caught by the fault barrier and reported
//! as [`State::Failed`] rather than bringing the host down; see
//! [`barrier`] for the caveats that come with that guarantee.

mod abi;
mod barrier;
mod error;
mod filetime;
mod platform;
mod script;
#[cfg(all(windows, feature = "unlock-symbol-file"))]
mod unlocker;
mod watcher;

pub use abi::{ErrorCode, PluginEntryFn, State};
pub use error::{Error, Result};
pub use filetime::{check, watch_files, FileTime};
pub use script::Script;
pub use watcher::RebuildWatcher;

use std::sync::atomic::{AtomicBool, Ordering};

static PROCESS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide fault handlers. Must be called once before any
/// [`Script::update`] call; calling it a second time without an
/// intervening [`quit_process`] is a logic error and returns `false`.
pub fn init_process() -> bool {
    if PROCESS_INSTALLED.swap(true, Ordering::SeqCst) {
        tracing::warn!("init_process called while already installed");
        return false;
    }
    let ok = barrier::install();
    if ok {
        tracing::info!("fault barrier installed");
    } else {
        tracing::error!("fault barrier installation failed");
        PROCESS_INSTALLED.store(false, Ordering::SeqCst);
    }
    ok
}

/// Uninstall the process-wide fault handlers installed by
/// [`init_process`]. A no-op if they were never installed.
pub fn quit_process() {
    if PROCESS_INSTALLED.swap(false, Ordering::SeqCst) {
        barrier::uninstall();
        tracing::info!("fault barrier uninstalled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_process_rejects_double_install() {
        // This test and any other calling init_process/quit_process share
        // process-global state; run with --test-threads=1 if flakiness
        // shows up from other tests in the same binary calling these.
        assert!(init_process());
        assert!(!init_process());
        quit_process();
        assert!(init_process());
        quit_process();
    }
}
