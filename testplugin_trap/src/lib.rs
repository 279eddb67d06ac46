//! Fixture plug-in that traps when asked to reload.
//!
//! Used to exercise the fault barrier: loading and initializing this
//! plug-in succeeds, but invoking it with `new_state == Reload` raises a
//! real hardware access violation so the barrier has something genuine to
//! catch.
//!
//! Every entry is unloaded before the next one, which resets any static
//! state inside this library — so a test that needs to observe whether
//! this plug-in was re-entered after a trap can't rely on an in-library
//! counter. Instead, when `HOTSWAP_TESTPLUGIN_TRAP_COUNT_FILE` is set,
//! each call bumps a counter persisted in that external file before it
//! crashes.

use std::os::raw::c_void;
use std::path::PathBuf;

const CSFX_RELOAD: i32 = 4;

fn count_file() -> Option<PathBuf> {
    std::env::var_os("HOTSWAP_TESTPLUGIN_TRAP_COUNT_FILE").map(PathBuf::from)
}

fn bump_count() {
    let Some(path) = count_file() else {
        return;
    };
    let current = std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let _ = std::fs::write(&path, (current + 1).to_string());
}

#[no_mangle]
pub extern "C" fn csfx_main(userdata: *mut c_void, _old_state: i32, new_state: i32) -> *mut c_void {
    if new_state == CSFX_RELOAD {
        bump_count();
        let p: *mut i32 = std::ptr::null_mut();
        unsafe { std::ptr::write_volatile(p, 0xDEAD) };
    }

    if userdata.is_null() {
        Box::into_raw(Box::new(0u32)) as *mut c_void
    } else {
        userdata
    }
}
