//! Fixture plug-in used by the integration tests.
//!
//! Implements the `csfx_main` ABI the host engine expects and records
//! every transition it receives so a test can assert on the exact
//! sequence of lifecycle calls the engine made.

use std::os::raw::c_void;
use std::sync::Mutex;
use std::sync::OnceLock;

fn log() -> &'static Mutex<Vec<i32>> {
    static LOG: OnceLock<Mutex<Vec<i32>>> = OnceLock::new();
    LOG.get_or_init(|| Mutex::new(Vec::new()))
}

#[no_mangle]
pub extern "C" fn csfx_main(userdata: *mut c_void, _old_state: i32, new_state: i32) -> *mut c_void {
    log().lock().unwrap().push(new_state);

    if userdata.is_null() {
        Box::into_raw(Box::new(0u32)) as *mut c_void
    } else {
        userdata
    }
}

/// Number of transitions observed so far.
#[no_mangle]
pub extern "C" fn testplugin_log_len() -> i32 {
    log().lock().unwrap().len() as i32
}

/// The `new_state` value observed at `index`, or -1 if out of range.
#[no_mangle]
pub extern "C" fn testplugin_log_at(index: i32) -> i32 {
    let log = log().lock().unwrap();
    if index < 0 {
        return -1;
    }
    *log.get(index as usize).unwrap_or(&-1)
}
