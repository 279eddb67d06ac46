//! Fixture plug-in that is a valid shared library but exports no
//! `csfx_main`, used to exercise the missing-entry-point path.

#[no_mangle]
pub extern "C" fn testplugin_noentry_marker() -> i32 {
    1
}
