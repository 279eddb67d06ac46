//! File-change detection by timestamp comparison, shared by the Script
//! engine's artifact watch and the auxiliary rebuild watcher.

use crate::platform;
use std::path::{Path, PathBuf};

/// A path plus the last mtime observed for it. `time == 0` means "never
/// checked"; any real mtime compares greater than that, so the first
/// [`check`] on a fresh `FileTime` always reports change.
#[derive(Debug, Clone)]
pub struct FileTime {
    pub time: u64,
    pub path: PathBuf,
}

impl FileTime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTime { time: 0, path: path.into() }
    }
}

/// If `path`'s current mtime is strictly greater than `entry.time`,
/// advance `entry.time` to it and return `true`. A path that currently has
/// no readable mtime (missing or inaccessible) never reports change.
pub fn check(entry: &mut FileTime) -> bool {
    check_path(&entry.path, &mut entry.time)
}

fn check_path(path: &Path, stored: &mut u64) -> bool {
    let current = platform::mtime(path);
    if current > *stored {
        *stored = current;
        true
    } else {
        false
    }
}

/// Returns `true` iff any entry reported change. Every entry is checked on
/// every call — callers rely on this to coalesce a multi-file edit into a
/// single reload tick rather than just the first file touched.
pub fn watch_files(entries: &mut [FileTime]) -> bool {
    let mut changed = false;
    for entry in entries.iter_mut() {
        if check(entry) {
            changed = true;
        }
    }
    changed
}

/// The decrease-tolerant comparison used for the optional companion
/// symbol-file timestamp: a symbol file that has not yet reappeared after
/// a rebuild (`current == stored == 0`) is change-worthy so it doesn't
/// block forward progress once the primary library has already advanced;
/// otherwise a strict increase is required. Mirrors
/// `csfx__script_changed`'s `(cur == src && cur == 0) || cur > src` check.
pub fn changed_tolerant(current: u64, stored: u64) -> bool {
    (current == stored && current == 0) || current > stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_reports_change_on_missing_file() {
        // mtime(nonexistent) == 0, and entry.time starts at 0, so this is
        // the one case where a fresh FileTime does NOT report change: the
        // file simply isn't there yet.
        let mut entry = FileTime::new("/nonexistent/path/for/hotswap/tests");
        assert!(!check(&mut entry));
    }

    #[test]
    fn watch_files_checks_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"1").unwrap();
        std::fs::write(&b, b"1").unwrap();

        let mut entries = vec![FileTime::new(&a), FileTime::new(&b)];
        assert!(watch_files(&mut entries));
        assert!(entries[0].time > 0);
        assert!(entries[1].time > 0);

        assert!(!watch_files(&mut entries));

        filetime_touch(&a);
        assert!(watch_files(&mut entries));
    }

    fn filetime_touch(path: &Path) {
        let now = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
        ::filetime::set_file_mtime(path, ::filetime::FileTime::from_system_time(now)).unwrap();
    }

    #[test]
    fn changed_tolerant_matches_reference_expression() {
        assert!(changed_tolerant(0, 0));
        assert!(!changed_tolerant(5, 5));
        assert!(changed_tolerant(6, 5));
        assert!(!changed_tolerant(4, 5));
    }
}
