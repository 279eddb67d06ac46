//! OS primitives the engine builds on: dynamic library load/free/symbol
//! (delegated to `libloading`), file mtime, file copy/remove, and shadow
//! path synthesis.
//!
//! Keeping every OS-specific call in one module is what lets `Script` stay
//! free of `cfg` noise outside the spots where the shadow path actually
//! needs to differ.

use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Upper bound on the shadow-path suffix probe in [`synthesize_shadow_path`].
/// Reaching this means a million stale shadow copies are sitting next to
/// `realpath`, which is its own problem the caller should surface rather
/// than loop forever over.
const MAX_SHADOW_PATH_ATTEMPTS: u64 = 1_000_000;

/// Last-modified time of `path` in whole seconds since the Unix epoch, or
/// `0` if the file does not exist or its metadata can't be read.
pub fn mtime(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|md| md.modified())
        .map(|t| {
            t.duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Overwrite `dst` with `src`'s bytes. Best-effort: the compiler may still
/// hold `src` open with a share-lock on some platforms, so a handful of
/// retries are attempted before giving up.
pub fn copy_file(src: &Path, dst: &Path) -> bool {
    for _ in 0..10 {
        if let Ok(md) = std::fs::metadata(src) {
            if md.len() > 0 && std::fs::copy(src, dst).is_ok() {
                return true;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    false
}

/// Best-effort removal. A missing file is not a failure the caller needs
/// to know about.
pub fn remove_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(_) => false,
    }
}

/// Produce a sibling path of `realpath` guaranteed not to exist at the
/// moment of the call, of the form `<realpath>.<pid>.<n>` for the lowest
/// non-negative `n`. Returns `None` if no candidate under
/// `MAX_SHADOW_PATH_ATTEMPTS` is free.
///
/// Folding the process id into the name closes the cross-process race two
/// Scripts in different processes would otherwise have over the same
/// `realpath` (see the shadow-path race open question); the `n` probe still
/// covers two Scripts in the same process pointed at the same file.
pub fn synthesize_shadow_path(realpath: &Path) -> Option<PathBuf> {
    let pid = std::process::id();
    (0..MAX_SHADOW_PATH_ATTEMPTS)
        .map(|n| sibling_with_suffix(realpath, pid, n))
        .find(|candidate| std::fs::metadata(candidate).is_err())
}

fn sibling_with_suffix(realpath: &Path, pid: u32, n: u64) -> PathBuf {
    let mut name = realpath
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{pid}.{n}"));
    realpath.with_file_name(name)
}

/// Map a shared library into the process. `libloading` already gives a
/// sound cross-platform wrapper over `dlopen`/`LoadLibraryW`, so this is a
/// thin pass-through rather than a hand-rolled reimplementation.
pub fn load_library(path: &Path) -> Result<Library, libloading::Error> {
    // Safety: running a plug-in's init routines is inherent to dynamic
    // loading; the caller (`Script`) upholds the same contract libloading
    // itself documents for `Library::new`.
    unsafe { Library::new(path) }
}

/// Release a previously loaded library. After this call no `Symbol`
/// obtained from it may be dereferenced.
pub fn free_library(lib: Library) {
    drop(lib);
}

/// Resolve an exported symbol by name, or `None` if it isn't present.
///
/// # Safety
/// The caller must not call the returned function pointer after `lib` is
/// dropped, and must know the true signature of the symbol it asks for.
pub unsafe fn symbol<'a, T>(lib: &'a Library, name: &[u8]) -> Option<Symbol<'a, T>> {
    lib.get(name).ok()
}

/// Platform-correct shared-library file name for a bare module name, e.g.
/// `"foo"` -> `"libfoo.so"` on Linux, `"foo.dll"` on Windows.
#[cfg(target_os = "windows")]
pub fn dynamiclib_name(name: &str) -> String {
    format!("{name}.dll")
}

#[cfg(target_os = "macos")]
pub fn dynamiclib_name(name: &str) -> String {
    format!("lib{name}.dylib")
}

#[cfg(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub fn dynamiclib_name(name: &str) -> String {
    format!("lib{name}.so")
}
