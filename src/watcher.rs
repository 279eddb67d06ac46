//! Auxiliary source-tree watcher: wraps `notify` to debounce changes under
//! a set of paths and run a rebuild command, independent of the Script
//! engine's own artifact-mtime polling.
//!
//! The watcher plumbing (channel, debounce duration, `RecommendedWatcher`)
//! is carried over close to verbatim from the teacher's own
//! `get_watcher`/`watch_recv`, since the teacher already solves exactly
//! this problem for its own (different) reload trigger; what differs here
//! is what happens on an event — running an external rebuild command
//! rather than reloading a library directly.

use notify::{DebouncedEvent, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use crate::error::{Error, Result};

/// Watches a set of paths and runs a rebuild command when any of them
/// change, debounced so a burst of saves from an editor becomes one build.
pub struct RebuildWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<DebouncedEvent>,
    command: Vec<String>,
}

impl RebuildWatcher {
    /// `paths` are watched non-recursively; pass directories to cover
    /// everything directly inside them. `command` is split as `argv`, the
    /// first element being the program to run.
    pub fn new(paths: &[PathBuf], command: Vec<String>, debounce: Duration) -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::watcher(tx, debounce)?;
        for path in paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(Error::Watch)?;
        }
        Ok(RebuildWatcher { _watcher: watcher, events: rx, command })
    }

    /// Drain any pending change events. Returns `true` if at least one
    /// event arrived (regardless of whether a rebuild was actually run —
    /// callers that want to run on every drain should call
    /// [`RebuildWatcher::run_if_changed`] instead).
    pub fn poll(&self) -> bool {
        let mut saw_event = false;
        while let Ok(evt) = self.events.try_recv() {
            if matches!(
                evt,
                DebouncedEvent::NoticeWrite(_) | DebouncedEvent::Write(_) | DebouncedEvent::Create(_)
            ) {
                saw_event = true;
            }
        }
        saw_event
    }

    /// Poll for changes and, if any arrived, run the configured rebuild
    /// command to completion, returning its exit status.
    pub fn run_if_changed(&self) -> Result<Option<ExitStatus>> {
        if !self.poll() {
            return Ok(None);
        }
        self.run().map(Some)
    }

    fn run(&self) -> Result<ExitStatus> {
        let [program, args @ ..] = self.command.as_slice() else {
            return Err(Error::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "rebuild command is empty",
            )));
        };
        tracing::info!(program, "running rebuild command");
        Command::new(program)
            .args(args)
            .status()
            .map_err(Error::Spawn)
    }

    /// Watch an additional path. Typically the parent directory of a
    /// library file, since `notify` backends generally need a directory
    /// watch to see writes that replace the file via rename.
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self._watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(Error::Watch)
    }
}
