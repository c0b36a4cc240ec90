// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! Uses OS-level file system notifications:
//! - Linux: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileWatcher, WatcherError};

/// Native watcher over the parent directories of the followed files.
pub struct NativeWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<Result<Event, notify::Error>>,
    /// Directories already registered with the OS
    directories: HashSet<PathBuf>,
    /// Canonical paths of the files we care about
    targets: HashSet<PathBuf>,
}

impl NativeWatcher {
    pub fn new() -> Result<Self, WatcherError> {
        let (tx, rx) = channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            watcher,
            receiver: rx,
            directories: HashSet::new(),
            targets: HashSet::new(),
        })
    }

    fn is_relevant(&self, event: &Event) -> bool {
        match event.kind {
            EventKind::Access(_) => false,
            EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Other
            | EventKind::Any => event.paths.iter().any(|p| self.targets.contains(p)),
        }
    }

    fn handle(&self, res: Result<Event, notify::Error>) -> bool {
        match res {
            Ok(event) => self.is_relevant(&event),
            Err(e) => {
                tracing::warn!("File watcher error: {}", e);
                false
            }
        }
    }
}

/// Split a file path into its canonical parent directory and the full path
/// notify will report for it.
fn resolve_target(file: &Path) -> Result<(PathBuf, PathBuf), WatcherError> {
    let name = file
        .file_name()
        .ok_or_else(|| WatcherError::Watch(format!("{} has no file name", file.display())))?;
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent.canonicalize()?;
    let target = dir.join(name);
    Ok((dir, target))
}

impl FileWatcher for NativeWatcher {
    fn watch_file(&mut self, file: &Path) -> Result<(), WatcherError> {
        let (dir, target) = resolve_target(file)?;

        if !self.directories.contains(&dir) {
            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatcherError::Watch(e.to_string()))?;
            self.directories.insert(dir);
        }
        self.targets.insert(target);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, WatcherError> {
        let mut changed = match self.receiver.recv_timeout(timeout) {
            Ok(res) => self.handle(res),
            Err(RecvTimeoutError::Timeout) => return Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatcherError::Channel("watcher channel disconnected".into()));
            }
        };

        // Coalesce whatever else is already queued
        loop {
            match self.receiver.try_recv() {
                Ok(res) => changed |= self.handle(res),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(WatcherError::Channel("watcher channel disconnected".into()));
                }
            }
        }

        Ok(changed)
    }

    fn is_native(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
