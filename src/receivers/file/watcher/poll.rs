// SPDX-License-Identifier: Apache-2.0

//! Polling-based watcher as a fallback for systems where native
//! file system notifications are unavailable or unreliable (e.g., NFS).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::traits::{FileWatcher, WatcherError};
use crate::receivers::file::file_id::FileId;

/// What a stat of the path looked like last time
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    id: FileId,
    modified: Option<SystemTime>,
    size: u64,
}

impl FileState {
    /// `None` when the path does not currently exist.
    fn snapshot(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            id: FileId::from_metadata(&metadata),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }
}

/// Periodically stats each followed path.
///
/// A change of identity, size or mtime, or the path appearing or
/// disappearing, counts as a change.
pub struct PollWatcher {
    files: HashMap<PathBuf, Option<FileState>>,
    poll_interval: Duration,
}

impl PollWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            files: HashMap::new(),
            poll_interval,
        }
    }

    /// Rescan every path, recording new states. Returns whether anything moved.
    fn scan(&mut self) -> bool {
        let mut changed = false;
        for (path, state) in self.files.iter_mut() {
            let current = FileState::snapshot(path);
            if current != *state {
                *state = current;
                changed = true;
            }
        }
        changed
    }
}

impl FileWatcher for PollWatcher {
    fn watch_file(&mut self, file: &Path) -> Result<(), WatcherError> {
        let state = FileState::snapshot(file);
        self.files.insert(file.to_path_buf(), state);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, WatcherError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.scan() {
                return Ok(true);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval.min(remaining));
        }
    }

    fn is_native(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
