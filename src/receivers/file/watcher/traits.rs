// SPDX-License-Identifier: Apache-2.0

//! Traits and types for file change notification.

use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Error type for watcher operations
#[derive(Debug)]
pub enum WatcherError {
    /// Failed to initialize the watcher
    Init(String),
    /// Failed to watch a path
    Watch(String),
    /// IO error
    Io(std::io::Error),
    /// The notification channel went away
    Channel(String),
}

impl fmt::Display for WatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherError::Init(msg) => write!(f, "watcher initialization failed: {}", msg),
            WatcherError::Watch(msg) => write!(f, "watch failed: {}", msg),
            WatcherError::Io(e) => write!(f, "IO error: {}", e),
            WatcherError::Channel(msg) => write!(f, "channel error: {}", msg),
        }
    }
}

impl std::error::Error for WatcherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatcherError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WatcherError {
    fn from(e: std::io::Error) -> Self {
        WatcherError::Io(e)
    }
}

/// Change notification for a set of followed files.
///
/// A wakeup is only a hint that something may have changed. Callers always
/// re-check the file itself afterwards.
pub trait FileWatcher: Send {
    /// Start observing `file`. Renames and re-creations of the path must be
    /// noticed too, so implementations watch what contains it.
    fn watch_file(&mut self, file: &Path) -> Result<(), WatcherError>;

    /// Block until a watched file may have changed or `timeout` expires.
    ///
    /// Returns `true` when a change was observed.
    fn wait(&mut self, timeout: Duration) -> Result<bool, WatcherError>;

    /// Whether OS notifications are used rather than polling.
    fn is_native(&self) -> bool;

    /// Name of the backend for logging.
    fn backend_name(&self) -> &'static str;
}
