// SPDX-License-Identifier: Apache-2.0

//! Change notification for followed files.
//!
//! Two strategies exist:
//! - **Native watching**: OS-level notifications (inotify on Linux,
//!   FSEvents on macOS) on the directory holding each file.
//! - **Poll watching**: periodic stats of each file, for NFS and similar
//!   file systems where notifications are unreliable.
//!
//! `auto` mode tries native watching first and falls back to polling.

mod native;
mod poll;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{FileWatcher, WatcherError};

use std::time::Duration;

/// Watch mode configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Try native watching, fall back to polling on failure.
    #[default]
    Auto,
    /// Force native file system watching. Fails if it is not supported.
    Native,
    /// Force polling mode.
    Poll,
}

impl std::str::FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(WatchMode::Auto),
            "native" => Ok(WatchMode::Native),
            "poll" | "polling" => Ok(WatchMode::Poll),
            _ => Err(format!(
                "Invalid watch mode '{}'. Valid options: auto, native, poll",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub mode: WatchMode,
    /// Upper bound between re-checks of a file, whatever the backend
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Create a watcher based on the configuration.
pub fn create_watcher(config: &WatcherConfig) -> Result<Box<dyn FileWatcher>, WatcherError> {
    match config.mode {
        WatchMode::Native => Ok(Box::new(NativeWatcher::new()?)),
        WatchMode::Poll => Ok(Box::new(PollWatcher::new(config.poll_interval))),
        WatchMode::Auto => match NativeWatcher::new() {
            Ok(watcher) => Ok(Box::new(watcher)),
            Err(e) => {
                tracing::warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                Ok(Box::new(PollWatcher::new(config.poll_interval)))
            }
        },
    }
}
