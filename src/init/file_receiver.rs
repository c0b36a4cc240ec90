// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::file::config::FileReceiverConfig;
use crate::receivers::file::tailer::DEFAULT_MAX_LINE_BYTES;
use crate::receivers::file::watcher::{WatchMode, WatcherConfig};
use crate::receivers::file::StartAt;

/// Where to start reading files
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartAtArg {
    /// Replay the whole file
    Beginning,
    /// Only lines appended after startup
    #[default]
    End,
}

impl From<StartAtArg> for StartAt {
    fn from(s: StartAtArg) -> Self {
        match s {
            StartAtArg::Beginning => StartAt::Beginning,
            StartAtArg::End => StartAt::End,
        }
    }
}

/// Watch mode for file system monitoring
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchModeArg {
    /// Native notifications, falling back to polling
    #[default]
    Auto,
    /// Force native file system watching (inotify/kqueue/FSEvents)
    Native,
    /// Force polling mode (use for NFS or when native watching is unreliable)
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(w: WatchModeArg) -> Self {
        match w {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct FileReceiverArgs {
    /// Perfdata files to follow
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Where to start reading: beginning or end of file
    #[arg(value_enum, long, env = "PERFTAIL_START_AT", default_value = "end")]
    pub start_at: StartAtArg,

    /// Watch mode: auto (default), native (inotify/kqueue/FSEvents), poll (for NFS)
    #[arg(value_enum, long, env = "PERFTAIL_WATCH_MODE", default_value = "auto")]
    pub watch_mode: WatchModeArg,

    /// How often files are checked when polling (e.g., "250ms")
    #[arg(
        long,
        env = "PERFTAIL_POLL_INTERVAL",
        default_value = "250ms",
        value_parser = humantime::parse_duration
    )]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Maximum line size in bytes (lines exceeding this will be truncated)
    #[arg(long, env = "PERFTAIL_MAX_LINE_BYTES", default_value = "65536")]
    pub max_line_bytes: usize,
}

impl Default for FileReceiverArgs {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            start_at: StartAtArg::End,
            watch_mode: WatchModeArg::Auto,
            poll_interval: Duration::from_millis(250),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl FileReceiverArgs {
    pub fn build_config(&self) -> FileReceiverConfig {
        FileReceiverConfig {
            paths: self.files.clone(),
            start_at: self.start_at.into(),
            watcher: WatcherConfig {
                mode: self.watch_mode.into(),
                poll_interval: self.poll_interval,
            },
            max_line_bytes: self.max_line_bytes,
        }
    }
}
