// SPDX-License-Identifier: Apache-2.0

//! File receiver for following perfdata files.
//!
//! Each file is followed from its end (by default) as lines are appended.
//! Rotation is detected through the device and inode of the path, and
//! truncation through the file shrinking below the read offset.

pub mod config;
pub mod error;
pub mod file_id;
pub mod receiver;
pub mod tailer;
pub mod watcher;

pub use config::FileReceiverConfig;
pub use error::{FileReceiverError, Result};
pub use file_id::FileId;
pub use receiver::PerfdataFileReceiver;
pub use tailer::{FileTailer, RawLines, RotationCheck, StartAt};
pub use watcher::{FileWatcher, WatchMode, WatcherConfig};
