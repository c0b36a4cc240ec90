// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

use crate::receivers::file::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum FileReceiverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: WatcherError,
    },
}

pub type Result<T> = std::result::Result<T, FileReceiverError>;
