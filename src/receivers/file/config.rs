// SPDX-License-Identifier: Apache-2.0

//! Configuration for the perfdata file receiver.

use std::path::PathBuf;

use crate::receivers::file::tailer::{DEFAULT_MAX_LINE_BYTES, StartAt};
use crate::receivers::file::watcher::WatcherConfig;

#[derive(Debug, Clone)]
pub struct FileReceiverConfig {
    /// Files to follow, each with its own task
    pub paths: Vec<PathBuf>,
    /// Where to start reading: beginning or end of file
    pub start_at: StartAt,
    pub watcher: WatcherConfig,
    /// Maximum line size in bytes
    pub max_line_bytes: usize,
}

impl Default for FileReceiverConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            start_at: StartAt::End,
            watcher: WatcherConfig::default(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl FileReceiverConfig {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.paths.is_empty() {
            return Err("at least one perfdata file must be given".to_string());
        }

        if self.watcher.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if self.max_line_bytes == 0 {
            return Err("max_line_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = FileReceiverConfig::default();
        assert!(config.paths.is_empty());
        assert_eq!(config.start_at, StartAt::End);
        assert_eq!(config.max_line_bytes, 65536);
    }

    #[test]
    fn test_validate_requires_paths() {
        assert!(FileReceiverConfig::default().validate().is_err());
        assert!(
            FileReceiverConfig::new(vec![PathBuf::from("/var/log/nagios/perfdata")])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = FileReceiverConfig::new(vec![PathBuf::from("perfdata")]);
        config.watcher.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
