// SPDX-License-Identifier: Apache-2.0

//! Perfdata file receiver
//!
//! Follows each configured file on its own blocking task, parses every new
//! line, and pushes the resulting events into the fan-in channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::bounded_channel::{BoundedSender, SendError};
use crate::event::Event;
use crate::receivers::file::config::FileReceiverConfig;
use crate::receivers::file::error::{FileReceiverError, Result};
use crate::receivers::file::tailer::FileTailer;
use crate::receivers::file::watcher::{FileWatcher, create_watcher};
use crate::receivers::perfdata::PerfdataParser;
use crate::telemetry::MetricsReporter;

struct FollowedFile {
    tailer: FileTailer,
    watcher: Box<dyn FileWatcher>,
}

pub struct PerfdataFileReceiver {
    config: FileReceiverConfig,
    files: Vec<FollowedFile>,
    parser: PerfdataParser,
    output: BoundedSender<Event>,
    metrics: Arc<dyn MetricsReporter>,
}

impl PerfdataFileReceiver {
    /// Open every configured file. Any file that cannot be opened or watched
    /// fails the whole receiver.
    pub fn new(
        config: FileReceiverConfig,
        parser: PerfdataParser,
        output: BoundedSender<Event>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Result<Self> {
        config.validate().map_err(FileReceiverError::Config)?;

        let mut files = Vec::with_capacity(config.paths.len());
        for path in &config.paths {
            let tailer = FileTailer::open_with_limit(path, config.start_at, config.max_line_bytes)
                .map_err(|source| FileReceiverError::Open {
                    path: path.clone(),
                    source,
                })?;

            let mut watcher =
                create_watcher(&config.watcher).map_err(|source| FileReceiverError::Watch {
                    path: path.clone(),
                    source,
                })?;
            watcher
                .watch_file(path)
                .map_err(|source| FileReceiverError::Watch {
                    path: path.clone(),
                    source,
                })?;

            debug!(
                path = %path.display(),
                offset = tailer.offset(),
                file_id = %tailer.file_id(),
                backend = watcher.backend_name(),
                "Opened perfdata file"
            );
            files.push(FollowedFile { tailer, watcher });
        }

        info!(
            files = files.len(),
            start_at = ?config.start_at,
            watch_mode = ?config.watcher.mode,
            poll_interval = ?config.watcher.poll_interval,
            "Perfdata file receiver initialized"
        );

        Ok(Self {
            config,
            files,
            parser,
            output,
            metrics,
        })
    }

    pub async fn start(
        self,
        task_set: &mut JoinSet<std::result::Result<(), BoxError>>,
        receivers_cancel: &CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        let poll_interval = self.config.watcher.poll_interval;

        for file in self.files {
            let parser = self.parser.clone();
            let output = self.output.clone();
            let metrics = self.metrics.clone();
            let cancel = receivers_cancel.clone();

            info!(path = %file.tailer.path().display(), "Following perfdata file");

            task_set.spawn_blocking(move || {
                follow_file(file, parser, output, metrics, poll_interval, cancel)
            });
        }

        Ok(())
    }
}

fn follow_file(
    mut file: FollowedFile,
    parser: PerfdataParser,
    output: BoundedSender<Event>,
    metrics: Arc<dyn MetricsReporter>,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> std::result::Result<(), BoxError> {
    let path = file.tailer.path().to_path_buf();

    while !cancel.is_cancelled() {
        let lines = match file
            .tailer
            .wait_for_lines(file.watcher.as_mut(), poll_interval)
        {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read perfdata file");
                continue;
            }
        };

        for line in lines {
            let event = match parser.parse(&line.text) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        seq = line.seq,
                        error = %e,
                        "Dropping unparsable perfdata line"
                    );
                    metrics.bad_line();
                    continue;
                }
            };

            match output.send_blocking_cancellable(event, &cancel) {
                Ok(()) => {}
                Err(SendError::Cancelled) => {
                    debug!(path = %path.display(), "Perfdata file follower cancelled while queue was full");
                    return Ok(());
                }
                Err(SendError::Disconnected) => {
                    info!(path = %path.display(), "Event queue closed, stopping perfdata file follower");
                    return Ok(());
                }
            }
        }
    }

    debug!(path = %path.display(), "Perfdata file follower exiting");
    Ok(())
}
