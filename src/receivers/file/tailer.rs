// SPDX-License-Identifier: Apache-2.0

//! Follows a single append-only file across truncation and rotation.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::RawLine;
use crate::receivers::file::file_id::FileId;
use crate::receivers::file::watcher::{FileWatcher, WatcherConfig, WatcherError, create_watcher};

/// Lines longer than this are cut short by default.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Where reading starts when a file is first opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Read everything already in the file
    Beginning,
    /// Only lines appended after opening
    #[default]
    End,
}

impl std::str::FromStr for StartAt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginning" | "start" => Ok(StartAt::Beginning),
            "end" => Ok(StartAt::End),
            _ => Err(format!(
                "Invalid start position '{}'. Valid options: beginning, end",
                s
            )),
        }
    }
}

/// Outcome of comparing the followed path with the open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationCheck {
    Unchanged,
    /// The path names a new file. The old handle was drained and the new
    /// file is now followed from its first byte.
    Rotated,
    /// The file shrank below the read offset and is read again from 0.
    Truncated,
    /// The path is gone. The old handle is kept until it reappears.
    Missing,
}

pub struct FileTailer {
    path: PathBuf,
    source: Arc<Path>,
    file: File,
    id: FileId,
    offset: u64,
    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
    /// Lines drained from a rotated-away handle, returned by the next read
    backlog: Vec<String>,
    max_line_bytes: usize,
    seq: u64,
}

impl FileTailer {
    pub fn open(path: impl AsRef<Path>, start_at: StartAt) -> io::Result<Self> {
        Self::open_with_limit(path, start_at, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn open_with_limit(
        path: impl AsRef<Path>,
        start_at: StartAt,
        max_line_bytes: usize,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        let offset = match start_at {
            StartAt::Beginning => 0,
            StartAt::End => metadata.len(),
        };

        Ok(Self {
            source: Arc::from(path.as_path()),
            path,
            file,
            id: FileId::from_metadata(&metadata),
            offset,
            partial: Vec::new(),
            backlog: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            seq: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &Arc<Path> {
        &self.source
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn file_id(&self) -> FileId {
        self.id
    }

    /// Read every complete line appended since the last call.
    ///
    /// A trailing line without its newline is held back until it is
    /// completed. Empty lines are skipped.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = std::mem::take(&mut self.backlog);
        self.read_available(&mut lines)?;
        Ok(lines)
    }

    /// Like [`read_lines`](Self::read_lines), tagging each line with its
    /// source and sequence number.
    pub fn read_raw_lines(&mut self) -> io::Result<Vec<RawLine>> {
        let lines = self.read_lines()?;
        Ok(lines
            .into_iter()
            .map(|text| {
                let seq = self.seq;
                self.seq += 1;
                RawLine {
                    source: self.source.clone(),
                    text,
                    seq,
                }
            })
            .collect())
    }

    pub fn check_rotation(&mut self) -> io::Result<RotationCheck> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RotationCheck::Missing),
            Err(e) => return Err(e),
        };

        if FileId::from_metadata(&metadata) != self.id {
            let new_file = match File::open(&self.path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(RotationCheck::Missing);
                }
                Err(e) => return Err(e),
            };

            let mut drained = Vec::new();
            self.read_available(&mut drained)?;
            // The old file will never finish its last line
            if let Some(line) = self.take_partial() {
                drained.push(line);
            }
            self.backlog.extend(drained);

            let previous = self.id;
            self.id = FileId::from_file(&new_file)?;
            self.file = new_file;
            self.offset = 0;
            info!(
                path = %self.path.display(),
                previous = %previous,
                current = %self.id,
                "Followed file was rotated"
            );
            return Ok(RotationCheck::Rotated);
        }

        if metadata.len() < self.offset {
            info!(
                path = %self.path.display(),
                offset = self.offset,
                size = metadata.len(),
                "Followed file was truncated, reading from the start"
            );
            self.offset = 0;
            self.partial.clear();
            return Ok(RotationCheck::Truncated);
        }

        Ok(RotationCheck::Unchanged)
    }

    /// Wait for a change hint (or `timeout`), then pick up rotation and new
    /// lines.
    pub fn wait_for_lines(
        &mut self,
        watcher: &mut dyn FileWatcher,
        timeout: Duration,
    ) -> io::Result<Vec<RawLine>> {
        if let Err(e) = watcher.wait(timeout) {
            warn!(
                path = %self.path.display(),
                backend = watcher.backend_name(),
                error = %e,
                "File watcher failed, falling back to a timed re-check"
            );
            std::thread::sleep(timeout);
        }

        match self.check_rotation()? {
            RotationCheck::Missing => {
                debug!(path = %self.path.display(), "Followed file is missing");
            }
            RotationCheck::Unchanged | RotationCheck::Rotated | RotationCheck::Truncated => {}
        }

        self.read_raw_lines()
    }

    /// Turn the tailer into a lazy, never-ending sequence of lines.
    ///
    /// The iterator blocks the calling thread between lines. Read errors are
    /// logged and retried on the next wakeup.
    pub fn lines(self, config: &WatcherConfig) -> Result<RawLines, WatcherError> {
        let mut watcher = create_watcher(config)?;
        watcher.watch_file(&self.path)?;
        Ok(RawLines {
            tailer: self,
            watcher,
            poll_interval: config.poll_interval,
            ready: VecDeque::new(),
        })
    }

    fn read_available(&mut self, lines: &mut Vec<String>) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.offset))?;

        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            let n = match self.file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.offset += n as u64;
            self.split_lines(&buf[..n], lines);
        }

        Ok(())
    }

    fn split_lines(&mut self, mut chunk: &[u8], lines: &mut Vec<String>) {
        while let Some(pos) = chunk.iter().position(|b| *b == b'\n') {
            self.push_partial(&chunk[..pos]);
            if let Some(line) = self.take_partial() {
                lines.push(line);
            }
            chunk = &chunk[pos + 1..];
        }
        self.push_partial(chunk);
    }

    fn push_partial(&mut self, bytes: &[u8]) {
        let room = self.max_line_bytes.saturating_sub(self.partial.len());
        self.partial
            .extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn take_partial(&mut self) -> Option<String> {
        let mut bytes = std::mem::take(&mut self.partial);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        if bytes.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Infinite iterator over the lines of a followed file.
pub struct RawLines {
    tailer: FileTailer,
    watcher: Box<dyn FileWatcher>,
    poll_interval: Duration,
    ready: VecDeque<RawLine>,
}

impl Iterator for RawLines {
    type Item = RawLine;

    fn next(&mut self) -> Option<RawLine> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(line);
            }

            match self
                .tailer
                .wait_for_lines(self.watcher.as_mut(), self.poll_interval)
            {
                Ok(lines) => self.ready.extend(lines),
                Err(e) => {
                    warn!(path = %self.tailer.path.display(), error = %e, "Failed to read followed file");
                }
            }
        }
    }
}
