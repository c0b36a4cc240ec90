// SPDX-License-Identifier: Apache-2.0

//! File identity based on device and inode number.
//!
//! The identity of an open handle stays the same when the file is renamed,
//! which is how a rotated perfdata file is told apart from its replacement.

use std::fs::{File, Metadata};
use std::io;
use std::path::Path;

/// Device + inode pair naming one file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Without inode numbers every file looks the same, so rotation is only
    /// noticed through truncation.
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        Self { dev: 0, ino: 0 }
    }

    /// Identity of an open file handle.
    pub fn from_file(file: &File) -> io::Result<Self> {
        Ok(Self::from_metadata(&file.metadata()?))
    }

    /// Identity of whatever the path currently names.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_handle_and_path_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let from_handle = FileId::from_file(&file.reopen().unwrap()).unwrap();
        let from_path = FileId::from_path(file.path()).unwrap();

        assert_eq!(from_handle, from_path);
        assert!(from_path.ino() > 0);
    }

    #[test]
    fn test_different_files_differ() {
        let file1 = NamedTempFile::new().unwrap();
        let file2 = NamedTempFile::new().unwrap();

        assert_ne!(
            FileId::from_path(file1.path()).unwrap(),
            FileId::from_path(file2.path()).unwrap()
        );
    }

    #[test]
    fn test_identity_follows_rename() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("perfdata.log");
        let rotated = dir.path().join("perfdata.log.1");
        std::fs::write(&original, b"line\n").unwrap();

        let handle = File::open(&original).unwrap();
        let before = FileId::from_file(&handle).unwrap();

        std::fs::rename(&original, &rotated).unwrap();
        std::fs::write(&original, b"").unwrap();

        assert_eq!(before, FileId::from_file(&handle).unwrap());
        assert_eq!(before, FileId::from_path(&rotated).unwrap());
        assert_ne!(before, FileId::from_path(&original).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(FileId::new(123, 456).to_string(), "123:456");
    }
}
