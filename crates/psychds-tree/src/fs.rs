//! The physical I/O boundary (spec.md §1: "the physical I/O layer ... is
//! consumed only through a narrow interface").
//!
//! Every engine that needs to read a file or list a directory goes through
//! this trait rather than calling `std::fs` directly, so the walker can be
//! exercised against an in-memory fixture in tests without touching disk.

use std::path::{Path, PathBuf};

/// One entry observed while listing a directory.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Narrow I/O interface the tree reader is built against.
pub trait FileSystem {
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// # Errors
    /// Returns the underlying I/O error if the directory cannot be listed.
    fn read_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>>;
}

/// Production implementation backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl FileSystem for StdFs {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    /// Entries are sorted by file name for determinism. The spec models
    /// iteration order as "whatever the OS reports", but any real walker
    /// needs a stable order to be testable; sorting is the least surprising
    /// choice and keeps files-before-subdirectories at each level (spec.md
    /// §5) as a separate, explicit sort key applied by the tree builder.
    fn read_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(DirEntry {
                path: entry.path(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
