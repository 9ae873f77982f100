//! File metadata as reported by storage backends.

use std::path::PathBuf;
use time::{Duration, UtcDateTime};

/// File metadata returned by storage backends.
///
/// `modified` is the last time the file contents were (re)written. The cache
/// store uses it as the authoritative age of an entry, so backends must
/// report the real write time and never a value read from the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// Time elapsed between the last write and `now`.
    ///
    /// Clock skew can put `modified` in the future; that counts as zero age
    /// rather than a negative one.
    pub fn age(&self, now: UtcDateTime) -> Duration {
        (now - self.modified).max(Duration::ZERO)
    }

    /// Final path component as a lossy string, for logs and reports.
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }
}
