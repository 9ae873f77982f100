//! Storage backend trait and implementations.
//!
//! [`StorageBackend`] is a small async CRUD interface over relative paths.
//! The cache store keeps one file per entry on it, and the batch runner uses
//! a second instance rooted elsewhere for its snapshots.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Atomicity
/// [`write()`](Self::write) must replace the file as a whole: a concurrent
/// [`read()`](Self::read) sees either the previous contents or the new
/// contents, never a mix or a truncated file.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use harvest_storage::{StorageBackend, error::Result};
///
/// async fn size_of_project_list(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("metadata/project_list.json");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Prefixes match whole path components: `commits` matches
    /// `commits/project_1.json` but not `commits_old/project_1.json`. A
    /// prefix that doesn't exist yields an empty stream, not an error.
    /// Errors for individual entries are yielded in place without ending
    /// the stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use harvest_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("commits")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents atomically, replacing any existing file and
    /// resetting its modification time.
    ///
    /// Parent directories are created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create a directory (and its parents) if it does not exist yet.
    ///
    /// Backends without a notion of directories treat this as a no-op.
    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Delete temporary files left behind by interrupted writes once they
    /// are at least `older_than` old, returning how many were removed.
    ///
    /// Temporaries are never listed, so this is the only way they go away.
    /// Backends whose writes leave nothing behind have nothing to do.
    async fn remove_stale_temporaries(&self, _older_than: Duration) -> Result<usize> {
        Ok(0)
    }
}
