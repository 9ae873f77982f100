//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`] together with the time
/// they were written. Tests can back-date a file with
/// [`set_modified()`](Self::set_modified) to simulate an expired cache entry,
/// or make a path fail with [`fail_on()`](Self::fail_on) to exercise error
/// handling without touching a real disk.
///
/// # Examples
///
/// ```
/// use harvest_storage::backend::MockBackend;
/// use harvest_storage::StorageBackend;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("commits/project_1.json", b"{}")]);
/// assert!(backend.exists(Path::new("commits/project_1.json")).await.unwrap());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    failing: RwLock<HashSet<PathBuf>>,
    unlistable: RwLock<HashSet<PathBuf>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failing: RwLock::new(HashSet::new()),
            unlistable: RwLock::new(HashSet::new()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overwrite the modification time of an existing file.
    ///
    /// Returns `false` if no file exists at `path`.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: UtcDateTime) -> bool {
        let Ok(path) = validate_path(path) else {
            return false;
        };
        match self.storage.write().await.get_mut(&path) {
            Some(entry) => {
                entry.0 = modified;
                true
            },
            None => false,
        }
    }

    /// Make every read, write, stat and delete of `path` fail with an I/O
    /// error from now on.
    pub async fn fail_on(&self, path: impl AsRef<Path>) {
        if let Ok(path) = validate_path(path) {
            self.failing.write().await.insert(path);
        }
    }

    /// Make listings yield an I/O error in place of `path`'s metadata from
    /// now on, as a directory walk does for an entry it can't inspect. The
    /// file itself stays readable.
    pub async fn fail_listing_on(&self, path: impl AsRef<Path>) {
        if let Ok(path) = validate_path(path) {
            self.unlistable.write().await.insert(path);
        }
    }

    /// Number of files currently stored.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Returns `true` if no files are stored.
    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    async fn check(&self, path: &Path) -> Result<PathBuf> {
        let path = validate_path(path)?;
        if self.failing.read().await.contains(&path) {
            exn::bail!(ErrorKind::Io(std::io::Error::other(format!("injected failure for {}", path.display()))));
        }
        Ok(path)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding.
            let unlistable = self.unlistable.read().await.clone();
            let mut entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            for info in entries {
                if unlistable.contains(&info.path) {
                    yield Err(exn::Exn::from(ErrorKind::Io(std::io::Error::other(format!(
                        "injected listing failure for {}",
                        info.path.display()
                    )))));
                    continue;
                }
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = self.check(path).await?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = self.check(path).await?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        validate_path(path)?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = self.check(path).await?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = self.check(path).await?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}
