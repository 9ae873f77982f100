//! The persistent, expiring key-value store.

use crate::codec::{self, Compression};
use crate::error::{ErrorKind, Result};
use crate::kind::{self, Kind};
use crate::stats::{CacheStatistics, KindStatistics, SweepReport};
use crate::{MAX_CACHE_DAYS, MIN_CACHE_DAYS};
use exn::ResultExt;
use futures::StreamExt;
use harvest_storage::{BackendHandle, FileInfo};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use time::{Duration, UtcDateTime};
use tracing::instrument;

/// How long a temporary file may sit untouched before a sweep assumes its
/// write was interrupted.
const STALE_TEMPORARY_AGE: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Durable `(kind, key) -> payload` storage with time-based expiration.
///
/// Each kind is a directory on the backend and each key one file inside it.
/// The file's modification time is the entry's timestamp: an entry is valid
/// while it is younger than the configured max age and is logically absent
/// afterwards, even though the file stays on disk until [`sweep()`](Self::sweep)
/// removes it. Reads validate lazily; nothing is deleted on the hot path.
///
/// Writes go through [`StorageBackend::write()`](harvest_storage::StorageBackend::write),
/// which replaces files atomically, so concurrent readers and writers of the
/// same key never see a torn entry.
pub struct CacheStore {
    backend: BackendHandle,
    compression: Compression,
    max_age_days: u32,
    max_age: Duration,
}

impl CacheStore {
    /// Open a store on `backend`, creating the built-in kind directories.
    ///
    /// `max_age_days` is clamped to `1..=30`.
    ///
    /// # Errors
    /// [`ErrorKind::Storage`] if the directories can't be created. This is
    /// the one cache failure treated as fatal: without a working directory
    /// there is nothing to fall back on.
    pub async fn open(backend: BackendHandle, max_age_days: u32, compression: Compression) -> Result<Self> {
        for kind in &Kind::BUILTIN {
            backend.create_dir(Path::new(kind.as_str())).await.or_raise(|| ErrorKind::Storage)?;
        }
        let clamped = max_age_days.clamp(MIN_CACHE_DAYS, MAX_CACHE_DAYS);
        if clamped != max_age_days {
            tracing::warn!(requested = max_age_days, used = clamped, "Cache max age out of range; clamped");
        }
        tracing::debug!(backend = backend.name(), max_age_days = clamped, %compression, "Opened cache store");
        Ok(Self {
            backend,
            compression,
            max_age_days: clamped,
            max_age: Duration::days(i64::from(clamped)),
        })
    }

    pub fn max_age_days(&self) -> u32 {
        self.max_age_days
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Relative path of the file backing `(kind, key)`.
    pub fn entry_path(&self, kind: &Kind, key: &str) -> Result<PathBuf> {
        let dir = kind.dir_name()?;
        let stem = kind::file_stem(key)?;
        Ok(Path::new(dir).join(format!("{stem}{}", self.compression.extension())))
    }

    fn is_fresh(&self, info: &FileInfo, now: UtcDateTime) -> bool {
        info.age(now) < self.max_age
    }

    /// Metadata of the entry, or `None` if there is no file.
    async fn stat(&self, path: &Path) -> Result<Option<FileInfo>> {
        match self.backend.stat(path).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Whether a stored entry exists and is younger than the max age.
    pub async fn is_valid(&self, kind: &Kind, key: &str) -> Result<bool> {
        let path = self.entry_path(kind, key)?;
        Ok(self.stat(&path).await?.is_some_and(|info| self.is_fresh(&info, UtcDateTime::now())))
    }

    /// Fetch a valid entry.
    ///
    /// Returns `Ok(None)` when the entry doesn't exist or has expired; an
    /// expired entry is never returned, however recently it expired.
    ///
    /// # Errors
    /// - [`ErrorKind::Storage`] if the backend fails.
    /// - [`ErrorKind::InvalidData`] if the entry can't be decoded as `T` or
    ///   was written for a different kind or schema.
    #[instrument(level = "debug", skip(self, kind), fields(kind = %kind))]
    pub async fn get<T: DeserializeOwned>(&self, kind: &Kind, key: &str) -> Result<Option<T>> {
        let path = self.entry_path(kind, key)?;
        let Some(info) = self.stat(&path).await? else {
            tracing::debug!("Cache miss");
            return Ok(None);
        };
        if !self.is_fresh(&info, UtcDateTime::now()) {
            tracing::debug!(age_days = info.age(UtcDateTime::now()).whole_days(), "Cache entry expired");
            return Ok(None);
        }
        let bytes = match self.backend.read(&path).await {
            Ok(bytes) => bytes,
            // Swept between stat and read.
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        };
        let data = codec::decode(kind.as_str(), bytes, self.compression)?;
        tracing::debug!("Cache hit");
        Ok(Some(data))
    }

    /// Store `data` under `(kind, key)`, replacing any previous entry and
    /// resetting its age to zero.
    #[instrument(level = "debug", skip(self, kind, data), fields(kind = %kind))]
    pub async fn put<T: Serialize + ?Sized>(&self, kind: &Kind, key: &str, data: &T) -> Result<()> {
        let path = self.entry_path(kind, key)?;
        let bytes = codec::encode(kind.as_str(), &data, self.compression)?;
        self.backend.write(&path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(bytes = bytes.len(), "Cached entry");
        Ok(())
    }

    /// Delete one entry. Returns `false` if there was nothing to delete.
    pub async fn invalidate(&self, kind: &Kind, key: &str) -> Result<bool> {
        let path = self.entry_path(kind, key)?;
        match self.backend.delete(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Kind directory of a listed file, if it looks like a cache entry at all.
    ///
    /// Files at the root, in nested directories, or without a cache
    /// extension (such as in-flight temporaries) are not entries.
    fn entry_kind(info: &FileInfo) -> Option<String> {
        Compression::from_file_name(&info.file_name())?;
        let mut components = info.path.components();
        let kind = components.next()?.as_os_str().to_str()?.to_string();
        components.next()?;
        components.next().is_none().then_some(kind)
    }

    /// Delete every entry that has reached the max age.
    ///
    /// Entries written with either compression are considered, so switching
    /// compression doesn't strand old files. Failures on individual entries
    /// are counted and logged; the sweep carries on.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = UtcDateTime::now();
        let mut report = SweepReport::default();
        let mut stream = self.backend.list_stream(None);
        while let Some(entry) = stream.next().await {
            let info = match entry {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!(error = ?e, "Could not inspect cache entry");
                    report.errors += 1;
                    continue;
                },
            };
            if Self::entry_kind(&info).is_none() {
                continue;
            }
            if self.is_fresh(&info, now) {
                report.kept += 1;
                continue;
            }
            match self.backend.delete(&info.path).await {
                Ok(()) => {
                    tracing::debug!(path = %info.path.display(), "Removed expired cache entry");
                    report.removed += 1;
                },
                // Someone else got there first.
                Err(e) if e.is_not_found() => report.removed += 1,
                Err(e) => {
                    tracing::error!(path = %info.path.display(), error = ?e, "Could not remove expired cache entry");
                    report.errors += 1;
                },
            }
        }
        match self.backend.remove_stale_temporaries(STALE_TEMPORARY_AGE).await {
            Ok(removed) => report.temporaries = removed,
            Err(e) => {
                tracing::error!(error = ?e, "Could not remove stale temporary files");
                report.errors += 1;
            },
        }
        tracing::info!(
            removed = report.removed,
            kept = report.kept,
            errors = report.errors,
            temporaries = report.temporaries,
            "Cache sweep complete"
        );
        Ok(report)
    }

    /// Scan the cache and summarise it. Read-only.
    ///
    /// Only file metadata is inspected, so entries with corrupt contents are
    /// still counted; entries whose metadata can't be read are skipped and
    /// counted in [`CacheStatistics::errors`].
    pub async fn statistics(&self) -> Result<CacheStatistics> {
        let mut stats = CacheStatistics { max_age_days: self.max_age_days, ..Default::default() };
        for kind in &Kind::BUILTIN {
            stats.by_kind.insert(kind.as_str().to_string(), KindStatistics::default());
        }
        let mut stream = self.backend.list_stream(None);
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(info) => {
                    if let Some(kind) = Self::entry_kind(&info) {
                        stats.record(&kind, info.file_name(), info.size, info.modified);
                    }
                },
                Err(e) => {
                    tracing::error!(error = ?e, "Could not read cache entry metadata");
                    stats.errors += 1;
                },
            }
        }
        Ok(stats)
    }
}
