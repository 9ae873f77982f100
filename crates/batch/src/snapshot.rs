//! Intermediate per-batch results for crash recovery and debugging.
//!
//! One JSON file per successful batch, named by zero-padded batch index
//! (`batch_000.json`, `batch_001.json`, ...). They are not an output
//! contract and are safe to delete after a good run.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use harvest_storage::StorageBackend;
use serde::Serialize;
use std::path::{Path, PathBuf};

const PREFIX: &str = "batch_";
const EXTENSION: &str = ".json";

pub fn snapshot_path(index: usize) -> PathBuf {
    PathBuf::from(format!("{PREFIX}{index:03}{EXTENSION}"))
}

fn is_snapshot(path: &Path) -> bool {
    path.parent().is_none_or(|parent| parent.as_os_str().is_empty())
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(PREFIX))
            .and_then(|rest| rest.strip_suffix(EXTENSION))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

pub(crate) async fn write<R: Serialize>(backend: &dyn StorageBackend, index: usize, result: &R) -> Result<PathBuf> {
    let path = snapshot_path(index);
    let bytes = serde_json::to_vec(result).or_raise(|| ErrorKind::Snapshot)?;
    backend.write(&path, &bytes).await.or_raise(|| ErrorKind::Snapshot)?;
    Ok(path)
}

/// Delete every snapshot in `backend`, returning how many were removed.
///
/// Other files are left alone.
pub(crate) async fn cleanup(backend: &dyn StorageBackend) -> Result<usize> {
    let mut removed = 0;
    let mut failures = 0;
    let mut stream = backend.list_stream(None);
    while let Some(entry) = stream.next().await {
        let info = entry.or_raise(|| ErrorKind::Snapshot)?;
        if !is_snapshot(&info.path) {
            continue;
        }
        match backend.delete(&info.path).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %info.path.display(), error = ?e, "Could not remove batch snapshot");
                failures += 1;
            },
        }
    }
    if failures > 0 {
        exn::bail!(ErrorKind::Snapshot);
    }
    tracing::info!(removed, "Cleaned up batch snapshots");
    Ok(removed)
}
