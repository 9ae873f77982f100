//! Relative path validation.
//!
//! Cache keys and snapshot names end up as file names, so every path a
//! backend touches goes through [`validate`] before it is joined onto a root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalises a storage path.
///
/// `.` components and repeated or trailing separators are dropped, `..` is
/// resolved as long as it never climbs above the storage root, and a leading
/// `/` is treated as the root itself. Null bytes, platform prefixes and paths
/// that normalise to nothing are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use harvest_storage::validate_path;
///
/// assert_eq!(validate_path("commits/project_1.json").unwrap(), Path::new("commits/project_1.json"));
/// assert_eq!(validate_path("./metadata//project_list.json").unwrap(), Path::new("metadata/project_list.json"));
/// assert!(validate_path("../outside.json").is_err());
/// assert!(validate_path("commits/\0.json").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // the path once it reaches a syscall.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}
