//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.
//!
//! Most of these never reach a caller of [`CacheManager`](crate::CacheManager):
//! a broken entry is a miss and a failed write is a warning. They surface
//! from [`CacheStore`](crate::CacheStore) directly so that tooling can tell
//! the cases apart.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage backend failed; the cause is in the error tree.
    #[display("cache storage error")]
    Storage,
    /// A payload could not be encoded.
    #[display("could not serialize cache payload")]
    Serialize,
    /// An entry exists but can't be decoded, or belongs to a different kind
    /// or schema version.
    #[display("invalid cache data")]
    InvalidData,
    /// The kind can't be used as a directory name.
    #[display("invalid cache kind: {_0}")]
    InvalidKind(#[error(not(source))] String),
    /// The key can't be mapped to a file name.
    #[display("invalid cache key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// The caller's compute function failed.
    #[display("computing a fresh value failed")]
    Compute,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Compute)
    }
}
