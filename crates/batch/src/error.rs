//! Error types for the batch runner.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A batch error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a batch failure.
///
/// ### Isolated Errors
/// - [`ErrorKind::Extraction`] is raised by extractors. The runner records
///   it against the batch and moves on; it never ends a run.
/// - [`ErrorKind::Snapshot`] is logged when an intermediate result can't be
///   written, and returned from snapshot cleanup.
///
/// ### Setup Errors
/// - [`ErrorKind::Storage`]: the snapshot directory can't be used at all.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The extraction function failed for a batch.
    #[display("batch extraction failed")]
    Extraction,
    /// An intermediate batch snapshot could not be written or removed.
    #[display("batch snapshot failed")]
    Snapshot,
    /// The snapshot storage could not be set up.
    #[display("batch snapshot storage unavailable")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Extraction | Self::Snapshot)
    }
}
