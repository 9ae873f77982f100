//! Error types for wiring the harvest components together.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A harvest error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which component could not be set up.
///
/// Extraction itself never ends up here: failing batches are isolated by the
/// runner and reported in its summary.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration could not be loaded or is unusable.
    #[display("invalid configuration")]
    Config,
    /// The cache directory could not be opened, swept or inspected.
    #[display("cache unavailable")]
    Cache,
    /// The batch snapshot directory could not be used.
    #[display("batch runner unavailable")]
    Batch,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Batch)
    }
}
