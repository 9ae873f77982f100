//! Storage backends for the cache store and batch snapshots.
//!
//! Everything above this crate talks to a [`StorageBackend`] through relative,
//! validated paths. The [`LocalBackend`](backend::LocalBackend) is what runs in
//! production; the [`MockBackend`](backend::MockBackend) (feature `mock`) keeps
//! everything in memory and lets tests age files or inject failures.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
