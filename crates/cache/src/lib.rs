//! Expiring on-disk cache for extraction results.
//!
//! Repeated (typically weekly) extraction runs ask the remote service for
//! largely the same data. This crate keeps the per-entity results of a run
//! on disk so the next run can reuse them while they're still representative.
//!
//! # Architecture
//! - [`CacheStore`] is the persistent layer: one directory per [`Kind`], one
//!   file per key, entries expire once their file modification time is older
//!   than the configured max age. Expired entries are ignored on read and
//!   removed by an explicit [`sweep()`](CacheStore::sweep).
//! - [`CacheManager`] is the facade extractors use: "cached value, or compute
//!   and remember". Empty results are never cached and cache trouble never
//!   fails a lookup.
//! - [`Memo`] is an in-process memo table for lookups repeated within a run.

mod codec;
pub mod error;
mod kind;
mod manager;
mod memo;
mod stats;
mod store;

pub use crate::codec::{Compression, SCHEMA_VERSION};
pub use crate::kind::Kind;
pub use crate::manager::{CacheManager, ExtractionStats, Lookup, Payload, Source, project_key};
pub use crate::memo::Memo;
pub use crate::stats::{CacheStatistics, EntryStamp, KindStatistics, SweepReport};
pub use crate::store::CacheStore;

/// Shortest allowed cache lifetime, in days.
pub const MIN_CACHE_DAYS: u32 = 1;
/// Longest allowed cache lifetime, in days.
pub const MAX_CACHE_DAYS: u32 = 30;
