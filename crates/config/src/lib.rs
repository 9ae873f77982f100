//! Configuration loading and validation.
//!
//! Sources are layered with [`figment`], later ones overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default()`]),
//! 2. an optional TOML file,
//! 3. environment variables prefixed `HARVEST_`, nested with `__`
//!    (`HARVEST_CACHE__MAX_AGE_DAYS=14` sets `cache.max_age_days`).
//!
//! Tuning parameters that are out of range are clamped to the nearest valid
//! bound with a warning instead of failing the whole run.
//!
//! ```toml
//! [batch]
//! size = 10
//! concurrency = 2
//! snapshot_dir = "temp_batches"
//!
//! [cache]
//! max_age_days = 7
//! dir = "/var/cache/harvest"
//! compression = "gzip"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
pub use harvest_cache::{Compression, MAX_CACHE_DAYS, MIN_CACHE_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Items per batch that suits the remote service best.
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MIN_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 20;
/// One week, matching a weekly extraction schedule.
pub const DEFAULT_CACHE_DAYS: u32 = 7;
/// The upstream service is tuned for one batch at a time; keep parallelism small.
pub const MAX_CONCURRENCY: usize = 8;
const ENV_PREFIX: &str = "HARVEST_";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub min_size: usize,
    pub max_size: usize,
    /// Batches allowed in flight at once. `1` processes strictly one after
    /// another.
    pub concurrency: usize,
    /// Where intermediate per-batch results are written.
    pub snapshot_dir: PathBuf,
}
impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BATCH_SIZE,
            min_size: MIN_BATCH_SIZE,
            max_size: MAX_BATCH_SIZE,
            concurrency: 1,
            snapshot_dir: PathBuf::from("temp_batches"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_age_days: u32,
    pub dir: PathBuf,
    pub compression: Compression,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: DEFAULT_CACHE_DAYS,
            dir: default_cache_dir(),
            compression: Compression::None,
        }
    }
}

/// Platform cache directory for harvest, or `.harvest_cache` in the working
/// directory when the platform has none (e.g. no home directory).
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "harvest")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".harvest_cache"))
}

/// Clamp a batch size into `[min, max]`.
///
/// `min` must not exceed `max`; [`Config::validated()`] guarantees that
/// before calling.
pub fn validate_batch_size(size: usize, min: usize, max: usize) -> usize {
    size.clamp(min, max)
}

/// Clamp a cache lifetime into `[1, 30]` days.
///
/// Zero would disable caching entirely and anything past a month would keep
/// serving results that no longer resemble the remote state.
pub fn validate_cache_days(days: u32) -> u32 {
    days.clamp(MIN_CACHE_DAYS, MAX_CACHE_DAYS)
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, then validate it.
    ///
    /// # Errors
    /// - [`ErrorKind::NotFound`] if `path` is given but doesn't exist.
    /// - [`ErrorKind::Load`] if a source can't be parsed.
    /// - [`ErrorKind::InvalidValue`] if the batch size bounds are unusable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::figment(path)?.extract::<Self>().or_raise(|| ErrorKind::Load)?.validated()
    }

    /// The layered [`Figment`] behind [`load()`](Self::load), for callers that
    /// want to merge in their own providers.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Check hard constraints and clamp tuning parameters into range.
    pub fn validated(mut self) -> Result<Self> {
        let batch = &mut self.batch;
        if batch.min_size == 0 {
            exn::bail!(ErrorKind::InvalidValue("batch.min_size"));
        }
        if batch.min_size > batch.max_size {
            exn::bail!(ErrorKind::InvalidValue("batch.max_size"));
        }
        let size = validate_batch_size(batch.size, batch.min_size, batch.max_size);
        if size != batch.size {
            tracing::warn!(requested = batch.size, used = size, "Batch size out of range; clamped");
            batch.size = size;
        }
        let concurrency = batch.concurrency.clamp(1, MAX_CONCURRENCY);
        if concurrency != batch.concurrency {
            tracing::warn!(requested = batch.concurrency, used = concurrency, "Batch concurrency out of range; clamped");
            batch.concurrency = concurrency;
        }
        let days = validate_cache_days(self.cache.max_age_days);
        if days != self.cache.max_age_days {
            tracing::warn!(requested = self.cache.max_age_days, used = days, "Cache max age out of range; clamped");
            self.cache.max_age_days = days;
        }
        Ok(self)
    }
}
