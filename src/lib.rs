//! Batched, cache-aware extraction of large remote collections into flat
//! tables.
//!
//! The pieces live in their own crates and are re-exported here:
//! - [`config`]: layered configuration (defaults, TOML file, `HARVEST_*`
//!   environment) with clamping of tuning values.
//! - [`storage`]: the storage backends everything persists through.
//! - [`table`]: the flat [`Table`](table::Table) extraction results are
//!   combined into.
//! - [`cache`]: the expiring on-disk cache and its "cached or computed"
//!   facade.
//! - [`batch`]: the failure-isolating batch runner.
//!
//! [`Harvest`] wires them together from a [`Config`](config::Config).

pub mod error;
mod extract;

pub use crate::extract::ProjectExtractor;
pub use harvest_batch as batch;
pub use harvest_cache as cache;
pub use harvest_config as config;
pub use harvest_storage as storage;
pub use harvest_table as table;

use crate::error::{ErrorKind, Result};
use exn::{Exn, ResultExt};
use harvest_batch::{BatchReport, BatchRunner, CancellationToken, RunnerOptions};
use harvest_cache::{CacheManager, CacheStatistics, CacheStore, Kind, SweepReport};
use harvest_config::Config;
use harvest_storage::backend::LocalBackend;
use harvest_table::Table;
use std::error::Error as StdError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// A configured cache and batch runner, ready to extract.
pub struct Harvest {
    config: Config,
    cache: CacheManager,
    runner: BatchRunner,
}

impl Harvest {
    /// Load configuration (see [`Config::load()`]) and build from it.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = Config::load(path).or_raise(|| ErrorKind::Config)?;
        Self::from_config(config).await
    }

    /// Build from an already validated configuration.
    ///
    /// # Errors
    /// - [`ErrorKind::Cache`] if caching is enabled and the cache directory
    ///   can't be created.
    /// - [`ErrorKind::Batch`] if the snapshot directory can't be created.
    pub async fn from_config(config: Config) -> Result<Self> {
        let cache = if config.cache.enabled {
            let backend = LocalBackend::new("cache", &config.cache.dir).or_raise(|| ErrorKind::Cache)?;
            let store = CacheStore::open(Arc::new(backend), config.cache.max_age_days, config.cache.compression)
                .await
                .or_raise(|| ErrorKind::Cache)?;
            CacheManager::new(store)
        } else {
            tracing::info!("Caching disabled; every lookup will be computed");
            CacheManager::disabled()
        };
        let options = RunnerOptions::new(config.batch.size, config.batch.concurrency);
        let runner = BatchRunner::with_snapshot_dir(options, &config.batch.snapshot_dir).or_raise(|| ErrorKind::Batch)?;
        Ok(Self { config, cache, runner })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    /// Extract one table per project in batches, through the cache.
    ///
    /// The report's label is the kind's name. See [`ProjectExtractor`] for
    /// how each batch is computed and [`BatchRunner::run()`] for how the
    /// batches are combined.
    pub async fn extract_projects<F, Fut, E>(
        &self,
        kind: Kind,
        project_ids: &[u64],
        compute: F,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> BatchReport<Table>
    where
        F: Fn(u64) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Table, Exn<E>>> + Send,
        E: StdError + Send + Sync + 'static,
    {
        let label = kind.to_string();
        let extractor = ProjectExtractor::new(&self.cache, kind, compute).force_refresh(force_refresh);
        let report = self.runner.run(project_ids, &extractor, &label, cancel).await;
        tracing::info!(label, stats = %self.cache.stats(), "Cache usage");
        report
    }

    /// Remove expired cache entries. `None` when caching is disabled.
    pub async fn sweep_cache(&self) -> Result<Option<SweepReport>> {
        match self.cache.store() {
            Some(store) => Ok(Some(store.sweep().await.or_raise(|| ErrorKind::Cache)?)),
            None => Ok(None),
        }
    }

    /// Cache health report. `None` when caching is disabled.
    pub async fn cache_statistics(&self) -> Result<Option<CacheStatistics>> {
        match self.cache.store() {
            Some(store) => Ok(Some(store.statistics().await.or_raise(|| ErrorKind::Cache)?)),
            None => Ok(None),
        }
    }

    /// Delete the batch snapshots, typically after the combined result has
    /// been written out.
    pub async fn cleanup_snapshots(&self) -> Result<usize> {
        self.runner.cleanup_snapshots().await.or_raise(|| ErrorKind::Batch)
    }
}
