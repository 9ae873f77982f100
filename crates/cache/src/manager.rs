//! "Cached or computed" lookups on top of [`CacheStore`].

use crate::error::{ErrorKind, Result};
use crate::kind::Kind;
use crate::store::CacheStore;
use exn::{Exn, ResultExt};
use harvest_table::Table;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::instrument;

const PROJECT_LIST_KEY: &str = "project_list";

/// Results that can be "empty", and therefore are never cached.
///
/// An empty result from the remote service is as likely to be a transient
/// hiccup as a confirmed fact, so it is returned to the caller but not
/// remembered.
pub trait Payload {
    fn is_empty(&self) -> bool;
}
impl Payload for Table {
    fn is_empty(&self) -> bool {
        Table::is_empty(self)
    }
}
impl<T> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}
impl<T: Payload> Payload for Option<T> {
    fn is_empty(&self) -> bool {
        self.as_ref().is_none_or(Payload::is_empty)
    }
}

/// Where a [`Lookup`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Computed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub source: Source,
}
impl<T> Lookup<T> {
    pub fn is_cached(&self) -> bool {
        self.source == Source::Cache
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Counters over the lifetime of a [`CacheManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Served from the cache without computing.
    pub hits: usize,
    /// Compute function called and succeeded.
    pub computed: usize,
    /// Computed results that were empty and so not cached.
    pub empty: usize,
    /// Compute function called and failed.
    pub failed: usize,
    /// Computed results that couldn't be written to the cache.
    pub write_failures: usize,
}
impl ExtractionStats {
    /// Fraction of successful lookups served from the cache; `0.0` before
    /// any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.computed;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
impl Display for ExtractionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cached, {} computed ({} empty), {} failed, {} write failures, hit rate {:.1}%",
            self.hits,
            self.computed,
            self.empty,
            self.failed,
            self.write_failures,
            self.hit_rate() * 100.0
        )
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    computed: AtomicUsize,
    empty: AtomicUsize,
    failed: AtomicUsize,
    write_failures: AtomicUsize,
}
impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ExtractionStats {
        ExtractionStats {
            hits: self.hits.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Cache facade for extractors.
///
/// [`get_or_compute()`](Self::get_or_compute) returns a fresh cached value if
/// there is one and otherwise calls the supplied function, caching non-empty
/// results. Cache trouble never fails a lookup: unreadable entries count as
/// misses and failed writes are logged, with the computed value returned
/// either way. Only the compute function's own failure propagates.
///
/// The manager is `Send + Sync`; share it behind an [`Arc`](std::sync::Arc)
/// between concurrently running batches.
pub struct CacheManager {
    store: Option<CacheStore>,
    counters: Counters,
}

impl CacheManager {
    pub fn new(store: CacheStore) -> Self {
        Self { store: Some(store), counters: Counters::default() }
    }

    /// A manager that always computes and never stores.
    pub fn disabled() -> Self {
        Self { store: None, counters: Counters::default() }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn stats(&self) -> ExtractionStats {
        self.counters.snapshot()
    }

    /// Return the cached value for `(kind, key)`, or compute, cache and
    /// return it.
    ///
    /// With `force_refresh` the cache is not consulted, `compute` always runs
    /// and a non-empty result overwrites the stored entry.
    ///
    /// # Errors
    /// [`ErrorKind::Compute`] wrapping the compute function's error.
    #[instrument(level = "debug", skip(self, kind, compute), fields(kind = %kind))]
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        kind: &Kind,
        key: &str,
        compute: F,
        force_refresh: bool,
    ) -> Result<Lookup<T>>
    where
        T: Payload + Serialize + DeserializeOwned,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, Exn<E>>>,
        E: StdError + Send + Sync + 'static,
    {
        if let Some(store) = &self.store
            && !force_refresh
        {
            match store.get::<T>(kind, key).await {
                Ok(Some(value)) => {
                    Counters::bump(&self.counters.hits);
                    tracing::info!(%kind, key, "Using cached result");
                    return Ok(Lookup { value, source: Source::Cache });
                },
                Ok(None) => {},
                Err(e) => tracing::warn!(%kind, key, error = ?e, "Unreadable cache entry; recomputing"),
            }
        }

        tracing::info!(%kind, key, force_refresh, "Computing fresh result");
        let value = match compute(key.to_string()).await {
            Ok(value) => value,
            Err(e) => {
                Counters::bump(&self.counters.failed);
                return Err(e).or_raise(|| ErrorKind::Compute);
            },
        };
        Counters::bump(&self.counters.computed);

        if value.is_empty() {
            Counters::bump(&self.counters.empty);
            tracing::debug!(%kind, key, "Empty result; not caching");
        } else if let Some(store) = &self.store
            && let Err(e) = store.put(kind, key, &value).await
        {
            Counters::bump(&self.counters.write_failures);
            tracing::warn!(%kind, key, error = ?e, "Could not cache computed result");
        }
        Ok(Lookup { value, source: Source::Computed })
    }

    /// Commits table for one project, cached under `commits/project_{id}`.
    pub async fn commits<F, Fut, E>(&self, project_id: u64, compute: F, force_refresh: bool) -> Result<Lookup<Table>>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = std::result::Result<Table, Exn<E>>>,
        E: StdError + Send + Sync + 'static,
    {
        self.get_or_compute(&Kind::Commits, &project_key(project_id), |_| compute(project_id), force_refresh).await
    }

    /// Pipelines table for one project, cached under `pipelines/project_{id}`.
    pub async fn pipelines<F, Fut, E>(&self, project_id: u64, compute: F, force_refresh: bool) -> Result<Lookup<Table>>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = std::result::Result<Table, Exn<E>>>,
        E: StdError + Send + Sync + 'static,
    {
        self.get_or_compute(&Kind::Pipelines, &project_key(project_id), |_| compute(project_id), force_refresh).await
    }

    /// The full list of projects, cached under `metadata/project_list`.
    pub async fn project_list<T, F, Fut, E>(&self, compute: F, force_refresh: bool) -> Result<Lookup<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, Exn<E>>>,
        E: StdError + Send + Sync + 'static,
    {
        self.get_or_compute(&Kind::Metadata, PROJECT_LIST_KEY, |_| compute(), force_refresh).await
    }

    /// Drop everything cached for one project. Failures are logged, not
    /// returned; a stale entry will expire on its own.
    pub async fn invalidate_project(&self, project_id: u64) {
        let Some(store) = &self.store else {
            return;
        };
        let key = project_key(project_id);
        for kind in [Kind::Commits, Kind::Pipelines] {
            if let Err(e) = store.invalidate(&kind, &key).await {
                tracing::warn!(%kind, key, error = ?e, "Could not invalidate cache entry");
            }
        }
    }
}

/// Cache key of everything stored per project.
pub fn project_key(project_id: u64) -> String {
    format!("project_{project_id}")
}
