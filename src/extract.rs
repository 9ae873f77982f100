use exn::{Exn, ResultExt};
use harvest_batch::Extractor;
use harvest_batch::error::{ErrorKind, Result};
use harvest_cache::{CacheManager, Kind, project_key};
use harvest_table::Table;
use std::error::Error as StdError;
use std::future::Future;

/// Extracts one table per project id through the cache, combining them into
/// one table per batch.
///
/// Each project is looked up under `kind/project_{id}`; on a miss `compute`
/// is called for it and a non-empty result is cached for the next run. The
/// first project that fails to compute fails the whole batch.
pub struct ProjectExtractor<'a, F> {
    cache: &'a CacheManager,
    kind: Kind,
    compute: F,
    force_refresh: bool,
}

impl<'a, F> ProjectExtractor<'a, F> {
    pub fn new(cache: &'a CacheManager, kind: Kind, compute: F) -> Self {
        Self { cache, kind, compute, force_refresh: false }
    }

    /// Ignore cached entries, recompute every project and overwrite them.
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

impl<F, Fut, E> Extractor<u64, Table> for ProjectExtractor<'_, F>
where
    F: Fn(u64) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Table, Exn<E>>> + Send,
    E: StdError + Send + Sync + 'static,
{
    fn extract(&self, batch: Vec<u64>) -> impl Future<Output = Result<Table>> + Send {
        async move {
            let mut table = Table::default();
            for project_id in batch {
                let lookup = self
                    .cache
                    .get_or_compute(&self.kind, &project_key(project_id), |_| (self.compute)(project_id), self.force_refresh)
                    .await
                    .or_raise(|| ErrorKind::Extraction)?;
                table.append(lookup.value);
            }
            Ok(table)
        }
    }
}
