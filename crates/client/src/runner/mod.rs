//! Queue runner: claim, probe, invalidate, record.
//!
//! Every claimed entry goes through the same three steps, whatever the
//! strategy:
//!
//! 1. probe the cache URL once
//! 2. if the status is anything but exactly `200`, flush the page tag and
//!    remove the URL entry from the static cache
//! 3. record the status on the queue row
//!
//! Probe failures are data (status 900). Store and cache errors abort the run.

mod context;

pub use context::RunContext;
pub use sfc_core::RunStrategy;

use crate::probe::Probe;
use sfc_core::{CacheInvalidator, DEFAULT_BATCH_LIMIT, Error, QueueEntry, QueueStore};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Fresh,
    Invalidated,
    /// Not started before the deadline; returned to pending.
    Released,
}

#[derive(Debug, Default)]
struct RunTally {
    fresh: usize,
    invalidated: usize,
    released: usize,
}

impl RunTally {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Fresh => self.fresh += 1,
            EntryOutcome::Invalidated => self.invalidated += 1,
            EntryOutcome::Released => self.released += 1,
        }
    }
}

/// Processes pending queue entries.
#[derive(Clone)]
pub struct QueueRunner {
    store: QueueStore,
    probe: Arc<dyn Probe>,
    invalidator: CacheInvalidator,
}

impl QueueRunner {
    pub fn new(store: QueueStore, probe: Arc<dyn Probe>, invalidator: CacheInvalidator) -> Self {
        Self { store, probe, invalidator }
    }

    /// Process up to `limit` pending entries (`0` means the default of 999).
    ///
    /// Entries are claimed before probing, so overlapping runs never handle
    /// the same row. Completed rows are left for [`sfc_core::QueueAdmin::cleanup`].
    pub async fn run(&self, ctx: &RunContext, limit: usize) -> Result<(), Error> {
        let limit = if limit == 0 { DEFAULT_BATCH_LIMIT } else { limit };

        let entries = self.store.claim_pending(limit).await?;
        if entries.is_empty() {
            tracing::debug!("no pending queue entries");
            return Ok(());
        }

        let claimed = entries.len();
        let ids: Vec<i64> = entries.iter().map(|entry| entry.id).collect();
        let outcome = match ctx.strategy() {
            RunStrategy::Sequential => self.run_sequential(ctx, &entries).await,
            RunStrategy::Concurrent { max_in_flight } => self.run_concurrent(ctx, entries, max_in_flight).await,
        };
        let tally = match outcome {
            Ok(tally) => tally,
            Err(e) => {
                self.release_unfinished(&ids).await;
                return Err(e);
            }
        };

        if tally.released > 0 {
            tracing::warn!(released = tally.released, "run deadline reached, unstarted entries released");
        }
        tracing::info!(
            claimed,
            fresh = tally.fresh,
            invalidated = tally.invalidated,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "queue run finished"
        );

        Ok(())
    }

    async fn run_sequential(&self, ctx: &RunContext, entries: &[QueueEntry]) -> Result<RunTally, Error> {
        let mut tally = RunTally::default();
        for (index, entry) in entries.iter().enumerate() {
            if ctx.is_expired() {
                for rest in &entries[index..] {
                    self.store.release_claim(rest.id).await?;
                    tally.record(EntryOutcome::Released);
                }
                break;
            }
            tally.record(self.process(ctx, entry).await?);
        }
        Ok(tally)
    }

    async fn run_concurrent(
        &self, ctx: &RunContext, entries: Vec<QueueEntry>, max_in_flight: usize,
    ) -> Result<RunTally, Error> {
        let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut join_set = JoinSet::new();

        for entry in entries {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::TaskFailed(e.to_string()))?;
            let runner = self.clone();
            let ctx = ctx.clone();

            join_set.spawn(async move {
                // NOTE: Hold permit for task duration to enforce concurrency limit
                let _permit = permit;
                if ctx.is_expired() {
                    runner.store.release_claim(entry.id).await?;
                    return Ok(EntryOutcome::Released);
                }
                runner.process(&ctx, &entry).await
            });
        }

        let mut tally = RunTally::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => tally.record(outcome),
                Ok(Err(e)) => {
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    join_set.shutdown().await;
                    return Err(Error::TaskFailed(e.to_string()));
                }
            }
        }
        Ok(tally)
    }

    /// Return every claim of an aborted run that has no recorded result.
    ///
    /// Completed rows are untouched, since only in-flight rows are released.
    async fn release_unfinished(&self, ids: &[i64]) {
        let mut released = 0usize;
        for &id in ids {
            match self.store.release_claim(id).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(id, error = %e, "failed to release claim after aborted run");
                }
            }
        }
        if released > 0 {
            tracing::warn!(released, "run aborted, unfinished entries released");
        }
    }

    async fn process(&self, ctx: &RunContext, entry: &QueueEntry) -> Result<EntryOutcome, Error> {
        let result = self.probe.fetch(ctx, &entry.cache_url).await;

        let outcome = if result.is_fresh() {
            EntryOutcome::Fresh
        } else {
            tracing::debug!(
                id = entry.id,
                url = %entry.cache_url,
                status = result.status_code,
                "stale cache entry, invalidating"
            );
            self.invalidator.invalidate_page(entry.page_id).await?;
            self.invalidator.invalidate_url(&entry.cache_url).await?;
            EntryOutcome::Invalidated
        };

        self.store.record_result(entry.id, &result.result_code()).await?;
        Ok(outcome)
    }
}
