use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::feed::fetcher::FetchWorker;
use crate::storage::{ClaimedFeed, Database, StoreError};

pub const DEFAULT_WORKERS: usize = 4;

/// Per-cycle tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// New posts stored across the whole batch
    pub inserted: usize,
}

/// What a finished run loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub aborted_cycles: u64,
    pub inserted: usize,
}

/// Drives the aggregation loop.
///
/// Every tick claims up to `workers` of the least recently fetched feeds and
/// fans them out with `buffer_unordered(workers)`, so the claim size and the
/// number of simultaneous fetches share one bound.
pub struct FeedScheduler {
    db: Database,
    worker: FetchWorker,
    interval: Duration,
    workers: usize,
}

impl FeedScheduler {
    /// `workers` below 1 is raised to 1; a zero interval to 1ms.
    pub fn new(db: Database, worker: FetchWorker, interval: Duration, workers: usize) -> Self {
        Self {
            db,
            worker,
            interval: interval.max(Duration::from_millis(1)),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Claim the next `limit` feeds due for a refresh.
    pub async fn next_batch(&self, limit: usize) -> Result<Vec<ClaimedFeed>, StoreError> {
        self.db.claim_next_feeds(limit).await
    }

    /// Claim one batch, fetch it and wait for every unit to finish.
    ///
    /// Network and parse failures stay with their feed and are counted in
    /// `failed`. A store failure aborts the cycle: the remaining units are
    /// dropped and the error is returned.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let batch = self.next_batch(self.workers).await?;
        let mut report = CycleReport {
            claimed: batch.len(),
            ..CycleReport::default()
        };

        if batch.is_empty() {
            tracing::debug!("No feeds to fetch");
            return Ok(report);
        }

        tracing::debug!(claimed = batch.len(), "Claimed feeds");

        let mut outcomes = stream::iter(batch.iter())
            .map(|feed| self.worker.process(feed))
            .buffer_unordered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            match outcome.result {
                Ok(ingest) => {
                    report.succeeded += 1;
                    report.inserted += ingest.inserted;
                }
                Err(Error::Store(e)) => {
                    tracing::error!(feed_id = outcome.feed_id, error = %e, "Store failure, aborting cycle");
                    return Err(e);
                }
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }

    /// Run cycles on the interval until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        self.run_loop(None, shutdown).await
    }

    /// Like [`FeedScheduler::run`] but stops after `cycles` cycles.
    pub async fn run_cycles(&self, cycles: u64, shutdown: CancellationToken) -> RunSummary {
        self.run_loop(Some(cycles), shutdown).await
    }

    async fn run_loop(&self, max_cycles: Option<u64>, shutdown: CancellationToken) -> RunSummary {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow cycle pushes the schedule back rather than bunching ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = RunSummary::default();

        tracing::info!(
            interval = ?self.interval,
            workers = self.workers,
            "Collecting feeds"
        );

        loop {
            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(report) => {
                    summary.inserted += report.inserted;
                    tracing::info!(
                        claimed = report.claimed,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        inserted = report.inserted,
                        "Cycle complete"
                    );
                }
                Err(e) => {
                    summary.aborted_cycles += 1;
                    tracing::warn!(error = %e, "Cycle aborted, retrying on next tick");
                }
            }
            summary.cycles += 1;
        }

        tracing::info!(
            cycles = summary.cycles,
            aborted = summary.aborted_cycles,
            inserted = summary.inserted,
            "Collector stopped"
        );
        summary
    }
}
