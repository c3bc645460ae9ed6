//! Batched fan-out of staging tasks.
//!
//! Two levels of back-pressure: each batch is a barrier, which bounds how many
//! task handles exist at once, and the [`ConcurrencyLimiter`] inside a batch
//! bounds how many store calls are in flight.

use crate::error::{ProbeError, ProbeResult};
use crate::limiter::ConcurrencyLimiter;
use crate::stager::BlockStager;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// One contiguous slice of the block range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based batch number.
    pub index: u64,
    /// First block index in the batch.
    pub start: u64,
    /// Number of blocks in the batch.
    pub len: u64,
}

impl Batch {
    /// One past the last block index.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end()
    }
}

/// Partition of `[0, total)` into batches of at most `batch_size` blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    total: u64,
    batch_size: u64,
}

impl BatchPlan {
    pub fn new(total: u64, batch_size: u64) -> ProbeResult<Self> {
        if batch_size == 0 {
            return Err(ProbeError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self { total, batch_size })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// `ceil(total / batch_size)`.
    pub fn batch_count(&self) -> u64 {
        self.total.div_ceil(self.batch_size)
    }

    /// Batches in order; only the last may be short.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        (0..self.batch_count()).map(move |index| {
            let start = index * self.batch_size;
            Batch {
                index,
                start,
                len: self.batch_size.min(self.total - start),
            }
        })
    }
}

/// Result of a completed staging pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagingSummary {
    pub batches: u64,
    pub staged: u64,
    pub elapsed: Duration,
}

/// Runs batches strictly one after another, fanning out inside each.
#[derive(Clone, Debug)]
pub struct BatchScheduler {
    plan: BatchPlan,
    limiter: ConcurrencyLimiter,
}

impl BatchScheduler {
    pub fn new(plan: BatchPlan, limiter: ConcurrencyLimiter) -> Self {
        Self { plan, limiter }
    }

    /// Stage every block in the plan.
    ///
    /// A batch only finishes once all of its tasks have finished. If any task
    /// failed, the first failure is returned after that barrier and no later
    /// batch starts.
    pub async fn run(&self, stager: Arc<BlockStager>) -> ProbeResult<StagingSummary> {
        let started = Instant::now();
        let batch_count = self.plan.batch_count();

        tracing::info!(
            total = self.plan.total(),
            batch_size = self.plan.batch_size(),
            concurrency = self.limiter.capacity(),
            batches = batch_count,
            "Staging blocks with a shared block id"
        );

        for batch in self.plan.batches() {
            tracing::info!(
                batch = batch.index + 1,
                of = batch_count,
                first = batch.start,
                last = batch.end() - 1,
                "Processing batch"
            );

            let mut tasks = JoinSet::new();
            for index in batch.range() {
                let limiter = self.limiter.clone();
                let stager = stager.clone();
                tasks.spawn(async move {
                    let slot = limiter.acquire().await?;
                    stager.stage(index, slot).await
                });
            }

            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                let outcome = joined
                    .map_err(|e| ProbeError::Task(e.to_string()))
                    .and_then(|staged| staged);
                if let Err(err) = outcome
                    && first_error.is_none()
                {
                    first_error = Some(err);
                }
            }

            if let Some(err) = first_error {
                tracing::error!(
                    batch = batch.index + 1,
                    staged = stager.progress().completed(),
                    error = %err,
                    "Batch failed, aborting run"
                );
                return Err(err);
            }

            tracing::info!(
                batch = batch.index + 1,
                staged = stager.progress().completed(),
                "Completed batch"
            );
        }

        Ok(StagingSummary {
            batches: batch_count,
            staged: stager.progress().completed(),
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_rejects_zero_batch_size() {
        assert!(BatchPlan::new(10, 0).is_err());
    }

    #[test]
    fn test_plan_partitions_uneven_total() {
        let plan = BatchPlan::new(101_000, 5000).unwrap();
        assert_eq!(plan.batch_count(), 21);

        let batches: Vec<_> = plan.batches().collect();
        assert_eq!(batches.len(), 21);
        assert!(batches[..20].iter().all(|b| b.len == 5000));
        assert_eq!(
            batches[20],
            Batch {
                index: 20,
                start: 100_000,
                len: 1000
            }
        );
    }

    #[test]
    fn test_plan_batches_are_contiguous_and_cover_range() {
        for (total, size) in [(1, 1), (10, 10), (10, 3), (7, 100), (0, 5)] {
            let plan = BatchPlan::new(total, size).unwrap();
            let mut next = 0;
            for batch in plan.batches() {
                assert_eq!(batch.start, next);
                assert!(batch.len > 0 && batch.len <= size);
                next = batch.end();
            }
            assert_eq!(next, total, "total={total} size={size}");
        }
    }

    #[test]
    fn test_single_batch_when_total_fits() {
        let plan = BatchPlan::new(10, 10).unwrap();
        assert_eq!(plan.batch_count(), 1);
        assert_eq!(plan.batches().next().unwrap().range(), 0..10);
    }
}
