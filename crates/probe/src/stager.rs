//! Stages one block under an admission slot and tracks completions.

use crate::error::{ProbeError, ProbeResult};
use crate::limiter::AdmissionSlot;
use blockprobe_core::{BlockId, BlockPayload, ObjectName};
use blockprobe_storage::BlockStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Count of staging calls that returned success, shared by all stagers.
#[derive(Debug)]
pub struct StagingProgress {
    completed: AtomicU64,
    report_interval: u64,
}

impl StagingProgress {
    /// `report_interval` of 0 disables progress reports.
    pub fn new(report_interval: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            report_interval,
        }
    }

    /// Record one success and return the new total.
    pub fn record(&self) -> u64 {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.report_interval > 0 && completed % self.report_interval == 0 {
            tracing::info!(staged = completed, "Staged blocks so far");
        }
        completed
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Stages copies of one payload under one block id against one object.
pub struct BlockStager {
    store: Arc<dyn BlockStore>,
    object: ObjectName,
    block_id: BlockId,
    payload: BlockPayload,
    progress: Arc<StagingProgress>,
}

impl BlockStager {
    pub fn new(
        store: Arc<dyn BlockStore>,
        object: ObjectName,
        block_id: BlockId,
        payload: BlockPayload,
        progress: Arc<StagingProgress>,
    ) -> Self {
        Self {
            store,
            object,
            block_id,
            payload,
            progress,
        }
    }

    /// Stage block `index` while holding `slot`.
    ///
    /// Each call sends its own copy of the payload. The slot is released when
    /// this returns, whatever the outcome. Failures are not retried.
    pub async fn stage(&self, index: u64, slot: AdmissionSlot) -> ProbeResult<u64> {
        let data = self.payload.fresh_copy();
        let result = self
            .store
            .stage_block(&self.object, &self.block_id, data)
            .await;
        drop(slot);

        match result {
            Ok(()) => Ok(self.progress.record()),
            Err(source) => {
                tracing::warn!(
                    index,
                    object = %self.object,
                    error = %source,
                    "Block staging failed"
                );
                Err(ProbeError::Staging { index, source })
            }
        }
    }

    pub fn progress(&self) -> &StagingProgress {
        &self.progress
    }

    pub fn object(&self) -> &ObjectName {
        &self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::ConcurrencyLimiter;
    use blockprobe_storage::MemoryBlockStore;

    fn stager(store: Arc<MemoryBlockStore>) -> BlockStager {
        BlockStager::new(
            store,
            ObjectName::generate("testblob-"),
            BlockId::from_label("sameBlockId").unwrap(),
            BlockPayload::random(64).unwrap(),
            Arc::new(StagingProgress::new(1000)),
        )
    }

    #[tokio::test]
    async fn test_stage_counts_successes() {
        let store = Arc::new(MemoryBlockStore::new());
        let stager = stager(store.clone());
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        for index in 0..3 {
            let slot = limiter.acquire().await.unwrap();
            stager.stage(index, slot).await.unwrap();
        }

        assert_eq!(stager.progress().completed(), 3);
        assert_eq!(store.uncommitted_count(stager.object()), 1);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stage_failure_is_not_counted_and_releases_slot() {
        let store = Arc::new(MemoryBlockStore::new());
        store.fail_stage_after(0);
        let stager = stager(store);
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let slot = limiter.acquire().await.unwrap();
        let err = stager.stage(7, slot).await.unwrap_err();

        assert!(matches!(err, ProbeError::Staging { index: 7, .. }));
        assert_eq!(stager.progress().completed(), 0);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn test_progress_record_returns_running_total() {
        let progress = StagingProgress::new(0);
        assert_eq!(progress.record(), 1);
        assert_eq!(progress.record(), 2);
        assert_eq!(progress.completed(), 2);
    }
}
