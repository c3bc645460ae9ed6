//! The single staging-and-commit scenario.

use crate::cleanup::{CleanupReport, CleanupVerifier};
use crate::commit::{CommitAttempt, CommitOrchestrator, CommitState};
use crate::error::{Phase, ProbeError, ProbeResult};
use crate::limiter::ConcurrencyLimiter;
use crate::scheduler::{BatchPlan, BatchScheduler, StagingSummary};
use crate::stager::{BlockStager, StagingProgress};
use blockprobe_core::{BlockId, BlockPayload, ObjectName, ProbeConfig};
use blockprobe_storage::BlockStore;
use std::sync::Arc;

/// Everything a finished run observed.
#[derive(Debug)]
pub struct ScenarioReport {
    pub object: ObjectName,
    pub block_id: BlockId,
    pub staging: StagingSummary,
    /// Terminal commit state; never `UnexpectedFailure`, which is an error.
    pub commit: CommitState,
    /// Present when an over-limit rejection triggered cleanup.
    pub cleanup: Option<CleanupReport>,
}

/// Stage `total_blocks` copies of one block under one id, commit the full
/// list, and clean up if the store rejects it for exceeding its limit.
pub struct Scenario {
    store: Arc<dyn BlockStore>,
    config: ProbeConfig,
    object: ObjectName,
    block_id: BlockId,
    payload: BlockPayload,
}

impl Scenario {
    /// Build a scenario against a freshly named object.
    pub fn new(store: Arc<dyn BlockStore>, config: ProbeConfig) -> ProbeResult<Self> {
        let object = ObjectName::generate(&config.object_prefix);
        Self::for_object(store, config, object)
    }

    /// Build a scenario against a caller-chosen object.
    pub fn for_object(
        store: Arc<dyn BlockStore>,
        config: ProbeConfig,
        object: ObjectName,
    ) -> ProbeResult<Self> {
        config.validate().map_err(ProbeError::Config)?;
        let block_id = BlockId::from_label(&config.block_label)?;
        let payload = BlockPayload::random(config.block_size)?;
        Ok(Self {
            store,
            config,
            object,
            block_id,
            payload,
        })
    }

    pub async fn run(self) -> ProbeResult<ScenarioReport> {
        tracing::info!(
            backend = self.store.backend_name(),
            object = %self.object,
            block_id = %self.block_id,
            "Starting uncommitted block scenario"
        );

        let progress = Arc::new(StagingProgress::new(self.config.progress_interval));
        let stager = Arc::new(BlockStager::new(
            self.store.clone(),
            self.object.clone(),
            self.block_id.clone(),
            self.payload.clone(),
            progress,
        ));
        let scheduler = BatchScheduler::new(
            BatchPlan::new(self.config.total_blocks, self.config.batch_size)?,
            ConcurrencyLimiter::new(self.config.concurrency)?,
        );
        let staging = scheduler.run(stager).await?;
        tracing::info!(
            staged = staging.staged,
            elapsed_ms = staging.elapsed.as_millis() as u64,
            "Finished staging blocks"
        );

        let total_blocks = usize::try_from(self.config.total_blocks).map_err(|_| {
            ProbeError::Config("total_blocks exceeds platform limits".to_string())
        })?;
        let commit = CommitOrchestrator::new(
            self.store.clone(),
            self.object.clone(),
            self.block_id.clone(),
            total_blocks,
            self.config.fallback,
        )
        .run()
        .await;

        let commit = match commit {
            CommitState::UnexpectedFailure { attempt, error } => {
                return Err(ProbeError::Unclassified {
                    phase: match attempt {
                        CommitAttempt::Initial => Phase::InitialCommit,
                        CommitAttempt::Fallback => Phase::FallbackCommit,
                    },
                    source: error,
                });
            }
            state => state,
        };

        let cleanup = if commit.requires_cleanup() {
            Some(
                CleanupVerifier::new(self.store.clone(), self.object.clone())
                    .verify()
                    .await?,
            )
        } else {
            None
        };

        Ok(ScenarioReport {
            object: self.object,
            block_id: self.block_id,
            staging,
            commit,
            cleanup,
        })
    }
}
