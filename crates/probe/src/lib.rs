//! Harness probing how a block store behaves when the number of staged,
//! uncommitted blocks for one object exceeds the store's limit.
//!
//! The pipeline:
//! - [`scheduler::BatchScheduler`] splits the block range into batches and
//!   fans out one staging task per block, with a barrier per batch
//! - [`limiter::ConcurrencyLimiter`] caps in-flight store calls
//! - [`stager::BlockStager`] stages one private payload copy per task
//! - [`commit::CommitOrchestrator`] commits the oversized list and drives a
//!   fallback on an over-limit rejection
//! - [`cleanup::CleanupVerifier`] deletes the object and checks it is gone

pub mod cleanup;
pub mod commit;
pub mod error;
pub mod limiter;
pub mod scenario;
pub mod scheduler;
pub mod stager;

pub use cleanup::{
    CleanupReport, CleanupVerifier, DeleteMode, DeleteOutcome, Residual, ResidualStateWarning,
};
pub use commit::{CommitAttempt, CommitOrchestrator, CommitState, FallbackOutcome};
pub use error::{Phase, ProbeError, ProbeResult};
pub use limiter::{AdmissionSlot, ConcurrencyLimiter};
pub use scenario::{Scenario, ScenarioReport};
pub use scheduler::{Batch, BatchPlan, BatchScheduler, StagingSummary};
pub use stager::{BlockStager, StagingProgress};
