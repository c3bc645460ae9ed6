//! Commit of the oversized block list, with one fallback attempt.
//!
//! ```text
//! NotAttempted ──ok──────────────▶ CommittedFullList
//!      │ over-limit
//!      ▼
//! RejectedOverLimit ──fallback ok / over-limit──▶ FallbackAttempted
//!      │ other error                 │ other error
//!      ▼                             ▼
//! UnexpectedFailure ◀────────────────┘
//! ```

use blockprobe_core::config::FallbackExpectation;
use blockprobe_core::{BlockId, CommitRequest, FallbackList, LimitKind, ObjectName};
use blockprobe_storage::{BlockStore, StoreError};
use std::sync::Arc;

/// Which of the two commit submissions produced an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitAttempt {
    Initial,
    Fallback,
}

/// How the fallback commit ended when it did not fail unexpectedly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackOutcome {
    Committed,
    /// Expected secondary rejection.
    RejectedAgain(LimitKind),
}

/// Commit state machine.
#[derive(Debug)]
pub enum CommitState {
    NotAttempted,
    /// The store accepted the full list. Surprising when the list is over the
    /// store's limit.
    CommittedFullList,
    RejectedOverLimit {
        kind: LimitKind,
    },
    FallbackAttempted {
        initial: LimitKind,
        fallback: FallbackList,
        outcome: FallbackOutcome,
    },
    UnexpectedFailure {
        attempt: CommitAttempt,
        error: StoreError,
    },
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CommittedFullList | Self::FallbackAttempted { .. } | Self::UnexpectedFailure { .. }
        )
    }

    /// Whether an over-limit rejection occurred, so cleanup must run.
    pub fn requires_cleanup(&self) -> bool {
        matches!(
            self,
            Self::RejectedOverLimit { .. } | Self::FallbackAttempted { .. }
        )
    }

    /// The initial over-limit rejection, if any.
    pub fn initial_rejection(&self) -> Option<LimitKind> {
        match self {
            Self::RejectedOverLimit { kind } => Some(*kind),
            Self::FallbackAttempted { initial, .. } => Some(*initial),
            _ => None,
        }
    }

    /// Whether the fallback ended the way its list choice predicts.
    pub fn fallback_matched_expectation(&self) -> Option<bool> {
        match self {
            Self::FallbackAttempted {
                fallback, outcome, ..
            } => Some(matches!(
                (fallback.expectation(), outcome),
                (FallbackExpectation::Commit, FallbackOutcome::Committed)
                    | (FallbackExpectation::Rejection, FallbackOutcome::RejectedAgain(_))
            )),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::CommittedFullList => "committed_full_list",
            Self::RejectedOverLimit { .. } => "rejected_over_limit",
            Self::FallbackAttempted { .. } => "fallback_attempted",
            Self::UnexpectedFailure { .. } => "unexpected_failure",
        }
    }
}

/// Drives the commit state machine against a store.
pub struct CommitOrchestrator {
    store: Arc<dyn BlockStore>,
    object: ObjectName,
    block_id: BlockId,
    total_blocks: usize,
    fallback: FallbackList,
}

impl CommitOrchestrator {
    pub fn new(
        store: Arc<dyn BlockStore>,
        object: ObjectName,
        block_id: BlockId,
        total_blocks: usize,
        fallback: FallbackList,
    ) -> Self {
        Self {
            store,
            object,
            block_id,
            total_blocks,
            fallback,
        }
    }

    fn full_list(&self) -> CommitRequest {
        CommitRequest::repeated(&self.block_id, self.total_blocks)
    }

    fn fallback_list(&self) -> CommitRequest {
        match self.fallback {
            FallbackList::FullList => self.full_list(),
            FallbackList::SingleBlock => CommitRequest::single(&self.block_id),
        }
    }

    /// Run transitions until a terminal state is reached.
    pub async fn run(&self) -> CommitState {
        let mut state = CommitState::NotAttempted;
        while !state.is_terminal() {
            state = self.step(state).await;
        }
        state
    }

    /// Perform the single transition out of `state`.
    ///
    /// Terminal states are returned unchanged.
    pub async fn step(&self, state: CommitState) -> CommitState {
        match state {
            CommitState::NotAttempted => {
                tracing::info!(
                    object = %self.object,
                    blocks = self.total_blocks,
                    "Committing full block list"
                );
                match self
                    .store
                    .commit_block_list(&self.object, &self.full_list())
                    .await
                {
                    Ok(()) => {
                        tracing::warn!(
                            blocks = self.total_blocks,
                            "Store accepted the full block list"
                        );
                        CommitState::CommittedFullList
                    }
                    Err(error) => match error.limit_kind() {
                        Some(kind) => {
                            tracing::info!(%kind, error = %error, "Commit rejected over limit as expected");
                            CommitState::RejectedOverLimit { kind }
                        }
                        None => {
                            tracing::error!(error = %error, "Initial commit failed unexpectedly");
                            CommitState::UnexpectedFailure {
                                attempt: CommitAttempt::Initial,
                                error,
                            }
                        }
                    },
                }
            }
            CommitState::RejectedOverLimit { kind: initial } => {
                let request = self.fallback_list();
                tracing::info!(
                    fallback = %self.fallback,
                    blocks = request.len(),
                    "Attempting fallback commit"
                );
                let outcome = match self.store.commit_block_list(&self.object, &request).await {
                    Ok(()) => FallbackOutcome::Committed,
                    Err(error) => match error.limit_kind() {
                        Some(kind) => FallbackOutcome::RejectedAgain(kind),
                        None => {
                            tracing::error!(error = %error, "Fallback commit failed unexpectedly");
                            return CommitState::UnexpectedFailure {
                                attempt: CommitAttempt::Fallback,
                                error,
                            };
                        }
                    },
                };
                let state = CommitState::FallbackAttempted {
                    initial,
                    fallback: self.fallback,
                    outcome,
                };
                match outcome {
                    FallbackOutcome::Committed => {
                        tracing::info!(blocks = request.len(), "Fallback commit succeeded")
                    }
                    FallbackOutcome::RejectedAgain(kind) => {
                        tracing::info!(%kind, "Fallback commit rejected over limit")
                    }
                }
                if state.fallback_matched_expectation() == Some(false) {
                    tracing::warn!(
                        fallback = %self.fallback,
                        ?outcome,
                        "Fallback outcome differs from the expectation for this list choice"
                    );
                }
                state
            }
            terminal => terminal,
        }
    }
}
