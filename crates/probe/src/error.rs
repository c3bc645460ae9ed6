//! Probe error types.

use blockprobe_storage::StoreError;
use std::fmt;
use thiserror::Error;

/// Pipeline phase a store error surfaced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    InitialCommit,
    FallbackCommit,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialCommit => f.write_str("initial commit"),
            Self::FallbackCommit => f.write_str("fallback commit"),
            Self::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Errors that abort a probe run.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("staging block {index} failed: {source}")]
    Staging {
        index: u64,
        #[source]
        source: StoreError,
    },

    #[error("staging task failed: {0}")]
    Task(String),

    #[error("concurrency limiter closed")]
    LimiterClosed,

    /// A store failure with no built-in recovery.
    #[error("unclassified store error during {phase}: {source}")]
    Unclassified {
        phase: Phase,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Core(#[from] blockprobe_core::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for probe operations.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
