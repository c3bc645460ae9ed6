//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),

    #[error("invalid block size: {size} (must be between 1 and {max})")]
    InvalidBlockSize { size: usize, max: usize },

    #[error("invalid object name: {0}")]
    InvalidObjectName(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
