//! Storage error types.

use blockprobe_core::LimitKind;
use std::fmt;
use thiserror::Error;

/// Error codes a block store can return, as a closed set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BlockCountExceedsLimit,
    BlockListTooLong,
    BlobNotFound,
    InvalidBlockList,
    InvalidBlockId,
    SnapshotsPresent,
    /// Any code outside the set above, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// Parse the store's textual error code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "BlockCountExceedsLimit" => Self::BlockCountExceedsLimit,
            "BlockListTooLong" => Self::BlockListTooLong,
            "BlobNotFound" => Self::BlobNotFound,
            "InvalidBlockList" => Self::InvalidBlockList,
            "InvalidBlockId" => Self::InvalidBlockId,
            "SnapshotsPresent" => Self::SnapshotsPresent,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::BlockCountExceedsLimit => "BlockCountExceedsLimit",
            Self::BlockListTooLong => "BlockListTooLong",
            Self::BlobNotFound => "BlobNotFound",
            Self::InvalidBlockList => "InvalidBlockList",
            Self::InvalidBlockId => "InvalidBlockId",
            Self::SnapshotsPresent => "SnapshotsPresent",
            Self::Other(code) => code,
        }
    }

    /// Map the over-limit codes onto their logical condition.
    pub fn limit_kind(&self) -> Option<LimitKind> {
        match self {
            Self::BlockCountExceedsLimit => Some(LimitKind::CountExceedsLimit),
            Self::BlockListTooLong => Some(LimitKind::ListTooLong),
            _ => None,
        }
    }
}

impl From<LimitKind> for ErrorCode {
    fn from(kind: LimitKind) -> Self {
        match kind {
            LimitKind::CountExceedsLimit => Self::BlockCountExceedsLimit,
            LimitKind::ListTooLong => Self::BlockListTooLong,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected request ({code}, status {status}): {message}")]
    Service {
        code: ErrorCode,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("injected fault: {0}")]
    Injected(String),
}

impl StoreError {
    /// Build a service error from a code.
    pub fn service(code: ErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            code,
            status,
            message: message.into(),
        }
    }

    /// The store's error code, if the store answered at all.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The over-limit classification, if this is one.
    pub fn limit_kind(&self) -> Option<LimitKind> {
        self.code().and_then(ErrorCode::limit_kind)
    }

    /// Whether the target object did not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Service { code, status, .. } => *code == ErrorCode::BlobNotFound || *status == 404,
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
