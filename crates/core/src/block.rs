//! Block identifiers, payload templates and commit requests.

use crate::{Error, MAX_BLOCK_ID_LEN, MAX_BLOCK_SIZE, Result};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, store-legal block identifier.
///
/// Derived deterministically from a label rather than from block content, so
/// every block staged from the same label shares one identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlockId(String);

impl BlockId {
    /// Derive an identifier from a label by base64-encoding its UTF-8 bytes.
    pub fn from_label(label: &str) -> Result<Self> {
        if label.is_empty() {
            return Err(Error::InvalidBlockId("label is empty".to_string()));
        }
        if label.len() > MAX_BLOCK_ID_LEN {
            return Err(Error::InvalidBlockId(format!(
                "label is {} bytes (max: {MAX_BLOCK_ID_LEN})",
                label.len()
            )));
        }
        Ok(Self(general_purpose::STANDARD.encode(label.as_bytes())))
    }

    /// Wrap an already-encoded identifier, checking that it is valid base64.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidBlockId(format!("not base64: {e}")))?;
        if decoded.is_empty() || decoded.len() > MAX_BLOCK_ID_LEN {
            return Err(Error::InvalidBlockId(format!(
                "decoded length {} outside 1..={MAX_BLOCK_ID_LEN}",
                decoded.len()
            )));
        }
        Ok(Self(encoded.to_string()))
    }

    /// The encoded form sent to the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only payload template that staging tasks copy from.
#[derive(Clone, Debug)]
pub struct BlockPayload {
    template: Bytes,
}

impl BlockPayload {
    /// Create a template of `size` random bytes.
    pub fn random(size: usize) -> Result<Self> {
        Self::check_size(size)?;
        let mut data = vec![0u8; size];
        rand::rng().fill_bytes(&mut data);
        Ok(Self {
            template: Bytes::from(data),
        })
    }

    /// Create a template from existing bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let template = data.into();
        Self::check_size(template.len())?;
        Ok(Self { template })
    }

    fn check_size(size: usize) -> Result<()> {
        if size == 0 || size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidBlockSize {
                size,
                max: MAX_BLOCK_SIZE,
            });
        }
        Ok(())
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.template.len()
    }

    /// Always false; empty payloads are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Allocate an independently owned copy for one staging attempt.
    ///
    /// The returned buffer never shares memory with the template or with any
    /// other copy.
    pub fn fresh_copy(&self) -> Bytes {
        Bytes::from(self.template.to_vec())
    }

    /// Borrow the template bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.template
    }
}

/// An ordered list of block identifiers submitted for commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest {
    blocks: Vec<BlockId>,
}

impl CommitRequest {
    /// A list of `count` copies of the same identifier.
    pub fn repeated(id: &BlockId, count: usize) -> Self {
        Self {
            blocks: vec![id.clone(); count],
        }
    }

    /// A list holding a single identifier.
    pub fn single(id: &BlockId) -> Self {
        Self::repeated(id, 1)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.iter()
    }
}

/// The two ways a store reports that a block list exceeds its limit.
///
/// Both describe the same logical condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// "Block count exceeds limit".
    #[default]
    CountExceedsLimit,
    /// "Block list too long".
    ListTooLong,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountExceedsLimit => f.write_str("block count exceeds limit"),
            Self::ListTooLong => f.write_str("block list too long"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_is_deterministic() {
        let a = BlockId::from_label("sameBlockId").unwrap();
        let b = BlockId::from_label("sameBlockId").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "c2FtZUJsb2NrSWQ=");
    }

    #[test]
    fn test_block_id_rejects_bad_labels() {
        assert!(BlockId::from_label("").is_err());
        assert!(BlockId::from_label(&"x".repeat(MAX_BLOCK_ID_LEN + 1)).is_err());
        assert!(BlockId::from_label(&"x".repeat(MAX_BLOCK_ID_LEN)).is_ok());
    }

    #[test]
    fn test_block_id_from_encoded() {
        let id = BlockId::from_encoded("c2FtZUJsb2NrSWQ=").unwrap();
        assert_eq!(id, BlockId::from_label("sameBlockId").unwrap());
        assert!(BlockId::from_encoded("not base64!").is_err());
        assert!(BlockId::from_encoded("").is_err());
    }

    #[test]
    fn test_fresh_copy_is_independent() {
        let payload = BlockPayload::random(1024).unwrap();
        let a = payload.fresh_copy();
        let b = payload.fresh_copy();

        assert_eq!(a.len(), 1024);
        assert_eq!(&a[..], payload.as_bytes());
        assert_eq!(a, b);
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_ne!(a.as_ptr(), payload.as_bytes().as_ptr());
    }

    #[test]
    fn test_payload_rejects_zero_size() {
        assert!(matches!(
            BlockPayload::random(0),
            Err(Error::InvalidBlockSize { size: 0, .. })
        ));
        assert!(BlockPayload::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_commit_request_shapes() {
        let id = BlockId::from_label("sameBlockId").unwrap();
        let full = CommitRequest::repeated(&id, 101_000);
        assert_eq!(full.len(), 101_000);
        assert!(full.iter().all(|b| b == &id));

        let single = CommitRequest::single(&id);
        assert_eq!(single.blocks(), std::slice::from_ref(&id));
        assert!(CommitRequest::repeated(&id, 0).is_empty());
    }

    #[test]
    fn test_limit_kind_serde() {
        let json = serde_json::to_string(&LimitKind::ListTooLong).unwrap();
        assert_eq!(json, "\"list_too_long\"");
        assert_eq!(LimitKind::default(), LimitKind::CountExceedsLimit);
    }
}
