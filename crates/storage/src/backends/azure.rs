//! Azure Blob Storage backend over the block blob REST API.
//!
//! The backend is handed a container URL that is already authorized (a SAS
//! query string, typically). It never constructs or inspects credentials; it
//! only appends the blob name and the per-operation query parameters.

use crate::error::{ErrorCode, StoreError, StoreResult};
use crate::traits::BlockStore;
use async_trait::async_trait;
use blockprobe_core::{BlockId, CommitRequest, ObjectName};
use bytes::Bytes;
use reqwest::{Method, StatusCode, Url};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::instrument;

/// REST API version sent when none is configured.
pub const DEFAULT_API_VERSION: &str = "2024-11-04";

const VERSION_HEADER: &str = "x-ms-version";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const DELETE_SNAPSHOTS_HEADER: &str = "x-ms-delete-snapshots";
const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Largest response body kept in an error message.
const MAX_ERROR_BODY: usize = 2048;

/// Block blob store reached through a pre-authorized container URL.
pub struct AzureBlobBackend {
    http: reqwest::Client,
    container_url: Url,
    api_version: String,
}

impl std::fmt::Debug for AzureBlobBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The query string is a credential; only show where it points.
        f.debug_struct("AzureBlobBackend")
            .field("host", &self.container_url.host_str())
            .field("container", &self.container_url.path())
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AzureBlobBackend {
    /// Create a backend for the container at `container_url`.
    ///
    /// `timeout` bounds each request; `None` leaves requests unbounded.
    pub fn new(
        container_url: &str,
        api_version: Option<String>,
        timeout: Option<Duration>,
    ) -> StoreResult<Self> {
        let container_url = Url::parse(container_url)
            .map_err(|e| StoreError::Config(format!("invalid container URL: {e}")))?;
        if container_url.cannot_be_a_base() {
            return Err(StoreError::Config(
                "container URL cannot be used as a base".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            container_url,
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        })
    }

    /// URL of a blob inside the container, keeping the container's query.
    fn blob_url(&self, object: &ObjectName) -> StoreResult<Url> {
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("container URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(object.as_str().split('/'));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(VERSION_HEADER, &self.api_version)
    }

    /// Turn a non-success response into a classified store error.
    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = response
            .headers()
            .get(ERROR_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ErrorCode::from_code)
            .unwrap_or_else(|| match status {
                StatusCode::NOT_FOUND => ErrorCode::BlobNotFound,
                other => ErrorCode::Other(format!("Http{}", other.as_u16())),
            });
        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }

        Err(StoreError::service(code, status.as_u16(), message))
    }
}

/// Render the XML body of a Put Block List request.
pub fn block_list_xml(blocks: &CommitRequest) -> String {
    // Base64 ids never contain XML metacharacters.
    let mut xml = String::with_capacity(64 + blocks.len() * 40);
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in blocks.iter() {
        let _ = write!(xml, "<Latest>{id}</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

#[async_trait]
impl BlockStore for AzureBlobBackend {
    #[instrument(skip(self, data), fields(backend = "azure", size = data.len()))]
    async fn stage_block(
        &self,
        object: &ObjectName,
        block_id: &BlockId,
        data: Bytes,
    ) -> StoreResult<()> {
        let mut url = self.blob_url(object)?;
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", block_id.as_str());

        let response = self.request(Method::PUT, url).body(data).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, blocks), fields(backend = "azure", blocks = blocks.len()))]
    async fn commit_block_list(
        &self,
        object: &ObjectName,
        blocks: &CommitRequest,
    ) -> StoreResult<()> {
        let mut url = self.blob_url(object)?;
        url.query_pairs_mut().append_pair("comp", "blocklist");

        let response = self
            .request(Method::PUT, url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(block_list_xml(blocks))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "azure"))]
    async fn delete(&self, object: &ObjectName, include_snapshots: bool) -> StoreResult<()> {
        let url = self.blob_url(object)?;
        let mut request = self.request(Method::DELETE, url);
        if include_snapshots {
            request = request.header(DELETE_SNAPSHOTS_HEADER, "include");
        }

        let response = request.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "azure"))]
    async fn exists(&self, object: &ObjectName) -> StoreResult<bool> {
        let url = self.blob_url(object)?;
        let response = self.request(Method::HEAD, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = Self::check(response).await?;
        if let Some(blob_type) = response.headers().get(BLOB_TYPE_HEADER) {
            tracing::debug!(object = %object, blob_type = ?blob_type, "Object exists");
        }
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "azure"
    }

    /// Read the container's properties to confirm the URL and its
    /// authorization are accepted before any block is staged.
    #[instrument(skip(self), fields(backend = "azure"))]
    async fn health_check(&self) -> StoreResult<()> {
        let mut url = self.container_url.clone();
        url.query_pairs_mut().append_pair("restype", "container");

        let response = self.request(Method::HEAD, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
