//! Client side of the node wire contract.
//!
//! One [`NodeClient`] per node entry; clones share the underlying
//! connection pool, so handing copies to request handlers is cheap.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures_util::stream;
use reqwest::header::CONTENT_TYPE;
use reqwest::Body;

use super::protocol::{
    Empty, FileId, NodeStatus, Range, ENDPOINT_PURGE, ENDPOINT_READ, ENDPOINT_REMOVE,
    ENDPOINT_STATUS, ENDPOINT_WRITE,
};

/// HTTP client for one storage node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    base: String,
}

impl NodeClient {
    /// Builds a client for `addr`. A bare `host:port` gets the http scheme;
    /// an address that does not parse as a URL is rejected here, before any
    /// dialing starts.
    pub fn new(addr: &str) -> Result<Self> {
        let base = if addr.contains("://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr)
        };
        reqwest::Url::parse(&base).with_context(|| format!("invalid node address '{}'", addr))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base, endpoint)
    }

    /// Dial handshake and fill probe.
    pub async fn status(&self, timeout: Duration) -> Result<NodeStatus> {
        let resp = self
            .http
            .get(self.url(ENDPOINT_STATUS))
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("status request failed: {}", resp.status()));
        }
        Ok(resp.json().await?)
    }

    /// Opens a write stream. Frames are pulled lazily from the iterator and
    /// sent as a single request body, so only one frame is materialised at
    /// a time; a frame error aborts the request. Returns the raw response:
    /// the caller decodes the summary and can tell a transport failure from
    /// a bad receipt.
    pub async fn write<I>(&self, frames: I) -> Result<reqwest::Response>
    where
        I: Iterator<Item = Result<Bytes>> + Send + Sync + 'static,
    {
        let body = Body::wrap_stream(stream::iter(frames));
        let resp = self
            .http
            .post(self.url(ENDPOINT_WRITE))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("write stream refused: {}", resp.status()));
        }
        Ok(resp)
    }

    /// Reads the bytes of `range` from the node. An empty reply means the
    /// node does not know the file.
    pub async fn read(&self, range: Range) -> Result<Bytes> {
        let resp = self
            .http
            .post(self.url(ENDPOINT_READ))
            .json(&range)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "read [{}, {}) of file {} failed: {}",
                range.from,
                range.to,
                range.file_id,
                resp.status()
            ));
        }
        Ok(resp.bytes().await?)
    }

    /// Deletes one file record; returns the range the node held.
    pub async fn remove(&self, file_id: u64, timeout: Duration) -> Result<Range> {
        let resp = self
            .http
            .post(self.url(ENDPOINT_REMOVE))
            .json(&FileId { id: file_id })
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("remove of file {} failed: {}", file_id, resp.status()));
        }
        Ok(resp.json().await?)
    }

    /// Discards every record on the node.
    pub async fn purge(&self, timeout: Duration) -> Result<Empty> {
        let resp = self
            .http
            .post(self.url(ENDPOINT_PURGE))
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("purge failed: {}", resp.status()));
        }
        Ok(resp.json().await?)
    }
}
