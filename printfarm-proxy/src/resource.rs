//! Buffer-and-forward fetch of a single device resource
//!
//! The whole body is read before anything is returned, so a device that
//! stalls or resets mid-transfer yields an error instead of a truncated
//! response.

use bytes::Bytes;
use printfarm_core::metrics;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use crate::error::{ProxyError, ProxyResult};
use crate::session::SessionTracker;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A fully downloaded upstream resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ResourceFetcher {
    #[must_use]
    pub const fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Download `url` completely within the configured timeout.
    pub async fn fetch(&self, url: &str, mut tracker: SessionTracker) -> ProxyResult<FetchedResource> {
        let span = tracker.span();
        let result = self.download(url).instrument(span).await;
        match &result {
            Ok(resource) => {
                metrics::resource::BYTES_FETCHED.inc_by(resource.body.len() as u64);
                tracker.set_outcome("completed");
            }
            Err(e) => {
                warn!(session_id = tracker.session_id(), url, error = %e, "Resource fetch failed");
                tracker.set_outcome(e.outcome());
            }
        }
        result
    }

    async fn download(&self, url: &str) -> ProxyResult<FetchedResource> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("Could not retrieve {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::UpstreamStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let body = response.bytes().await.map_err(|e| {
            ProxyError::UpstreamUnreachable(format!("Transfer of {url} interrupted: {e}"))
        })?;

        debug!(url, bytes = body.len(), content_type = %content_type, "Resource fetched");
        Ok(FetchedResource { content_type, body })
    }
}
