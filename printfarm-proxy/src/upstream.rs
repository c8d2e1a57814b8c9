//! Addresses of the endpoints a device exposes on the private network

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use printfarm_core::config::{UpstreamConfig, RESOURCE_PLACEHOLDER};
use printfarm_core::ConnectionDescriptor;
use std::time::Duration;

use crate::error::{ProxyError, ProxyResult};

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds upstream URLs for a resolved device
#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    control_path: String,
    video_path: String,
    resource_path: String,
}

impl UpstreamEndpoints {
    #[must_use]
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            control_path: config.control_path.clone(),
            video_path: config.video_path.clone(),
            resource_path: config.resource_path.clone(),
        }
    }

    /// `ws://{host}:{control_port}{control_path}`
    #[must_use]
    pub fn control_url(&self, device: &ConnectionDescriptor) -> String {
        format!(
            "ws://{}:{}{}",
            host_for_url(&device.host),
            device.control_port,
            self.control_path
        )
    }

    /// `http://{host}:{video_port}{video_path}`
    #[must_use]
    pub fn video_url(&self, device: &ConnectionDescriptor) -> String {
        format!(
            "http://{}:{}{}",
            host_for_url(&device.host),
            device.video_port,
            self.video_path
        )
    }

    /// `http://{host}:{http_port}{resource_path}` with the escaped id substituted
    pub fn resource_url(
        &self,
        device: &ConnectionDescriptor,
        resource_id: &str,
    ) -> ProxyResult<String> {
        if resource_id.is_empty() || resource_id == "." || resource_id == ".." {
            return Err(ProxyError::InvalidResource(format!(
                "'{resource_id}' is not a resource id"
            )));
        }

        let escaped = utf8_percent_encode(resource_id, PATH_SEGMENT).to_string();
        Ok(format!(
            "http://{}:{}{}",
            host_for_url(&device.host),
            device.http_port,
            self.resource_path.replace(RESOURCE_PLACEHOLDER, &escaped)
        ))
    }
}

/// HTTP client shared by video and resource sessions.
///
/// Both the connect phase and every individual read are bounded by `timeout`;
/// total transfer time is not, since video streams run indefinitely.
/// Devices live on the local network, so system proxy settings are ignored.
pub fn http_client(timeout: Duration) -> ProxyResult<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Bracket bare IPv6 literals so they can carry a port.
fn host_for_url(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}
