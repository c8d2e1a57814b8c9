use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::time::Duration;

use super::DeviceRegistry;
use crate::models::{ConnectionDescriptor, DeviceId};
use crate::{Error, Result};

/// Unreserved characters stay as-is in a path segment, everything else is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Printer record as served by the registry's REST API
#[derive(Debug, Deserialize)]
struct PrinterRecord {
    id: String,
    ip_address: String,
    websocket_port: u16,
    http_port: u16,
    video_port: u16,
}

impl From<PrinterRecord> for ConnectionDescriptor {
    fn from(record: PrinterRecord) -> Self {
        Self {
            id: DeviceId::from_string(record.id),
            host: record.ip_address,
            control_port: record.websocket_port,
            http_port: record.http_port,
            video_port: record.video_port,
        }
    }
}

/// Registry client querying `GET {base_url}/api/printers/{id}`
#[derive(Debug, Clone)]
pub struct HttpDeviceRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid registry URL '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn record_url(&self, id: &DeviceId) -> String {
        format!(
            "{}/api/printers/{}",
            self.base_url,
            utf8_percent_encode(id.as_str(), PATH_SEGMENT)
        )
    }
}

#[async_trait]
impl DeviceRegistry for HttpDeviceRegistry {
    async fn lookup(&self, id: &DeviceId) -> Result<Option<ConnectionDescriptor>> {
        let response = self.client.get(self.record_url(id)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::RegistryUnavailable(format!(
                "Registry returned status {status}"
            )));
        }

        let record: PrinterRecord = response.json().await?;
        Ok(Some(record.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry(server: &MockServer) -> HttpDeviceRegistry {
        HttpDeviceRegistry::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_maps_printer_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/printers/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p-1",
                "name": "Garage printer",
                "location": "Garage",
                "ip_address": "192.168.128.143",
                "websocket_port": 3030,
                "http_port": 3031,
                "video_port": 3032
            })))
            .expect(1)
            .mount(&server)
            .await;

        let descriptor = registry(&server)
            .lookup(&DeviceId::from("p-1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(descriptor.id.as_str(), "p-1");
        assert_eq!(descriptor.host, "192.168.128.143");
        assert_eq!(descriptor.control_port, 3030);
        assert_eq!(descriptor.http_port, 3031);
        assert_eq!(descriptor.video_port, 3032);
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = registry(&server).lookup(&DeviceId::from("ghost")).await;

        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_lookup_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = registry(&server).lookup(&DeviceId::from("p-1")).await;

        assert!(matches!(result, Err(Error::RegistryUnavailable(_))));
    }

    #[test]
    fn test_record_url_escapes_id() {
        let registry =
            HttpDeviceRegistry::new("http://registry.local:8000/", Duration::from_secs(1)).unwrap();

        assert_eq!(
            registry.record_url(&DeviceId::from("a/b c")),
            "http://registry.local:8000/api/printers/a%2Fb%20c"
        );
    }
}
