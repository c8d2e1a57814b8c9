use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::models::{ConnectionDescriptor, DeviceId};

/// Placeholder substituted with the resource id in `upstream.resource_path`.
pub const RESOURCE_PLACEHOLDER: &str = "{resource}";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub proxy: ProxyConfig,
    pub upstream: UpstreamConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Directory holding the built frontend, served at `/` when present.
    pub static_dir: Option<String>,
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8000,
            static_dir: Some("static".to_string()),
            cors_allow_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Limits applied to every proxy session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Connect/read timeout for upstream HTTP, and connect timeout for control sockets
    pub upstream_timeout_seconds: u64,
    /// Hard cap on bytes held while waiting for an end-of-image marker
    pub max_frame_buffer_bytes: usize,
    pub multipart_boundary: String,
    /// How long to wait for close handshakes once a relay session ends
    pub control_close_timeout_seconds: u64,
    pub max_control_message_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_seconds: 30,
            max_frame_buffer_bytes: 8 * 1024 * 1024,
            multipart_boundary: "foo".to_string(),
            control_close_timeout_seconds: 5,
            max_control_message_bytes: 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    #[must_use]
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }

    #[must_use]
    pub const fn control_close_timeout(&self) -> Duration {
        Duration::from_secs(self.control_close_timeout_seconds)
    }
}

/// Paths of the endpoints exposed by the device firmware
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub control_path: String,
    pub video_path: String,
    pub resource_path: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            control_path: "/websocket".to_string(),
            video_path: "/video".to_string(),
            resource_path: format!("/board-resource/history_image/{RESOURCE_PLACEHOLDER}.png"),
        }
    }
}

/// Where device connection descriptors come from
///
/// When `url` is set the external registry service is queried per session,
/// otherwise `devices` is used as a read-only table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: Option<String>,
    pub timeout_seconds: u64,
    pub devices: Vec<DeviceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: 5,
            devices: vec![DeviceConfig::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    pub control_port: u16,
    pub http_port: u16,
    pub video_port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "a1b2c3d4-e5f6-7890-1234-567890abcdef".to_string(),
            name: Some("Elegoo Centauri Alpha".to_string()),
            host: "192.168.1.100".to_string(),
            control_port: 8000,
            http_port: 80,
            video_port: 8080,
        }
    }
}

impl From<&DeviceConfig> for ConnectionDescriptor {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            id: DeviceId::from_string(device.id.clone()),
            host: device.host.clone(),
            control_port: device.control_port,
            http_port: device.http_port,
            video_port: device.video_port,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `PRINTFARM_SERVER__HTTP_PORT=9000`.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PRINTFARM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check the configuration for values the proxy cannot run with.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }

        if self.proxy.upstream_timeout_seconds == 0 {
            errors.push("proxy.upstream_timeout_seconds must be non-zero".to_string());
        }
        if self.proxy.max_frame_buffer_bytes < 1024 {
            errors.push("proxy.max_frame_buffer_bytes must be at least 1024".to_string());
        }
        if self.proxy.max_control_message_bytes == 0 {
            errors.push("proxy.max_control_message_bytes must be non-zero".to_string());
        }
        if let Err(e) = validate_boundary(&self.proxy.multipart_boundary) {
            errors.push(format!("proxy.multipart_boundary {e}"));
        }

        for (key, path) in [
            ("upstream.control_path", &self.upstream.control_path),
            ("upstream.video_path", &self.upstream.video_path),
            ("upstream.resource_path", &self.upstream.resource_path),
        ] {
            if !path.starts_with('/') {
                errors.push(format!("{key} must start with '/'"));
            }
        }
        if !self.upstream.resource_path.contains(RESOURCE_PLACEHOLDER) {
            errors.push(format!(
                "upstream.resource_path must contain the {RESOURCE_PLACEHOLDER} placeholder"
            ));
        }

        if let Some(url) = &self.registry.url {
            match url::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(format!(
                    "registry.url has unsupported scheme '{}'",
                    parsed.scheme()
                )),
                Err(e) => errors.push(format!("registry.url is invalid: {e}")),
            }
        }

        let mut seen = HashSet::new();
        for device in &self.registry.devices {
            if device.id.trim().is_empty() {
                errors.push("registry.devices entry has an empty id".to_string());
            } else if !seen.insert(device.id.as_str()) {
                errors.push(format!("registry.devices has duplicate id '{}'", device.id));
            }
            if device.host.trim().is_empty() {
                errors.push(format!("device '{}' has an empty host", device.id));
            }
            if device.control_port == 0 || device.http_port == 0 || device.video_port == 0 {
                errors.push(format!("device '{}' has a zero port", device.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// RFC 2046 boundary: 1..=70 characters from the `bchars` set, not ending in a space.
fn validate_boundary(boundary: &str) -> Result<(), &'static str> {
    if boundary.is_empty() || boundary.len() > 70 {
        return Err("must be 1 to 70 characters long");
    }
    if boundary.ends_with(' ') {
        return Err("must not end with a space");
    }
    let valid = boundary.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b)
    });
    if valid {
        Ok(())
    } else {
        Err("contains characters not allowed in a multipart boundary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.proxy.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(config.proxy.multipart_boundary, "foo");
        assert_eq!(config.registry.devices.len(), 1);
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 9000,
                ..ServerConfig::default()
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.server.http_port = 0;
        config.proxy.max_frame_buffer_bytes = 10;
        config.upstream.resource_path = "/images/latest.png".to_string();
        config.registry.url = Some("ftp://registry.local".to_string());
        config.registry.devices.push(DeviceConfig::default());

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("duplicate id")));
        assert!(errors.iter().any(|e| e.contains("{resource}")));
    }

    #[test]
    fn test_boundary_rules() {
        assert!(validate_boundary("foo").is_ok());
        assert!(validate_boundary("frame-boundary_01").is_ok());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary("bad\r\nboundary").is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary(&"x".repeat(71)).is_err());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
server:
  http_port: 9100
proxy:
  max_frame_buffer_bytes: 65536
registry:
  devices:
    - id: bench-printer
      host: 10.0.0.7
      control_port: 3030
      http_port: 3031
      video_port: 3032
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.http_port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.proxy.max_frame_buffer_bytes, 65536);
        assert_eq!(config.proxy.upstream_timeout_seconds, 30);
        assert_eq!(config.registry.devices.len(), 1);
        assert_eq!(config.registry.devices[0].id, "bench-printer");
        assert_eq!(config.registry.devices[0].name, None);
    }

    #[test]
    fn test_device_config_into_descriptor() {
        let descriptor = ConnectionDescriptor::from(&DeviceConfig::default());

        assert_eq!(descriptor.id.as_str(), "a1b2c3d4-e5f6-7890-1234-567890abcdef");
        assert_eq!(descriptor.host, "192.168.1.100");
        assert_eq!(descriptor.control_port, 8000);
        assert_eq!(descriptor.http_port, 80);
        assert_eq!(descriptor.video_port, 8080);
    }
}
