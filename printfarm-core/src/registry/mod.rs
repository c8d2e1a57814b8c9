//! Device registry client side
//!
//! The registry that owns device records is an external collaborator. The
//! proxy only ever asks it one question: where does this device live?

mod http;
mod static_table;

pub use http::HttpDeviceRegistry;
pub use static_table::StaticDeviceRegistry;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::models::{ConnectionDescriptor, DeviceId};
use crate::Result;

/// Read-only view of the device registry
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Resolve a device id to its connection descriptor.
    ///
    /// `Ok(None)` means the registry does not know the device. `Err` is
    /// reserved for the registry itself being unreachable or misbehaving.
    async fn lookup(&self, id: &DeviceId) -> Result<Option<ConnectionDescriptor>>;
}

/// Build the registry backend selected by configuration.
pub fn from_config(config: &RegistryConfig) -> Result<Arc<dyn DeviceRegistry>> {
    match &config.url {
        Some(url) => Ok(Arc::new(HttpDeviceRegistry::new(
            url,
            std::time::Duration::from_secs(config.timeout_seconds),
        )?)),
        None => Ok(Arc::new(StaticDeviceRegistry::from_devices(&config.devices))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[tokio::test]
    async fn test_from_config_without_url_uses_static_table() {
        let config = RegistryConfig {
            url: None,
            timeout_seconds: 5,
            devices: vec![DeviceConfig::default()],
        };

        let registry = from_config(&config).unwrap();
        let found = registry
            .lookup(&DeviceId::from("a1b2c3d4-e5f6-7890-1234-567890abcdef"))
            .await
            .unwrap();

        assert_eq!(found.map(|d| d.video_port), Some(8080));
    }

    #[test]
    fn test_from_config_rejects_invalid_url() {
        let config = RegistryConfig {
            url: Some("not a url".to_string()),
            ..RegistryConfig::default()
        };

        assert!(from_config(&config).is_err());
    }
}
