use async_trait::async_trait;
use std::collections::HashMap;

use super::DeviceRegistry;
use crate::config::DeviceConfig;
use crate::models::{ConnectionDescriptor, DeviceId};
use crate::Result;

/// Registry backed by a fixed table, typically loaded from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceRegistry {
    devices: HashMap<DeviceId, ConnectionDescriptor>,
}

impl StaticDeviceRegistry {
    #[must_use]
    pub fn new(descriptors: impl IntoIterator<Item = ConnectionDescriptor>) -> Self {
        Self {
            devices: descriptors
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        }
    }

    #[must_use]
    pub fn from_devices(devices: &[DeviceConfig]) -> Self {
        Self::new(devices.iter().map(ConnectionDescriptor::from))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DeviceRegistry for StaticDeviceRegistry {
    async fn lookup(&self, id: &DeviceId) -> Result<Option<ConnectionDescriptor>> {
        Ok(self.devices.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, host: &str) -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: DeviceId::from(id),
            host: host.to_string(),
            control_port: 3030,
            http_port: 3031,
            video_port: 3032,
        }
    }

    #[tokio::test]
    async fn test_lookup_known_and_unknown() {
        let registry = StaticDeviceRegistry::new([
            descriptor("left", "10.0.0.1"),
            descriptor("right", "10.0.0.2"),
        ]);

        assert_eq!(registry.len(), 2);
        let right = registry.lookup(&DeviceId::from("right")).await.unwrap();
        assert_eq!(right.unwrap().host, "10.0.0.2");
        assert!(registry
            .lookup(&DeviceId::from("middle"))
            .await
            .unwrap()
            .is_none());
    }
}
