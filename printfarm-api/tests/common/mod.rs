// Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use axum::Router;
use printfarm_api::{create_router, AppState};
use printfarm_core::{Config, ConnectionDescriptor, DeviceId, DeviceRegistry};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// In-memory registry that counts how often it is asked
#[derive(Default)]
pub struct CountingRegistry {
    devices: HashMap<String, ConnectionDescriptor>,
    lookups: AtomicUsize,
    unavailable: bool,
}

impl CountingRegistry {
    pub fn with(devices: Vec<ConnectionDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            devices: devices
                .into_iter()
                .map(|d| (d.id.as_str().to_string(), d))
                .collect(),
            ..Self::default()
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Self::default()
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for CountingRegistry {
    async fn lookup(&self, id: &DeviceId) -> printfarm_core::Result<Option<ConnectionDescriptor>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(printfarm_core::Error::RegistryUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(self.devices.get(id.as_str()).cloned())
    }
}

pub fn device(id: &str, control_port: u16, http_port: u16, video_port: u16) -> ConnectionDescriptor {
    ConnectionDescriptor {
        id: DeviceId::from(id),
        host: "127.0.0.1".to_string(),
        control_port,
        http_port,
        video_port,
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.static_dir = None;
    config.proxy.upstream_timeout_seconds = 2;
    config.proxy.control_close_timeout_seconds = 1;
    config
}

pub fn router(registry: Arc<CountingRegistry>) -> Router {
    router_with(registry, &test_config(), CancellationToken::new())
}

pub fn router_with(
    registry: Arc<CountingRegistry>,
    config: &Config,
    shutdown: CancellationToken,
) -> Router {
    let state = AppState::new(config, registry, shutdown).unwrap();
    create_router(state, &config.server)
}

/// Run `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Run `router` with graceful shutdown tied to `shutdown`.
pub async fn serve_until(
    router: Router,
    shutdown: CancellationToken,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .unwrap();
    });
    (addr, server)
}

/// A local port nothing listens on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
