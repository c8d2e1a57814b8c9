// Module: http
// REST and WebSocket routes fronting the printers

pub mod control;
pub mod devices;
pub mod error;
pub mod frontend;
pub mod health;

use axum::{http::HeaderValue, routing::get, Router};
use printfarm_core::config::{Config, ProxyConfig, ServerConfig};
use printfarm_core::metrics::REGISTRY_LOOKUPS_TOTAL;
use printfarm_core::{ConnectionDescriptor, DeviceId, DeviceRegistry};
use printfarm_proxy::{
    upstream, ProxyResult, ResourceFetcher, UpstreamEndpoints, VideoStreamProxy,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn DeviceRegistry>,
    pub endpoints: Arc<UpstreamEndpoints>,
    pub video: Arc<VideoStreamProxy>,
    pub fetcher: Arc<ResourceFetcher>,
    pub proxy: Arc<ProxyConfig>,
    /// Cancelled on server shutdown; every control session holds a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &Config,
        registry: Arc<dyn DeviceRegistry>,
        shutdown: CancellationToken,
    ) -> ProxyResult<Self> {
        let client = upstream::http_client(config.proxy.upstream_timeout())?;

        Ok(Self {
            registry,
            endpoints: Arc::new(UpstreamEndpoints::new(&config.upstream)),
            video: Arc::new(VideoStreamProxy::new(
                client.clone(),
                config.proxy.multipart_boundary.clone(),
                config.proxy.max_frame_buffer_bytes,
            )),
            fetcher: Arc::new(ResourceFetcher::new(
                client,
                config.proxy.upstream_timeout(),
            )),
            proxy: Arc::new(config.proxy.clone()),
            shutdown,
        })
    }

    /// Look the device up, turning an unknown id into a 404.
    pub async fn resolve(&self, id: &DeviceId) -> AppResult<ConnectionDescriptor> {
        match self.registry.lookup(id).await {
            Ok(Some(device)) => {
                REGISTRY_LOOKUPS_TOTAL.with_label_values(&["found"]).inc();
                Ok(device)
            }
            Ok(None) => {
                REGISTRY_LOOKUPS_TOTAL.with_label_values(&["not_found"]).inc();
                Err(AppError::not_found(format!("Device {id} not found")))
            }
            Err(e) => {
                REGISTRY_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
                Err(e.into())
            }
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let router = Router::new()
        // Health check and metrics endpoints (for monitoring probes)
        .merge(health::create_health_router())
        .route("/devices/{device_id}/video", get(devices::stream_video))
        .route(
            "/devices/{device_id}/resource/{resource_id}",
            get(devices::fetch_resource),
        )
        .route("/devices/{device_id}/control", get(control::control_socket))
        // Paths used by older frontends
        .route("/printers/{device_id}/video", get(devices::stream_video))
        .route(
            "/printers/{device_id}/board-resource/history_image/{file}",
            get(devices::fetch_history_image),
        )
        .route(
            "/printers/{device_id}/websocket",
            get(control::control_socket),
        );

    let router = frontend::with_frontend(router, server.static_dir.as_deref());

    // Apply layers before state
    router
        .layer(cors_layer(&server.cors_allow_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}
