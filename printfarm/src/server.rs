//! Server lifecycle management
//!
//! Runs the HTTP server and ends every live proxy session on shutdown.

use std::sync::Arc;

use printfarm_api::{create_router, AppState};
use printfarm_core::{Config, DeviceRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct PrintfarmServer {
    config: Config,
    registry: Arc<dyn DeviceRegistry>,
}

impl PrintfarmServer {
    pub fn new(config: Config, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { config, registry }
    }

    /// Serve HTTP until SIGINT/SIGTERM, then drain.
    pub async fn start(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();

        let state = AppState::new(&self.config, self.registry, shutdown.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize proxy: {e}"))?;
        let router = create_router(state, &self.config.server);

        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        // Control relays and video bodies never end on their own; graceful
        // shutdown waits on them until the token is cancelled.
        let sessions = shutdown.clone();
        let graceful = async move {
            shutdown_signal().await;
            info!("Shutdown signal received, closing proxy sessions...");
            sessions.cancel();
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
        {
            error!("HTTP server error: {}", e);
            return Err(e.into());
        }

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
