mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use printfarm_core::{bootstrap::load_config, logging, registry};

use server::PrintfarmServer;

/// Reverse proxy between browsers and the printers of a print farm
#[derive(Debug, Parser)]
#[command(name = "printfarm", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "PRINTFARM_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration (fails fast)
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Printfarm proxy starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Connect the device registry
    let registry = registry::from_config(&config.registry)
        .map_err(|e| anyhow::anyhow!("Failed to set up device registry: {e}"))?;
    match &config.registry.url {
        Some(url) => info!("Using device registry at {}", url),
        None => info!(
            "Using static device registry with {} device(s)",
            config.registry.devices.len()
        ),
    }

    // 4. Serve until a shutdown signal arrives
    PrintfarmServer::new(config, registry).start().await
}
