use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spore_arena::config::ServerConfig;
use spore_arena::metrics::{self, Metrics};
use spore_arena::net::hub::Hub;
use spore_arena::net::transport::WebTransportServer;
use spore_arena::store::{MemoryStore, PlayerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Spore Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, max_spores={}",
        config.bind_address, config.port, config.max_spores
    );

    let metrics = Arc::new(Metrics::new());
    let store: Arc<dyn PlayerStore> = Arc::new(MemoryStore::new());

    let metrics_clone = metrics.clone();
    let store_clone = store.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, store_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let hub = Hub::new(config, store, metrics);
    let server = WebTransportServer::new(hub.handle()).await?;
    tokio::spawn(hub.run());

    info!("Server ready on https://{}", server.bind_addr());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
