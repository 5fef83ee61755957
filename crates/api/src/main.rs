//! Alert Ingest - Main Entry Point

use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

/// Environment variable naming the config file (extension optional)
const CONFIG_PATH_ENV: &str = "ALERT_INGEST_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "alert-ingest".to_string());
    let config = ServiceConfig::load(Some(&path))?;

    init_logging(&config.log_level, config.log_json)?;

    info!("=== Alert Ingest v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Default mode: {}, targets: {}, shared cache: {}",
        config.default_mode,
        config.targets.len(),
        config.shared_cache
    );

    run_server(config).await
}
