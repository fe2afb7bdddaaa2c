use anyhow::Context;
use elocker_gateway::GatewayConfig;
use elocker_gateway::config::DEFAULT_CONFIG_PATH;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);

    let config = match &path {
        Some(path) => GatewayConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => GatewayConfig::load(DEFAULT_CONFIG_PATH)?,
        None => GatewayConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid logging.level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &path {
        Some(path) => info!(path = %path, "Loaded configuration"),
        None => info!("Using {DEFAULT_CONFIG_PATH} or built-in defaults"),
    }

    tokio::select! {
        result = elocker_gateway::run(config) => {
            if let Err(e) = &result {
                error!(error = %e, "Gateway stopped");
            }
            result.context("gateway failed")?;
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
