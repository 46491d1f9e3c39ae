//! docwire - MongoDB wire protocol server
//!
//! Accepts MongoDB driver connections over TCP or TLS and answers the
//! handshake commands.

use docwire_server::config::CONFIG_ENV;
use docwire_server::{Config, HandshakeHandler, Server, ServerConfig, ServerInfo};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Defaults, then the YAML file named by DOCWIRE_CONFIG, then env overrides
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        tracing::info!("Loaded config from {}", path);
    }

    tracing::info!("Starting docwire server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Idle timeout: {}s", config.network.idle_timeout_secs);
    tracing::info!("  Max message size: {}", config.limits.max_message_size);
    tracing::info!(
        "  Reply checksums: {}",
        if config.limits.checksum_replies {
            "enabled"
        } else {
            "disabled"
        }
    );

    let server_config = match ServerConfig::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid server configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(
        "  TLS: {}",
        if server_config.tls_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let info = ServerInfo::default().with_max_message_size(config.limits.max_message_size);
    let handler = Arc::new(HandshakeHandler::with_info(info));
    let server = Arc::new(Server::new(server_config, handler));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Blocks until shutdown
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
