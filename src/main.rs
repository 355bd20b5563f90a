/// MCP Tool Router Entry Point
///
/// Loads configuration from the environment (and an optional `.env` file),
/// initializes logging, builds the tool registry and starts the configured
/// transports. See `mcp::config` for the recognized environment variables.

mod mcp;
mod tools;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::mcp::config::{LogFormat, ServerConfig};
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::server;
use crate::tools::powerbi::client::PowerBiClient;

/// Logs go to stderr so they never interleave with STDIO responses.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);
    tracing::debug!(?config, "configuration loaded");

    let powerbi = Arc::new(PowerBiClient::new(config.powerbi.clone()));

    // Duplicate tool names mean a misconfigured tool set: refuse to start
    let registry = match tools::build_registry(powerbi.clone()) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!(error = %e, "failed to register tools");
            std::process::exit(1);
        }
    };

    let dispatcher = Dispatcher::new(registry, config.argument_policy);
    server::run(config, dispatcher, powerbi).await
}
