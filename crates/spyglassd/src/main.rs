//! spyglassd - standalone inspector agent
//!
//! Serves a demo in-memory database over the inspector protocol. Useful for
//! developing inspector UIs without embedding the agent in a host app.
//!
//! # Usage
//!
//! ```bash
//! # Serve with defaults (loopback, ports 9876/9877)
//! spyglassd
//!
//! # Custom config and log level
//! spyglassd --config agent.toml --log-level debug
//! ```

mod demo;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spyglass_server::{Server, ServerConfig};

/// Standalone spyglass inspector agent
#[derive(Parser, Debug)]
#[command(name = "spyglassd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the network transport port
    #[arg(long)]
    network_port: Option<u16>,
}

/// Top-level configuration file shape
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentConfig {
    server: ServerConfig,
}

impl FromStr for AgentConfig {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = load_config(cli.config.as_deref())?.server;
    if let Some(port) = cli.network_port {
        config = config.with_network_port(port);
    }

    let limits = config.serializer.limits();
    let adapter = demo::demo_adapter(limits);

    let server = Server::new(Arc::new(adapter), config);
    let addrs = server.start().await?;
    for addr in addrs {
        tracing::info!(address = %addr, "serving");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.stop().await;

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<AgentConfig> {
    match path {
        None => Ok(AgentConfig::default()),
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            contents
                .parse()
                .with_context(|| format!("failed to parse config file '{}'", path.display()))
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
