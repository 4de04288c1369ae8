//! MAVLink MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server that bridges an agent to a MAVLink drone.
//! Listens for the autopilot on UDP and serves tools over stdio.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mavlink_mcp_server::config::Config;
use mavlink_mcp_server::drone::Vehicle;
use mavlink_mcp_server::error::Result;
use mavlink_mcp_server::mcp::server::McpServer;

/// Filter used when RUST_LOG is unset or invalid
const DEFAULT_LOG_FILTER: &str = "info";

/// MAVLink MCP Server
#[derive(Parser)]
#[command(name = "mavlink-mcp-server")]
#[command(author, version, about = "MAVLink MCP Server - A Model Context Protocol server for MAVLink drones")]
struct Cli {
    /// Local address to listen on for the autopilot (empty = all interfaces)
    #[arg(long, global = true)]
    address: Option<String>,

    /// Local UDP port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Send to this autopilot address instead of waiting for it to talk first
    #[arg(long, global = true)]
    remote: Option<SocketAddr>,

    /// Seconds to wait for the first autopilot heartbeat
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the drone, print its status and exit
    Check,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(remote) = self.remote {
            config.remote = Some(remote);
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::new()?;
    cli.apply(&mut config);

    match cli.command {
        Some(Commands::Check) => run_check(config).await,
        None => run_server(config).await,
    }
}

/// RUST_LOG directives when given, `info` otherwise
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

async fn run_check(config: Config) -> Result<()> {
    let vehicle = Vehicle::connect(&config).await?;
    let status = serde_json::to_string_pretty(&vehicle.status())?;
    println!("{}", status);
    vehicle.close().await;
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let vehicle = Arc::new(Vehicle::connect(&config).await?);

    let mut server = McpServer::new(Arc::clone(&vehicle));
    let served = server.run_stdio().await;

    vehicle.close().await;
    served
}
