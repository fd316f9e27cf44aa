use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use topo_server::AppServer;

#[derive(Parser, Debug)]
#[command(name = "topod", version, about = "Topology watch service")]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long = "http-address", env = "TOPOD_HTTP_ADDRESS", default_value = "0.0.0.0:8001")]
    http_address: String,
}

fn init_tracing() {
    let env = std::env::var("TOPOD_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TOPOD_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid TOPOD_METRICS_ADDR; expected host:port");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let addr: SocketAddr = cli
        .http_address
        .parse()
        .with_context(|| format!("invalid http address: {}", cli.http_address))?;

    let server = AppServer::new();
    server.serve_with_shutdown(addr, shutdown_signal()).await?;
    Ok(())
}
