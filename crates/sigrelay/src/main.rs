#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use sigrelay::config::{Args, ServerConfig};
use sigrelay::metrics::{start_metrics_server, Readiness};
use sigrelay::{run_with_shutdown, ServerState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config: ServerConfig = args.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let readiness = Readiness::new();
    tokio::spawn({
        let readiness = readiness.clone();
        let metrics_addr = config.metrics_addr;
        async move {
            if let Err(e) = start_metrics_server(metrics_addr, readiness).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let state = Arc::new(ServerState::new(config));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let server = tokio::spawn(run_with_shutdown(listener, state, shutdown_rx));
    readiness.accepting();

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    readiness.draining();
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Err(e)) => tracing::error!("server error: {}", e),
        Err(e) => tracing::error!("server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
