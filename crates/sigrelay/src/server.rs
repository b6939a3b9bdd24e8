use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::RelayError;
use crate::router::Router;
use dashmap::DashMap;
use sigrelay_common::{IdentityGenerator, RandomIdentityGenerator};
use std::net::IpAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How long shutdown waits for open connections to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the relay server.
pub struct ServerState {
    /// Message router and the identity registry behind it.
    pub router: Router,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Per-IP connection counter for enforcing connection limits.
    pub ip_connections: DashMap<IpAddr, usize>,
    /// Number of connections currently being served.
    pub active_connections: AtomicUsize,
}

impl ServerState {
    /// Build server state that mints identities with the OS CSPRNG.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let identities = RandomIdentityGenerator::new(config.id_length);
        Self::with_identities(config, identities)
    }

    /// Build server state with a custom identity source.
    #[must_use]
    pub fn with_identities(
        config: ServerConfig,
        identities: impl IdentityGenerator + 'static,
    ) -> Self {
        Self {
            router: Router::new(identities),
            config,
            ip_connections: DashMap::new(),
            active_connections: AtomicUsize::new(0),
        }
    }
}

/// Run the accept loop until the process exits.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Run the server accept loop with an externally-controlled shutdown signal.
///
/// When a value is sent on the watch channel, or its sender is dropped, the
/// accept loop stops, every open connection is sent a close frame, and the
/// loop waits up to 30 seconds for connection tasks to finish.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), RelayError> {
    let local_addr = listener.local_addr().map_err(RelayError::Io)?;
    info!("server listening on {}", local_addr);
    let mut shutdown = shutdown_rx.clone();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        let shutdown = shutdown_rx.clone();
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state, shutdown).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            _ = shutdown.changed() => {
                info!("shutdown signal received, draining {} connections", tasks.len());
                break;
            }
        }
    }

    drop(listener);
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "drain timeout reached with {} connections still active",
            tasks.len()
        );
        tasks.abort_all();
    }

    info!("server shut down gracefully");
    Ok(())
}
