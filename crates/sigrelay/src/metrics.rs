//! Prometheus metrics plus the `/health` and `/ready` probes.
//!
//! `/health` answers as long as the process runs. `/ready` tracks the relay's
//! lifecycle: it is 503 while the listener is being set up, 200 while new
//! peers can connect and register, and 503 again once shutdown has begun and
//! open channels are draining.

use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where the relay is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPhase {
    /// Listener bound, accept loop not yet running.
    Starting,
    /// Accepting connections and `start` requests.
    Accepting,
    /// No new connections; existing channels are being closed.
    Draining,
}

impl RelayPhase {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Accepting,
            2 => Self::Draining,
            _ => Self::Starting,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    phase: RelayPhase,
    ready: bool,
}

/// Lifecycle phase shared between `main` and the `/ready` handler.
#[derive(Clone, Default)]
pub struct Readiness {
    phase: Arc<AtomicU8>,
}

impl Readiness {
    /// Starts in [`RelayPhase::Starting`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The accept loop is running.
    pub fn accepting(&self) {
        self.phase.store(RelayPhase::Accepting as u8, Ordering::Release);
    }

    /// Shutdown has begun. Never goes back to accepting.
    pub fn draining(&self) {
        self.phase.store(RelayPhase::Draining as u8, Ordering::Release);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RelayPhase {
        RelayPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether load balancers should send new peers here.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == RelayPhase::Accepting
    }
}

/// Serve `/metrics`, `/health` and `/ready` on `addr`.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder is already installed or
/// binding the HTTP listener fails.
pub async fn start_metrics_server(addr: SocketAddr, readiness: Readiness) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(readiness.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "alive" }))
}

async fn ready_handler(readiness: Readiness) -> (StatusCode, Json<ReadyResponse>) {
    let phase = readiness.phase();
    let ready = phase == RelayPhase::Accepting;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { phase, ready }))
}

/// Gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("sigrelay_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("sigrelay_connections_active").decrement(1.0);
    }

    /// Publish the current registry size.
    #[allow(clippy::cast_precision_loss)]
    pub fn identities_registered(count: usize) {
        metrics::gauge!("sigrelay_identities_registered").set(count as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Increment the minted-identities counter.
    pub fn identities_issued_total() {
        metrics::counter!("sigrelay_identities_issued_total").increment(1);
    }

    /// Increment the relayed-messages counter for an action label.
    pub fn messages_relayed_total(action: &'static str) {
        metrics::counter!("sigrelay_messages_relayed_total", "action" => action).increment(1);
    }

    /// Increment the dropped-messages counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("sigrelay_messages_dropped_total", "reason" => reason).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record the time spent handling one inbound message, in seconds.
    pub fn route_latency_seconds(value: f64) {
        metrics::histogram!("sigrelay_route_latency_seconds").record(value);
    }
}
