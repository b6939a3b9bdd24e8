use crate::channel::Channel;
use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::router::RouteOutcome;
use crate::server::ServerState;
use dashmap::mapref::entry::Entry;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Holds one slot of the global and per-IP connection limits; gives both
/// back on drop.
struct ConnectionSlot {
    state: Arc<ServerState>,
    ip: IpAddr,
}

impl ConnectionSlot {
    /// Claim a slot for `ip`, or `None` if either limit is reached.
    fn acquire(state: &Arc<ServerState>, ip: IpAddr) -> Option<Self> {
        let active = state.active_connections.fetch_add(1, Ordering::AcqRel);
        if active >= state.config.max_conns {
            state.active_connections.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!(ip = %ip, limit = state.config.max_conns, "max connections reached");
            return None;
        }

        // Entry API keeps check and increment under one shard lock.
        let admitted = match state.ip_connections.entry(ip) {
            Entry::Occupied(mut entry) => {
                if *entry.get() >= state.config.max_conns_ip {
                    false
                } else {
                    *entry.get_mut() += 1;
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
                true
            }
        };

        if !admitted {
            state.active_connections.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!(ip = %ip, limit = state.config.max_conns_ip, "per-IP connection limit exceeded");
            return None;
        }

        Some(Self {
            state: Arc::clone(state),
            ip,
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let mut remove = false;
        if let Some(mut entry) = self.state.ip_connections.get_mut(&self.ip) {
            *entry = entry.saturating_sub(1);
            if *entry == 0 {
                remove = true;
            }
        }
        if remove {
            self.state
                .ip_connections
                .remove_if(&self.ip, |_, v| *v == 0);
        }
        self.state
            .active_connections
            .fetch_sub(1, Ordering::AcqRel);
    }
}

/// Serve one WebSocket connection until it closes or the server shuts down.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: watch::Receiver<()>,
) -> Result<(), RelayError> {
    let Some(_slot) = ConnectionSlot::acquire(&state, peer_addr.ip()) else {
        return Err(RelayError::ConnectionClosed);
    };

    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message_size),
        max_frame_size: Some(state.config.max_message_size),
        ..WebSocketConfig::default()
    };
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
        .await
        .map_err(RelayError::WebSocket)?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (mut channel, mut outbound_rx) = Channel::new(state.config.outbound_queue);
    let hook_state = Arc::clone(&state);
    channel.on_close(move |id, identity| {
        hook_state.router.release(id, identity);
        gauges::identities_registered(hook_state.router.registry().len());
    });

    tracing::debug!(channel = %channel.id(), peer = %peer_addr, "new connection");
    gauges::inc_connections_active();

    let result = run_message_loop(
        &mut ws_tx,
        &mut ws_rx,
        &mut outbound_rx,
        &mut channel,
        &state,
        shutdown,
    )
    .await;

    channel.close();
    gauges::dec_connections_active();
    tracing::debug!(channel = %channel.id(), peer = %peer_addr, "connection closed");

    result
}

/// Drive the select loop for one connection: inbound messages go to the
/// router, queued deliveries go out on the socket.
async fn run_message_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    outbound_rx: &mut mpsc::Receiver<String>,
    channel: &mut Channel,
    state: &ServerState,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), RelayError> {
    let period = Duration::from_secs(state.config.ping_interval);
    let mut ping_interval = interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => route_message(state, channel, text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => route_message(state, channel, &data),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(RelayError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(text) = outbound_rx.recv() => {
                ws_tx.send(Message::Text(text)).await.map_err(RelayError::WebSocket)?;
            }
            _ = ping_interval.tick() => {
                if let Err(e) = ws_tx.send(Message::Ping(vec![])).await {
                    tracing::debug!("failed to send ping: {}", e);
                }
            }
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

fn route_message(state: &ServerState, channel: &mut Channel, raw: &[u8]) {
    let start = Instant::now();
    match state.router.handle(channel, raw) {
        RouteOutcome::Registered(_) => {
            counters::identities_issued_total();
            gauges::identities_registered(state.router.registry().len());
        }
        RouteOutcome::Forwarded { action, .. } => counters::messages_relayed_total(action),
        RouteOutcome::Dropped(reason) => counters::messages_dropped_total(reason.as_str()),
    }
    histograms::route_latency_seconds(start.elapsed().as_secs_f64());
}
