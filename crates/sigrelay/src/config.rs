use clap::{ArgAction, Parser};
use sigrelay_common::identity::{DEFAULT_LENGTH, MAX_LENGTH, MIN_LENGTH};
use std::net::SocketAddr;

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "sigrelay")]
#[command(about = "WebSocket signaling relay for peer-to-peer session negotiation")]
#[command(version)]
pub struct Args {
    /// Socket address to accept WebSocket connections on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "SIGRELAY_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics and health endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "SIGRELAY_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "100000", env = "SIGRELAY_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum concurrent connections per IP address.
    #[arg(long, default_value = "64", env = "SIGRELAY_MAX_CONNS_IP")]
    pub max_conns_ip: usize,
    /// Maximum size of a single WebSocket message in bytes.
    #[arg(long, default_value = "65536", env = "SIGRELAY_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,
    /// Messages buffered per connection before further deliveries are dropped.
    #[arg(long, default_value = "256", env = "SIGRELAY_OUTBOUND_QUEUE")]
    pub outbound_queue: usize,
    /// Interval between WebSocket keepalive pings in seconds.
    #[arg(long, default_value = "30", env = "SIGRELAY_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Number of symbols in minted identities.
    #[arg(long, default_value_t = DEFAULT_LENGTH, env = "SIGRELAY_ID_LENGTH")]
    pub id_length: usize,
    /// Increase log verbosity (-v debug, -vv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to accept WebSocket connections on.
    pub listen: SocketAddr,
    /// Socket address for the metrics and health endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Maximum concurrent connections per IP address.
    pub max_conns_ip: usize,
    /// Maximum size of a single WebSocket message in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity per connection.
    pub outbound_queue: usize,
    /// Interval between WebSocket keepalive pings in seconds.
    pub ping_interval: u64,
    /// Number of symbols in minted identities.
    pub id_length: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.max_conns_ip == 0 {
            return Err("max_conns_ip must be greater than 0".to_string());
        }
        if self.max_conns_ip > self.max_conns {
            return Err("max_conns_ip cannot exceed max_conns".to_string());
        }

        const MAX_ALLOWED_MESSAGE: usize = 16 * 1024 * 1024;
        if self.max_message_size < 256 {
            return Err("max_message_size must be at least 256 bytes".to_string());
        }
        if self.max_message_size > MAX_ALLOWED_MESSAGE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_ALLOWED_MESSAGE
            ));
        }

        if self.outbound_queue == 0 {
            return Err("outbound_queue must be greater than 0".to_string());
        }
        if self.outbound_queue > 65_536 {
            return Err("outbound_queue exceeds reasonable limit (65536 messages)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if !(MIN_LENGTH..=MAX_LENGTH).contains(&self.id_length) {
            return Err(format!(
                "id_length must be between {} and {}",
                MIN_LENGTH, MAX_LENGTH
            ));
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            max_conns_ip: args.max_conns_ip,
            max_message_size: args.max_message_size,
            outbound_queue: args.outbound_queue,
            ping_interval: args.ping_interval,
            id_length: args.id_length,
        }
    }
}
