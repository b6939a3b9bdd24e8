use sigrelay_common::Identity;
use thiserror::Error;

/// Errors that can occur during relay server operation.
#[derive(Error, Debug)]
pub enum RelayError {
    /// An identity was registered while already bound to a channel.
    #[error("identity {0} is already registered")]
    DuplicateIdentity(Identity),
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The connection was refused or closed before it could be served.
    #[error("connection closed")]
    ConnectionClosed,
}
