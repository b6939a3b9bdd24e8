//! Runs an offer/answer/candidate exchange between two peers through a
//! running sigrelay server.
//!
//! Usage: cargo run --example handshake -- ws://127.0.0.1:8080

use anyhow::{bail, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sigrelay_common::Envelope;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Peer {
    name: &'static str,
    ws_tx: SplitSink<Stream, Message>,
    ws_rx: SplitStream<Stream>,
    id: String,
}

impl Peer {
    async fn join(url: &str, name: &'static str) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        let (ws_tx, ws_rx) = ws.split();
        let mut peer = Self {
            name,
            ws_tx,
            ws_rx,
            id: String::new(),
        };

        peer.send(&Envelope::start()).await?;
        let ack = peer.recv().await?;
        peer.id = ack.id.context("start reply carried no id")?;
        println!("{name}: registered as {}", peer.id);
        Ok(peer)
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.ws_tx.send(Message::Text(envelope.to_json()?)).await?;
        Ok(())
    }

    async fn send_to(&mut self, action: &str, remote_id: &str, mut data: Value) -> Result<()> {
        data["remoteId"] = json!(remote_id);
        self.send(&Envelope::new(action, data)).await
    }

    async fn recv(&mut self) -> Result<Envelope> {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .context("timed out waiting for relay")?;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let envelope = Envelope::parse(text.as_bytes())?;
                    println!("{}: <- {}", self.name, text);
                    return Ok(envelope);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(other)) => bail!("unexpected message: {other:?}"),
                Some(Err(e)) => return Err(e.into()),
                None => bail!("relay closed the connection"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    let mut alice = Peer::join(&url, "alice").await?;
    let mut bob = Peer::join(&url, "bob").await?;

    let bob_id = bob.id.clone();
    alice
        .send_to("offer", &bob_id, json!({"sdp": "v=0 (alice offer)"}))
        .await?;
    let offer = bob.recv().await?;
    let caller = offer
        .remote_id()
        .context("offer arrived without the caller's identity")?
        .to_string();
    if caller != alice.id {
        bail!("offer named {caller}, expected {}", alice.id);
    }

    bob.send_to("answer", &caller, json!({"sdp": "v=0 (bob answer)"}))
        .await?;
    let answer = alice.recv().await?;
    if answer.remote_id().is_some() {
        bail!("answer still carries remoteId");
    }

    alice
        .send_to("candidate", &bob_id, json!({"candidate": "candidate:1 1 UDP 1 192.0.2.1 9 typ host"}))
        .await?;
    bob.recv().await?;

    println!("handshake relayed successfully");
    Ok(())
}
