#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sigrelay::config::ServerConfig;
use sigrelay::server::ServerState;
use sigrelay_common::{Identity, IdentityGenerator};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type ClientStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        max_conns_ip: 1000,
        max_message_size: 65_536,
        outbound_queue: 64,
        ping_interval: 30,
        id_length: 21,
    }
}

/// Hands out identities from a fixed list, in order.
pub struct Scripted(Mutex<VecDeque<&'static str>>);

impl Scripted {
    pub fn new(ids: &[&'static str]) -> Self {
        Self(Mutex::new(ids.iter().copied().collect()))
    }
}

impl IdentityGenerator for Scripted {
    fn next(&self) -> Identity {
        let id = self
            .0
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted identities exhausted");
        Identity::from(id)
    }
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<ClientStream, Message>,
    pub ws_rx: futures_util::stream::SplitStream<ClientStream>,
    pub id: Option<String>,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self {
            ws_tx,
            ws_rx,
            id: None,
        }
    }

    /// Connect and complete `start`.
    pub async fn register(addr: &SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.start().await;
        client
    }

    pub async fn start(&mut self) -> String {
        self.send_json(json!({"action": "start"})).await;
        let reply = self.recv_json().await;
        assert_eq!(reply["action"], "start", "expected start reply, got {reply}");
        let id = reply["id"]
            .as_str()
            .unwrap_or_else(|| panic!("start reply without id: {reply}"))
            .to_string();
        self.id = Some(id.clone());
        id
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().expect("client not registered")
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_to(&mut self, action: &str, remote_id: &str, mut data: Value) {
        data["remoteId"] = json!(remote_id);
        self.send_json(json!({"action": action, "data": data})).await;
    }

    pub async fn recv_json(&mut self) -> Value {
        self.recv_json_timeout(Duration::from_secs(5))
            .await
            .expect("timeout waiting for message")
    }

    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let next = async {
            loop {
                match self.ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some(serde_json::from_str::<Value>(&text).unwrap())
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                    Some(Ok(other)) => panic!("expected text message, got {other:?}"),
                }
            }
        };
        tokio::time::timeout(timeout, next).await.ok().flatten()
    }

    /// Assert nothing arrives within `timeout`.
    pub async fn expect_silence(&mut self, timeout: Duration) {
        if let Some(value) = self.recv_json_timeout(timeout).await {
            panic!("expected no message, got {value}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
        let _ = self.ws_tx.close().await;
    }
}

pub async fn start_server_with_state(state: ServerState) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind(state.config.listen).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(state);

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = sigrelay::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let config = test_config("127.0.0.1:0".parse().unwrap());
    start_server_with_state(ServerState::new(config)).await
}

pub async fn start_server_with_identities(ids: &[&'static str]) -> (SocketAddr, Arc<ServerState>) {
    let config = test_config("127.0.0.1:0".parse().unwrap());
    start_server_with_state(ServerState::with_identities(config, Scripted::new(ids))).await
}

/// Poll until `identity` is no longer registered.
pub async fn wait_until_released(state: &ServerState, identity: &str) {
    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while state.router.registry().lookup(identity).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "identity {identity} was never released");
}
