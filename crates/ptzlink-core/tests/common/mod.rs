// Shared fixtures for session integration tests: an in-process WebSocket
// "camera" on a loopback port, scripted from the test body.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ptzlink_api::{Envelope, Message};
use ptzlink_core::{ClientConfig, Credential, DispatchConfig, ReconnectPolicy};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite};
use url::Url;

pub const TOKEN: &str = "s3cr3t-token";
pub const USER: &str = "operator";
pub const THROTTLE: Duration = Duration::from_millis(40);
pub const STATUS_TIMEOUT: Duration = Duration::from_millis(300);

const WAIT: Duration = Duration::from_secs(5);

// ── Mock device ─────────────────────────────────────────────────────

/// What the device observed.
#[derive(Debug)]
pub enum Inbound {
    Connected { uri: String },
    Envelope(Envelope),
    Disconnected,
}

enum Action {
    Send(String),
    Drop,
}

pub struct MockDevice {
    pub addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    control: mpsc::UnboundedSender<Action>,
    task: JoinHandle<()>,
}

impl MockDevice {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(listener, inbound_tx, control_rx));
        Self {
            addr,
            inbound,
            control,
            task,
        }
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("ws://{}", self.addr)).unwrap()
    }

    pub async fn next(&mut self) -> Inbound {
        tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("device saw nothing in time")
            .expect("device task ended")
    }

    pub async fn expect_connected(&mut self) -> String {
        match self.next().await {
            Inbound::Connected { uri } => uri,
            other => panic!("expected a connection, got {other:?}"),
        }
    }

    pub async fn expect_message(&mut self) -> Message {
        match self.next().await {
            Inbound::Envelope(envelope) => envelope.message,
            other => panic!("expected an envelope, got {other:?}"),
        }
    }

    pub async fn expect_disconnected(&mut self) {
        match self.next().await {
            Inbound::Disconnected => {}
            other => panic!("expected disconnect, got {other:?}"),
        }
    }

    /// Accept a connection and its `connect` envelope.
    pub async fn expect_session(&mut self) -> String {
        let uri = self.expect_connected().await;
        match self.expect_message().await {
            Message::Connect(payload) => assert_eq!(payload.user_id, USER),
            other => panic!("expected connect, got {other:?}"),
        }
        uri
    }

    /// Assert nothing arrives for `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(seen)) = tokio::time::timeout(window, self.inbound.recv()).await {
            panic!("expected silence, device saw {seen:?}");
        }
    }

    pub fn send(&self, message: Message) {
        self.send_raw(Envelope::new(message).encode().unwrap());
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        self.control.send(Action::Send(text.into())).unwrap();
    }

    /// Drop the socket without a close frame.
    pub fn drop_connection(&self) {
        self.control.send(Action::Drop).unwrap();
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<Inbound>,
    mut control: mpsc::UnboundedReceiver<Action>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        let mut uri = String::new();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            uri = req.uri().to_string();
            Ok(resp)
        };
        let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
            continue;
        };
        let _ = inbound.send(Inbound::Connected { uri });

        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let envelope = Envelope::decode(text.as_str())
                            .expect("client sent a malformed envelope")
                            .expect("client sent an unknown kind");
                        let _ = inbound.send(Inbound::Envelope(envelope));
                    }
                    Some(Ok(tungstenite::Message::Close(_)) | Err(_)) | None => {
                        let _ = inbound.send(Inbound::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
                action = control.recv() => match action {
                    Some(Action::Send(text)) => {
                        if ws.send(tungstenite::Message::text(text)).await.is_err() {
                            let _ = inbound.send(Inbound::Disconnected);
                            break;
                        }
                    }
                    Some(Action::Drop) => {
                        drop(ws);
                        let _ = inbound.send(Inbound::Disconnected);
                        break;
                    }
                    None => return,
                },
            }
        }
    }
}

// ── Client config ───────────────────────────────────────────────────

/// Fast tuning so timing-dependent scenarios finish in milliseconds.
pub fn config(endpoint: Url) -> ClientConfig {
    let credential = Credential::new(USER, SecretString::from(TOKEN.to_owned()));
    let mut config = ClientConfig::new(endpoint, credential);
    config.reconnect = ReconnectPolicy {
        initial_delay: Duration::from_millis(30),
        max_delay: Duration::from_millis(120),
        max_attempts: 3,
    };
    config.connect_timeout = Duration::from_secs(2);
    config.status_timeout = STATUS_TIMEOUT;
    config.dispatch = DispatchConfig {
        throttle_interval: THROTTLE,
        move_timeout_ms: 1000,
    };
    config
}

/// An endpoint nothing listens on.
pub fn dead_endpoint() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("ws://{addr}")).unwrap()
}
