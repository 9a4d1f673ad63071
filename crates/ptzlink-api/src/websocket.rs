//! WebSocket transport for a single device channel.
//!
//! A [`Transport`] is one live socket to `<endpoint>/<channel>/<device_id>`.
//! It knows nothing about sessions or reconnection policy: it connects,
//! writes encoded envelopes, and yields inbound text frames until the peer
//! goes away. `ptzlink-core` owns the lifecycle around it and uses
//! [`ReconnectConfig`] + [`calculate_backoff`] to pace retries.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::protocol::Envelope;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Capped exponential backoff for re-establishing a device channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay after the first failed attempt. Default: 500ms.
    pub initial_delay: Duration,

    /// Upper bound on any single delay. Default: 5s.
    pub max_delay: Duration,

    /// Handshake attempts per connect sequence, including the first.
    /// Default: 3.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `delay = min(initial * 2^(attempt - 1), max)`
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    config
        .initial_delay
        .saturating_mul(1_u32 << exponent)
        .min(config.max_delay)
}

// ── Addressing ───────────────────────────────────────────────────────

/// Build the per-device channel URL: `<endpoint>/<channel>/<device_id>?token=...`.
///
/// Path segments are percent-encoded, so device ids may contain any
/// characters. Existing query parameters on the endpoint are preserved.
pub fn channel_url(
    endpoint: &Url,
    channel: &str,
    device_id: &str,
    token: &SecretString,
) -> Result<Url, Error> {
    let mut url = endpoint.clone();

    match url.scheme() {
        "ws" | "wss" => {}
        "http" => set_scheme(&mut url, "ws")?,
        "https" => set_scheme(&mut url, "wss")?,
        other => {
            return Err(Error::InvalidEndpoint(format!(
                "unsupported scheme '{other}' (expected ws or wss)"
            )));
        }
    }

    url.path_segments_mut()
        .map_err(|()| Error::InvalidEndpoint(redacted(endpoint)))?
        .pop_if_empty()
        .push(channel)
        .push(device_id);

    url.query_pairs_mut()
        .append_pair("token", token.expose_secret());

    Ok(url)
}

fn set_scheme(url: &mut Url, scheme: &str) -> Result<(), Error> {
    url.set_scheme(scheme)
        .map_err(|()| Error::InvalidEndpoint(redacted(url)))
}

/// Render a URL for logs and errors with its query (and thus the token) removed.
pub fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    let _ = shown.set_password(None);
    shown.to_string()
}

// ── Transport ────────────────────────────────────────────────────────

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open WebSocket to a device channel.
pub struct Transport {
    socket: Socket,
}

impl Transport {
    /// Perform the WebSocket handshake, bounded by `timeout`.
    pub async fn connect(url: &Url, timeout: Duration) -> Result<Self, Error> {
        tracing::debug!(url = %redacted(url), "opening device channel");

        let handshake = tokio_tungstenite::connect_async(url.as_str());
        let (socket, _response) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::debug!(url = %redacted(url), "device channel open");
        Ok(Self { socket })
    }

    /// Encode and write one envelope as a text frame.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), Error> {
        let text = envelope.encode()?;
        tracing::trace!(kind = %envelope.kind(), bytes = text.len(), "send");
        self.socket
            .send(tungstenite::Message::text(text))
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }

    /// Next inbound text frame.
    ///
    /// Control and binary frames are skipped. A close frame from the peer
    /// surfaces as [`Error::WebSocketClosed`]; a stream that ends without
    /// one yields `Ok(None)`. Cancel-safe.
    pub async fn next_frame(&mut self) -> Result<Option<String>, Error> {
        loop {
            match self.socket.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |f| {
                        (u16::from(f.code), f.reason.to_string())
                    });
                    tracing::debug!(code, reason = %reason, "close frame received");
                    return Err(Error::WebSocketClosed { code, reason });
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite queues the pong itself
                    tracing::trace!("ping");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    /// Send a normal-closure frame and flush. Errors are logged, not returned:
    /// the socket is being discarded either way.
    pub async fn close(mut self) {
        let frame = CloseFrame {
            code: tungstenite::protocol::frame::coding::CloseCode::Normal,
            reason: "client closing".into(),
        };
        if let Err(e) = self.socket.close(Some(frame)).await {
            tracing::debug!(error = %e, "close handshake failed");
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
