// ── PtzClient ──
//
// Entry point for consumers. Holds the shared credential and tuning, and
// enforces at most one live session per device id.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::event::SessionState;
use crate::session::{self, PendingSession, Session};

/// Cheaply cloneable handle vending device [`Session`]s.
#[derive(Clone)]
pub struct PtzClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    sessions: DashMap<String, watch::Receiver<SessionState>>,
    cancel: CancellationToken,
}

impl PtzClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                sessions: DashMap::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Start connecting to `device_id` without waiting.
    ///
    /// Fails synchronously with [`CoreError::NoCredential`] when the
    /// credential is empty and [`CoreError::DeviceBusy`] while another
    /// session for the device is still open. Must be called within a
    /// Tokio runtime.
    pub fn open(&self, device_id: &str) -> Result<PendingSession, CoreError> {
        if device_id.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "device id must not be empty".into(),
            });
        }
        if self.inner.config.credential.is_empty() {
            warn!(device_id, "refusing to open session without a credential");
            return Err(CoreError::NoCredential);
        }

        self.prune();
        let cancel = self.inner.cancel.child_token();
        match self.inner.sessions.entry(device_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().borrow().is_terminal() {
                    return Err(CoreError::DeviceBusy {
                        device_id: device_id.to_owned(),
                    });
                }
                let pending = session::spawn(&self.inner.config, device_id, cancel)?;
                entry.insert(pending.state_changes());
                Ok(pending)
            }
            Entry::Vacant(entry) => {
                let pending = session::spawn(&self.inner.config, device_id, cancel)?;
                entry.insert(pending.state_changes());
                Ok(pending)
            }
        }
    }

    /// Open a session and wait until it is `Active`.
    pub async fn acquire(&self, device_id: &str) -> Result<Session, CoreError> {
        self.open(device_id)?.wait().await
    }

    /// Release `current` and take control of `device_id`.
    pub async fn switch(&self, current: Session, device_id: &str) -> Result<Session, CoreError> {
        current.close().await;
        self.acquire(device_id).await
    }

    /// Devices with a session that has not reached `Closed`.
    pub fn active_devices(&self) -> Vec<String> {
        self.prune();
        let mut devices: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        devices.sort();
        devices
    }

    /// Close every session opened through this client.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Forget sessions that have reached `Closed`.
    fn prune(&self) {
        self.inner
            .sessions
            .retain(|_, state| !state.borrow().is_terminal());
    }
}

impl std::fmt::Debug for PtzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtzClient")
            .field("endpoint", &ptzlink_api::websocket::redacted(&self.inner.config.endpoint))
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}
