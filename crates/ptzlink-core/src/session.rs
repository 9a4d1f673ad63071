// ── Device session ──
//
// A `Session` is the caller's owned handle to one device channel. All
// session state lives in a single driver task that owns the transport,
// the dispatcher and the status correlator; the handle talks to it over a
// FIFO command channel and observes it through watch/broadcast channels.
//
// The driver reacts to, in priority order: cancellation, the in-flight
// handshake, inbound frames, caller commands, then its timers (throttle
// window, status deadline, connect-ack deadline, reconnect delay).

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use ptzlink_api::websocket::{calculate_backoff, channel_url, redacted};
use ptzlink_api::{ConnectPayload, Envelope, Message, StatusReport, Transport};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::correlator::{StatusCorrelator, StatusResult, StatusWaiter};
use crate::dispatcher::{DiscreteCommand, Dispatcher, PatrolAction, StopScope};
use crate::encoder::{CommandEncoder, GestureInput, MotionIntent};
use crate::error::CoreError;
use crate::event::{SessionEvent, SessionState};
use crate::stream::StatusWatch;

const EVENT_CHANNEL_SIZE: usize = 64;

type ApiResult<T> = Result<T, ptzlink_api::Error>;
type ReadySender = oneshot::Sender<Result<(), CoreError>>;

// ── Commands ─────────────────────────────────────────────────────────

enum Command {
    Motion(MotionIntent),
    Zoom(f64),
    Stop(StopScope),
    Discrete(DiscreteCommand),
    Status(StatusWaiter),
    Close,
}

// ── Session handle ───────────────────────────────────────────────────

/// Owned handle to one device's control channel.
///
/// Motion and discrete commands are fire-and-forget: they return as soon
/// as the command is queued, or fail immediately with
/// [`CoreError::NotConnected`] when the session is not `Active`.
/// Dropping the handle closes the session after queued commands drain.
pub struct Session {
    session_id: Uuid,
    device_id: String,
    encoder: CommandEncoder,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    latest: watch::Receiver<Option<Arc<StatusReport>>>,
    last_activity: Arc<ArcSwap<DateTime<Utc>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Stable for the lifetime of the session, across reconnects.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Time of the last frame sent or received.
    pub fn last_activity(&self) -> DateTime<Utc> {
        **self.last_activity.load()
    }

    pub fn latest_status(&self) -> Option<Arc<StatusReport>> {
        self.latest.borrow().clone()
    }

    pub fn status_updates(&self) -> StatusWatch {
        StatusWatch::new(self.latest.clone())
    }

    // ── Continuous motion ────────────────────────────────────────────

    /// Encode and queue a joystick sample.
    ///
    /// A sample that encodes to the neutral intent is a release and sends
    /// `stop` instead of a neutral `move`.
    pub fn move_gesture(&self, input: GestureInput) -> Result<MotionIntent, CoreError> {
        let intent = self.encoder.encode_gesture(input);
        if self.encoder.is_neutral(&intent) {
            self.release()?;
        } else {
            self.dispatch(Command::Motion(intent))?;
        }
        Ok(intent)
    }

    /// Queue an already-normalized intent.
    pub fn move_intent(&self, intent: MotionIntent) -> Result<(), CoreError> {
        if ![intent.pan, intent.tilt, intent.zoom].iter().all(|v| v.is_finite()) {
            return Err(CoreError::InvalidInput {
                message: "motion speeds must be finite".into(),
            });
        }
        self.dispatch(Command::Motion(intent))
    }

    /// Gesture ended: stop pan/tilt now, discarding any coalesced move.
    pub fn release(&self) -> Result<(), CoreError> {
        self.dispatch(Command::Stop(StopScope::PAN_TILT))
    }

    /// Queue a zoom at `level` in [0, 100]; 50 is no zoom. Returns the speed.
    pub fn zoom_to_level(&self, level: f64) -> Result<f64, CoreError> {
        let speed = self.encoder.zoom_speed(level);
        self.dispatch(Command::Zoom(speed))?;
        Ok(speed)
    }

    pub fn release_zoom(&self) -> Result<(), CoreError> {
        self.dispatch(Command::Stop(StopScope::ZOOM))
    }

    /// Stop every axis.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.dispatch(Command::Stop(StopScope::ALL))
    }

    // ── Discrete commands ────────────────────────────────────────────

    pub fn apply_preset(&self, preset_id: impl Into<String>) -> Result<(), CoreError> {
        let preset_id = preset_id.into();
        if preset_id.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "preset id must not be empty".into(),
            });
        }
        self.dispatch(Command::Discrete(DiscreteCommand::Preset { preset_id }))
    }

    pub fn patrol(
        &self,
        action: PatrolAction,
        pattern_id: Option<String>,
    ) -> Result<(), CoreError> {
        self.dispatch(Command::Discrete(DiscreteCommand::Patrol { action, pattern_id }))
    }

    pub fn start_patrol(&self, pattern_id: Option<String>) -> Result<(), CoreError> {
        self.patrol(PatrolAction::Start, pattern_id)
    }

    pub fn stop_patrol(&self) -> Result<(), CoreError> {
        self.patrol(PatrolAction::Stop, None)
    }

    pub fn pause_patrol(&self) -> Result<(), CoreError> {
        self.patrol(PatrolAction::Pause, None)
    }

    pub fn resume_patrol(&self) -> Result<(), CoreError> {
        self.patrol(PatrolAction::Resume, None)
    }

    /// Request the device's position and wait for the next status report.
    ///
    /// A report with `success: false` is returned as `Ok`; inspect
    /// [`StatusReport::rejection`].
    pub async fn get_status(&self) -> Result<Arc<StatusReport>, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Command::Status(tx))?;
        rx.await.map_err(|_| CoreError::Canceled)?
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Close the channel and wait for the driver to finish.
    ///
    /// Commands queued before the call are still sent. Pending status
    /// requests resolve as [`CoreError::Canceled`]. Idempotent.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(device_id = %self.device_id, error = %e, "session driver panicked");
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<(), CoreError> {
        let state = self.state();
        if !state.is_active() {
            return Err(CoreError::NotConnected { state });
        }
        self.commands
            .send(command)
            .map_err(|_| CoreError::NotConnected {
                state: SessionState::Closed,
            })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Pending session ──────────────────────────────────────────────────

/// A session whose first connect sequence is still running.
pub struct PendingSession {
    session: Session,
    ready: oneshot::Receiver<Result<(), CoreError>>,
}

impl PendingSession {
    pub fn session_id(&self) -> Uuid {
        self.session.session_id
    }

    /// Subscribe before waiting to observe every connect attempt.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.events()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.state_changes()
    }

    /// Wait until the session is `Active` or has failed for good.
    pub async fn wait(self) -> Result<Session, CoreError> {
        match self.ready.await {
            Ok(Ok(())) => Ok(self.session),
            Ok(Err(e)) => {
                self.session.close().await;
                Err(e)
            }
            Err(_) => {
                self.session.close().await;
                Err(CoreError::Internal(
                    "session driver exited before connecting".into(),
                ))
            }
        }
    }
}

impl std::fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PendingSession").field(&self.session).finish()
    }
}

/// Start a session driver for `device_id`. Must run inside a Tokio runtime.
pub(crate) fn spawn(
    config: &ClientConfig,
    device_id: &str,
    cancel: CancellationToken,
) -> Result<PendingSession, CoreError> {
    let url = channel_url(
        &config.endpoint,
        &config.channel,
        device_id,
        &config.credential.token,
    )?;

    let session_id = Uuid::new_v4();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
    let (ready_tx, ready_rx) = oneshot::channel();
    let last_activity = Arc::new(ArcSwap::from_pointee(Utc::now()));
    let correlator = StatusCorrelator::new(config.status_timeout);
    let latest = correlator.subscribe();

    let driver = Driver {
        session_id,
        device_id: device_id.to_owned(),
        user_id: config.credential.user_id.clone(),
        url,
        connect_timeout: config.connect_timeout,
        reconnect: config.reconnect.clone(),
        require_ack: config.require_connect_ack,
        transport: None,
        handshake: None,
        attempt: 0,
        retry_at: None,
        ack_deadline: None,
        last_error: None,
        ready: Some(ready_tx),
        dispatcher: Dispatcher::new(device_id, config.dispatch),
        correlator,
        commands: command_rx,
        cancel,
        state: state_tx,
        events: event_tx.clone(),
        last_activity: Arc::clone(&last_activity),
    };

    info!(%session_id, device_id, "opening PTZ session");
    let task = tokio::spawn(driver.run());

    let session = Session {
        session_id,
        device_id: device_id.to_owned(),
        encoder: CommandEncoder::new(config.encoder),
        commands: command_tx,
        state: state_rx,
        events: event_tx,
        latest,
        last_activity,
        task: Mutex::new(Some(task)),
    };

    Ok(PendingSession {
        session,
        ready: ready_rx,
    })
}

// ── Driver ───────────────────────────────────────────────────────────

struct Driver {
    session_id: Uuid,
    device_id: String,
    user_id: String,
    url: Url,
    connect_timeout: Duration,
    reconnect: ReconnectPolicy,
    require_ack: bool,

    transport: Option<Transport>,
    handshake: Option<BoxFuture<'static, ApiResult<Transport>>>,
    /// Attempt number within the current connect sequence (0 while Active).
    attempt: u32,
    retry_at: Option<Instant>,
    ack_deadline: Option<Instant>,
    last_error: Option<String>,
    /// Resolved once: when first Active, or with the error that ended the
    /// first connect sequence.
    ready: Option<ReadySender>,

    dispatcher: Dispatcher,
    correlator: StatusCorrelator,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,

    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    last_activity: Arc<ArcSwap<DateTime<Utc>>>,
}

impl Driver {
    async fn run(mut self) {
        self.start_attempt();

        while !self.current().is_terminal() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => self.shutdown().await,
                result = poll_handshake(&mut self.handshake) => self.on_handshake(result).await,
                frame = poll_frame(&mut self.transport) => self.on_frame(frame).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    // every handle is gone
                    None => self.shutdown().await,
                },
                () = sleep_until(self.dispatcher.next_deadline()) => self.flush_due().await,
                () = sleep_until(self.correlator.deadline()) => {
                    self.correlator.poll_timeout(Instant::now());
                }
                () = sleep_until(self.ack_deadline) => {
                    self.ack_deadline = None;
                    self.attempt_failed(format!(
                        "no connect_ack within {}ms",
                        self.connect_timeout.as_millis()
                    ));
                }
                () = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.start_attempt();
                }
            }
        }

        debug!(
            session_id = %self.session_id,
            device_id = %self.device_id,
            "session driver exiting"
        );
    }

    // ── Connect sequence ─────────────────────────────────────────────

    fn start_attempt(&mut self) {
        self.attempt += 1;
        self.set_state(SessionState::Connecting {
            attempt: self.attempt,
        });

        debug!(
            device_id = %self.device_id,
            attempt = self.attempt,
            url = %redacted(&self.url),
            "connecting"
        );

        let url = self.url.clone();
        let timeout = self.connect_timeout;
        self.handshake = Some(Box::pin(
            async move { Transport::connect(&url, timeout).await },
        ));
    }

    async fn on_handshake(&mut self, result: ApiResult<Transport>) {
        let transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                self.attempt_failed(e.to_string());
                return;
            }
        };

        self.transport = Some(transport);
        self.set_state(SessionState::Authenticated);

        let connect = Message::Connect(ConnectPayload {
            device_id: self.device_id.clone(),
            user_id: self.user_id.clone(),
        });
        if !self.send(connect).await {
            return;
        }

        if self.require_ack {
            self.ack_deadline = Some(Instant::now() + self.connect_timeout);
        } else {
            self.activate();
        }
    }

    fn activate(&mut self) {
        self.attempt = 0;
        self.ack_deadline = None;
        self.last_error = None;
        self.set_state(SessionState::Active);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
    }

    /// A handshake attempt (or the `connect` exchange after it) failed.
    fn attempt_failed(&mut self, reason: String) {
        self.transport = None;
        self.handshake = None;
        self.ack_deadline = None;

        warn!(
            device_id = %self.device_id,
            attempt = self.attempt,
            error = %reason,
            "connection attempt failed"
        );
        self.last_error = Some(reason);
        self.set_state(SessionState::Faulted {
            attempt: self.attempt,
        });

        let budget = self.reconnect.max_attempts.max(1);
        if self.attempt >= budget {
            let error = CoreError::ReconnectExhausted {
                attempts: self.attempt,
                last_error: self.last_error.clone().unwrap_or_default(),
            };
            self.terminate(error);
            return;
        }

        self.schedule_retry();
    }

    /// An established channel went away.
    fn connection_lost(&mut self, reason: &str) {
        warn!(device_id = %self.device_id, error = %reason, "control channel lost");

        self.transport = None;
        self.last_error = Some(reason.to_owned());
        // Buffered motion is stale once the gap is over.
        self.dispatcher.reset();
        self.attempt = 0;
        self.set_state(SessionState::Faulted { attempt: 0 });
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let delay = calculate_backoff(self.attempt.max(1), &self.reconnect);
        info!(
            device_id = %self.device_id,
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting after delay"
        );
        self.retry_at = Some(Instant::now() + delay);
    }

    fn on_connection_error(&mut self, reason: &str) {
        if self.current().is_active() {
            self.connection_lost(reason);
        } else {
            self.attempt_failed(reason.to_owned());
        }
    }

    /// Fatal end of the session without a caller-initiated close.
    fn terminate(&mut self, error: CoreError) {
        self.transport = None;
        self.handshake = None;
        self.retry_at = None;
        self.ack_deadline = None;
        self.dispatcher.reset();
        self.correlator.cancel_all(&error);

        warn!(device_id = %self.device_id, error = %error, "session terminated");
        self.set_state(SessionState::Closed);

        match self.ready.take() {
            Some(ready) => {
                let _ = ready.send(Err(error));
            }
            None => {
                let _ = self.events.send(SessionEvent::Terminated { error });
            }
        }
    }

    /// Caller-initiated (or cancellation-driven) close.
    async fn shutdown(&mut self) {
        self.set_state(SessionState::Closing);

        self.handshake = None;
        self.retry_at = None;
        self.ack_deadline = None;
        self.dispatcher.reset();
        self.correlator.cancel_all(&CoreError::Canceled);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(CoreError::Canceled));
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }

        self.set_state(SessionState::Closed);
        info!(session_id = %self.session_id, device_id = %self.device_id, "session closed");
    }

    // ── Inbound ──────────────────────────────────────────────────────

    async fn on_frame(&mut self, frame: ApiResult<Option<String>>) {
        let text = match frame {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.on_connection_error("stream ended without close frame");
                return;
            }
            Err(e) => {
                self.on_connection_error(&e.to_string());
                return;
            }
        };

        self.touch();
        match Envelope::decode(&text) {
            Ok(Some(envelope)) => self.on_message(envelope.message).await,
            Ok(None) => {}
            Err(e) => {
                warn!(device_id = %self.device_id, error = %e, "discarding malformed frame");
                let _ = self.events.send(SessionEvent::ProtocolError {
                    message: e.to_string(),
                });
            }
        }
    }

    async fn on_message(&mut self, message: Message) {
        match message {
            Message::StatusReport(report) => {
                if report.device_id != self.device_id {
                    debug!(
                        device_id = %self.device_id,
                        other = %report.device_id,
                        "ignoring status for another device"
                    );
                    return;
                }
                if let Some(error) = report.rejection() {
                    info!(device_id = %self.device_id, error, "device rejected command");
                }
                let report = self.correlator.resolve(report);
                let _ = self.events.send(SessionEvent::Status(report));
            }
            Message::ConnectAck(ack) => {
                if !(self.require_ack && self.current() == SessionState::Authenticated) {
                    debug!(device_id = %self.device_id, "ignoring unsolicited connect_ack");
                    return;
                }
                if ack.success {
                    self.activate();
                } else {
                    let reason = ack
                        .error
                        .unwrap_or_else(|| "endpoint refused the session".into());
                    if let Some(transport) = self.transport.take() {
                        transport.close().await;
                    }
                    self.terminate(CoreError::ConnectRejected { reason });
                }
            }
            other => {
                debug!(kind = %other.kind(), "ignoring outbound-only kind from device");
            }
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    async fn on_command(&mut self, command: Command) {
        if let Command::Close = command {
            self.shutdown().await;
            return;
        }

        let state = self.current();
        if !state.is_active() {
            // Issued before the channel dropped; never replayed.
            match command {
                Command::Status(waiter) => {
                    let result: StatusResult = Err(CoreError::NotConnected { state });
                    let _ = waiter.send(result);
                }
                _ => debug!(
                    device_id = %self.device_id,
                    %state,
                    "dropping command while not active"
                ),
            }
            return;
        }

        let now = Instant::now();
        match command {
            Command::Motion(intent) => self.dispatcher.submit_motion(intent, now),
            Command::Zoom(speed) => self.dispatcher.submit_zoom(speed, now),
            Command::Stop(scope) => {
                let stop = self.dispatcher.stop(scope);
                self.send(stop).await;
            }
            Command::Discrete(discrete) => {
                let message = self.dispatcher.discrete(discrete);
                self.send(message).await;
            }
            Command::Status(waiter) => {
                let request_id = self.correlator.begin(waiter, now);
                let request = self.dispatcher.status_request(request_id);
                self.send(request).await;
            }
            Command::Close => {}
        }
    }

    async fn flush_due(&mut self) {
        for message in self.dispatcher.poll_due(Instant::now()) {
            if !self.send(message).await {
                break;
            }
        }
    }

    /// Write one envelope. Returns `false` if the transport failed.
    async fn send(&mut self, message: Message) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        let kind = message.kind();
        match transport.send(&Envelope::new(message)).await {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) if e.is_protocol() => {
                warn!(device_id = %self.device_id, %kind, error = %e, "envelope not sent");
                true
            }
            Err(e) => {
                self.on_connection_error(&e.to_string());
                false
            }
        }
    }

    // ── State ────────────────────────────────────────────────────────

    fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev == next {
            return;
        }

        match next {
            SessionState::Faulted { .. } => {
                warn!(device_id = %self.device_id, from = %prev, to = %next, "session state");
            }
            SessionState::Closed => {
                info!(device_id = %self.device_id, from = %prev, to = %next, "session state");
            }
            _ => debug!(device_id = %self.device_id, from = %prev, to = %next, "session state"),
        }
        let _ = self.events.send(SessionEvent::StateChanged {
            from: prev,
            to: next,
        });
    }

    fn touch(&self) {
        self.last_activity.store(Arc::new(Utc::now()));
    }
}

// ── select! helpers ──────────────────────────────────────────────────

async fn poll_handshake(
    slot: &mut Option<BoxFuture<'static, ApiResult<Transport>>>,
) -> ApiResult<Transport> {
    match slot {
        Some(handshake) => {
            let result = handshake.await;
            *slot = None;
            result
        }
        None => pending().await,
    }
}

async fn poll_frame(transport: &mut Option<Transport>) -> ApiResult<Option<String>> {
    match transport {
        Some(transport) => transport.next_frame().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
