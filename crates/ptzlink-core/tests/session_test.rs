// Session integration tests against an in-process WebSocket device.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{MockDevice, STATUS_TIMEOUT, THROTTLE, TOKEN, config, dead_endpoint};
use ptzlink_api::{AxisReading, AxisValue, ConnectAck, Message, StatusReport};
use ptzlink_core::{CoreError, GestureInput, PtzClient, SessionEvent, SessionState};
use tokio::sync::broadcast;

// ── Helpers ─────────────────────────────────────────────────────────

fn status(device_id: &str, pan: f64, request_id: Option<uuid::Uuid>) -> Message {
    Message::StatusReport(StatusReport {
        device_id: device_id.into(),
        success: true,
        pan: Some(AxisReading {
            position: Some(AxisValue { x: pan }),
            speed: None,
        }),
        tilt: None,
        zoom: None,
        error: None,
        request_id,
    })
}

fn request_id_of(message: &Message) -> Option<uuid::Uuid> {
    match message {
        Message::GetStatus(req) => req.request_id,
        other => panic!("expected get_status, got {other:?}"),
    }
}

/// Collect state transitions until `done` matches one, or panic after 5s.
async fn transitions_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    done: impl Fn(SessionState) -> bool,
) -> Vec<SessionState> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SessionEvent::StateChanged { to, .. }) = events.recv().await {
                seen.push(to);
                if done(to) {
                    break;
                }
            }
        }
    })
    .await
    .expect("state transition did not happen in time");
    seen
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_acquire_sends_connect_and_carries_token_in_url() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));

    let session = client.acquire("cam-1").await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.device_id(), "cam-1");

    let uri = device.expect_connected().await;
    assert!(uri.starts_with("/ptz/cam-1?"), "{uri}");
    assert!(uri.contains(&format!("token={TOKEN}")), "{uri}");

    match device.expect_message().await {
        Message::Connect(payload) => {
            assert_eq!(payload.device_id, "cam-1");
            assert_eq!(payload.user_id, common::USER);
        }
        other => panic!("expected connect, got {other:?}"),
    }

    session.close().await;
    device.expect_disconnected().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_reconnect_budget_exhausted() {
    let client = PtzClient::new(config(dead_endpoint()));
    let pending = client.open("cam-1").unwrap();
    let mut events = pending.events();

    let err = pending.wait().await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        CoreError::ReconnectExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected ReconnectExhausted, got {other:?}"),
    }

    let mut faulted = 0;
    let mut connecting = 0;
    let mut last = None;
    let mut terminated = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::StateChanged { to, .. } => {
                match to {
                    SessionState::Faulted { .. } => faulted += 1,
                    SessionState::Connecting { .. } => connecting += 1,
                    _ => {}
                }
                last = Some(to);
            }
            SessionEvent::Terminated { .. } => terminated += 1,
            _ => {}
        }
    }
    assert_eq!(connecting, 3);
    assert_eq!(faulted, 3);
    assert_eq!(last, Some(SessionState::Closed));
    // The terminal error went to the waiting caller, not the event stream.
    assert_eq!(terminated, 0);
}

#[tokio::test]
async fn test_device_busy_until_closed() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));

    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let err = client.open("cam-1").unwrap_err();
    assert!(matches!(err, CoreError::DeviceBusy { .. }));

    session.close().await;
    device.expect_disconnected().await;
    assert!(client.active_devices().is_empty());

    let again = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;
    assert_ne!(again.session_id(), session.session_id());
    again.close().await;
}

#[tokio::test]
async fn test_switch_moves_control_to_another_device() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));

    let first = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let second = client.switch(first, "cam-2").await.unwrap();
    device.expect_disconnected().await;
    let uri = device.expect_session().await;
    assert!(uri.starts_with("/ptz/cam-2?"), "{uri}");
    assert_eq!(client.active_devices(), vec!["cam-2".to_owned()]);
    second.close().await;
}

// ── Acknowledgment gating ───────────────────────────────────────────

#[tokio::test]
async fn test_connect_ack_gates_activation() {
    let mut device = MockDevice::start().await;
    let mut cfg = config(device.endpoint());
    cfg.require_connect_ack = true;
    let client = PtzClient::new(cfg);

    let pending = client.open("cam-1").unwrap();
    let mut states = pending.state_changes();
    device.expect_session().await;

    states
        .wait_for(|s| *s == SessionState::Authenticated)
        .await
        .unwrap();

    device.send(Message::ConnectAck(ConnectAck {
        device_id: "cam-1".into(),
        success: true,
        error: None,
    }));
    let session = pending.wait().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    session.close().await;
}

#[tokio::test]
async fn test_connect_ack_rejection_is_fatal() {
    let mut device = MockDevice::start().await;
    let mut cfg = config(device.endpoint());
    cfg.require_connect_ack = true;
    let client = PtzClient::new(cfg);

    let pending = client.open("cam-1").unwrap();
    device.expect_session().await;
    device.send(Message::ConnectAck(ConnectAck {
        device_id: "cam-1".into(),
        success: false,
        error: Some("unknown device".into()),
    }));

    let err = pending.wait().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CoreError::ConnectRejected { ref reason } if reason == "unknown device"));
}

// ── Status correlation ──────────────────────────────────────────────

#[tokio::test]
async fn test_status_resolves_and_updates_latest() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;
    assert!(session.latest_status().is_none());

    let (result, ()) = tokio::join!(session.get_status(), async {
        let request = device.expect_message().await;
        let id = request_id_of(&request);
        assert!(id.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        device.send(status("cam-1", 0.3, id));
    });

    let report = result.unwrap();
    assert!(report.success);
    assert_eq!(report.pan.and_then(|p| p.position()), Some(0.3));
    assert_eq!(session.latest_status().as_deref(), Some(&*report));
    session.close().await;
}

#[tokio::test]
async fn test_status_times_out_once() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let started = tokio::time::Instant::now();
    let err = session.get_status().await.unwrap_err();
    assert!(matches!(err, CoreError::StatusTimeout { .. }), "{err:?}");
    assert!(started.elapsed() >= STATUS_TIMEOUT);

    // The late answer only updates the latest-known cell.
    let _ = device.expect_message().await;
    device.send(status("cam-1", 0.8, None));
    let mut updates = session.status_updates();
    let pushed = tokio::time::timeout(Duration::from_secs(2), updates.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.pan.and_then(|p| p.position()), Some(0.8));
    session.close().await;
}

#[tokio::test]
async fn test_rejected_command_is_a_normal_result() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let (result, ()) = tokio::join!(session.get_status(), async {
        let request = device.expect_message().await;
        device.send(Message::StatusReport(StatusReport {
            device_id: "cam-1".into(),
            success: false,
            pan: None,
            tilt: None,
            zoom: None,
            error: Some("motor fault".into()),
            request_id: request_id_of(&request),
        }));
    });

    let report = result.unwrap();
    assert_eq!(report.rejection(), Some("motor fault"));
    session.close().await;
}

#[tokio::test]
async fn test_concurrent_status_requests_share_one_resolution() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let (a, b, ()) = tokio::join!(session.get_status(), session.get_status(), async {
        let first = device.expect_message().await;
        let second = device.expect_message().await;
        assert_ne!(request_id_of(&first), request_id_of(&second));
        device.send(status("cam-1", 0.4, request_id_of(&second)));
    });

    assert_eq!(a.unwrap().pan, b.unwrap().pan);
    session.close().await;
}

#[tokio::test]
async fn test_close_cancels_pending_status() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let (result, ()) = tokio::join!(session.get_status(), async {
        let _ = device.expect_message().await;
        session.close().await;
    });

    assert!(matches!(result, Err(CoreError::Canceled)), "{result:?}");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.stop(),
        Err(CoreError::NotConnected {
            state: SessionState::Closed
        })
    ));
}

#[tokio::test]
async fn test_bad_frames_are_discarded_without_faulting() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    let mut events = session.events();
    device.expect_session().await;

    device.send_raw(r#"{"kind":"firmware_update","payload":{},"timestamp":1}"#);
    device.send_raw(r#"{"kind":"status_report","payload":{"device_id":"cam-1"},"timestamp":1}"#);
    device.send(status("cam-9", 0.1, None));
    device.send(status("cam-1", 0.6, None));

    let mut protocol_errors = 0;
    let report = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                SessionEvent::ProtocolError { .. } => protocol_errors += 1,
                SessionEvent::Status(report) => break report,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(protocol_errors, 1);
    assert_eq!(report.device_id, "cam-1");
    assert_eq!(session.state(), SessionState::Active);
    session.close().await;
}

// ── Motion dispatch ─────────────────────────────────────────────────

#[tokio::test]
async fn test_burst_of_moves_sends_only_latest() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    for i in 1..=10_u32 {
        session
            .move_gesture(GestureInput::new(f64::from(i) / 10.0, 0.0, 1.0))
            .unwrap();
    }

    match device.expect_message().await {
        Message::Move(payload) => {
            assert_eq!(payload.pan_speed, 1.0);
            assert_eq!(payload.tilt_speed, 0.5);
        }
        other => panic!("expected move, got {other:?}"),
    }
    device.assert_quiet(THROTTLE * 3).await;
    session.close().await;
}

#[tokio::test]
async fn test_release_sends_single_stop_after_coalesced_moves() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    session.move_gesture(GestureInput::new(0.5, 0.5, 1.0)).unwrap();
    assert!(matches!(device.expect_message().await, Message::Move(_)));

    for _ in 0..5 {
        session.move_gesture(GestureInput::new(-0.8, 0.2, 0.9)).unwrap();
    }
    session.release().unwrap();

    match device.expect_message().await {
        Message::Stop(stop) => {
            assert!(stop.stop_pan_tilt);
            assert!(!stop.stop_zoom);
        }
        other => panic!("expected stop, got {other:?}"),
    }
    device.assert_quiet(THROTTLE * 3).await;
    session.close().await;
}

#[tokio::test]
async fn test_neutral_gesture_is_a_release() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let intent = session.move_gesture(GestureInput::RELEASED).unwrap();
    assert_eq!((intent.pan, intent.tilt), (0.5, 0.5));
    assert!(matches!(device.expect_message().await, Message::Stop(_)));
    session.close().await;
}

#[tokio::test]
async fn test_zoom_and_discrete_commands() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    session.apply_preset("home").unwrap();
    session.start_patrol(Some("perimeter".into())).unwrap();
    assert_eq!(session.zoom_to_level(75.0).unwrap(), 0.5);

    // Discrete commands go out immediately and in order.
    match device.expect_message().await {
        Message::PresetApply(p) => assert_eq!(p.preset_id, "home"),
        other => panic!("expected preset_apply, got {other:?}"),
    }
    match device.expect_message().await {
        Message::PatrolStart(p) => assert_eq!(p.pattern_id.as_deref(), Some("perimeter")),
        other => panic!("expected patrol_start, got {other:?}"),
    }
    match device.expect_message().await {
        Message::Zoom(z) => assert_eq!(z.zoom_speed, 0.5),
        other => panic!("expected zoom, got {other:?}"),
    }

    session.release_zoom().unwrap();
    match device.expect_message().await {
        Message::Stop(stop) => assert!(stop.stop_zoom && !stop.stop_pan_tilt),
        other => panic!("expected stop, got {other:?}"),
    }

    assert!(matches!(
        session.apply_preset(" "),
        Err(CoreError::InvalidInput { .. })
    ));
    session.close().await;
}

// ── Transport loss ──────────────────────────────────────────────────

#[tokio::test]
async fn test_lost_channel_blocks_dispatch_then_recovers_without_replay() {
    let mut device = MockDevice::start().await;
    let mut cfg = config(device.endpoint());
    cfg.reconnect.initial_delay = Duration::from_millis(300);
    cfg.dispatch.throttle_interval = Duration::from_secs(1);
    let client = PtzClient::new(cfg);

    let session = client.acquire("cam-1").await.unwrap();
    let session_id = session.session_id();
    let mut events = session.events();
    device.expect_session().await;

    // Buffered, never flushed before the drop.
    session.move_gesture(GestureInput::new(1.0, 1.0, 1.0)).unwrap();
    device.drop_connection();
    device.expect_disconnected().await;

    transitions_until(&mut events, |s| matches!(s, SessionState::Faulted { .. })).await;
    assert!(matches!(
        session.release(),
        Err(CoreError::NotConnected { .. })
    ));
    assert!(matches!(
        session.get_status().await,
        Err(CoreError::NotConnected { .. })
    ));

    let seen = transitions_until(&mut events, SessionState::is_active).await;
    assert!(seen.contains(&SessionState::Connecting { attempt: 1 }));
    device.expect_session().await;
    assert_eq!(session.session_id(), session_id);

    // The stale move is gone.
    device.assert_quiet(Duration::from_millis(1200)).await;
    session.close().await;
}

#[tokio::test]
async fn test_lost_channel_exhausts_budget_and_terminates() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    let mut events = session.events();
    device.expect_session().await;

    // Listener and socket both go away; every reconnect is refused.
    drop(device);

    let mut faulted = Vec::new();
    let mut connecting = 0;
    let mut terminal = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StateChanged { to, .. }) => match to {
                    SessionState::Faulted { attempt } => faulted.push(attempt),
                    SessionState::Connecting { .. } => connecting += 1,
                    SessionState::Closed => break,
                    _ => {}
                },
                Ok(SessionEvent::Terminated { error }) => terminal.push(error),
                Ok(_) => {}
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("session did not close in time");

    // The Terminated event follows Closed on the same channel.
    if let Ok(SessionEvent::Terminated { error }) =
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no terminal error delivered")
    {
        terminal.push(error);
    }
    assert!(events.try_recv().is_err());

    // One loss of the active channel, then three refused attempts.
    assert_eq!(faulted, [0, 1, 2, 3]);
    assert_eq!(connecting, 3);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(
        terminal[0],
        CoreError::ReconnectExhausted { attempts: 3, .. }
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.stop(),
        Err(CoreError::NotConnected { .. })
    ));
}

#[tokio::test]
async fn test_last_activity_tracks_traffic() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let before = session.last_activity();
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.stop().unwrap();
    let _ = device.expect_message().await;
    assert!(session.last_activity() > before);
    session.close().await;
}

#[tokio::test]
async fn test_client_shutdown_closes_sessions() {
    let mut device = MockDevice::start().await;
    let client = PtzClient::new(config(device.endpoint()));
    let session = client.acquire("cam-1").await.unwrap();
    device.expect_session().await;

    let mut states = session.state_changes();
    client.shutdown();
    states.wait_for(|s| s.is_terminal()).await.unwrap();
    device.expect_disconnected().await;
    assert!(client.active_devices().is_empty());
}
