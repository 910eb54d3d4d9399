//! Reconnection supervisor tests against a scripted transport.
//!
//! Timer tests run on a paused clock, so backoff delays elapse instantly
//! but keep their exact spacing.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::time::Duration;

use common::{target, ScriptedTransport, Step};
use talkpush_core::NotConnected;
use talkpushd::supervisor::{LinearBackoff, SupervisorError, INBOUND_BUFFER};
use talkpushd::transport::{Outbound, SessionDriver, TransportEvent, CLOSE_NORMAL};
use talkpushd::{spawn_supervisor, ConnectionState, SupervisorHandle};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

// ============================================================================
// Test Helpers
// ============================================================================

async fn wait_for_state(handle: &SupervisorHandle, state: ConnectionState) {
    let mut status = handle.watch_status();
    timeout(Duration::from_secs(120), status.wait_for(|s| s.state == state))
        .await
        .expect("state not reached")
        .expect("supervisor gone");
}

async fn next_driver(drivers: &mut mpsc::UnboundedReceiver<SessionDriver>) -> SessionDriver {
    timeout(Duration::from_secs(120), drivers.recv())
        .await
        .expect("no session opened")
        .expect("transport dropped")
}

// ============================================================================
// Backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_delays_grow_linearly_then_cap() {
    let transport = ScriptedTransport::always_failing();
    let (handle, _inbound) = spawn_supervisor(transport.clone(), LinearBackoff::default());

    handle.start(target()).await.unwrap();
    sleep(Duration::from_secs(200)).await;

    let gaps = transport.gaps_secs();
    assert!(gaps.len() >= 8, "too few attempts: {gaps:?}");
    assert_eq!(&gaps[..7], &[5, 10, 15, 20, 25, 30, 30]);
    assert!(gaps[7..].iter().all(|g| *g == 30));

    let status = handle.status();
    assert!(status.desired);
    assert!(status.attempt >= 8);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_retry() {
    let transport = ScriptedTransport::always_failing();
    let (handle, _inbound) = spawn_supervisor(transport.clone(), LinearBackoff::default());

    handle.start(target()).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    handle.stop().await.unwrap();
    sleep(Duration::from_secs(300)).await;

    assert_eq!(transport.open_count(), 1);
    let status = handle.status();
    assert_eq!(status.state, ConnectionState::Stopped);
    assert!(!status.desired);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempts() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Fail, Step::Fail, Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport.clone(), LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    assert_eq!(transport.gaps_secs(), vec![5, 10]);
    let status = handle.status();
    assert_eq!(status.attempt, 0);
    assert!(status.last_opened_at.is_some());

    // server closes: the next attempt waits one unit again
    driver
        .finish(TransportEvent::Closed {
            code: CLOSE_NORMAL,
            reason: "bye".into(),
        })
        .await;
    sleep(Duration::from_secs(6)).await;

    assert_eq!(transport.open_count(), 4);
    assert_eq!(transport.gaps_secs()[2], 5);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_schedules_retry() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept, Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport.clone(), LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let driver = next_driver(&mut drivers).await;
    driver
        .finish(TransportEvent::Failed("connection reset".into()))
        .await;
    wait_for_state(&handle, ConnectionState::Failed).await;
    assert_eq!(handle.status().attempt, 1);

    next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(transport.gaps_secs(), vec![5]);
}

// ============================================================================
// Frames
// ============================================================================

#[tokio::test]
async fn test_inbound_frames_keep_wire_order() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, mut inbound) = spawn_supervisor(transport, LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let driver = next_driver(&mut drivers).await;

    for frame in ["a", "b", "c"] {
        driver
            .events
            .send(TransportEvent::Frame(frame.into()))
            .await
            .unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(timeout(Duration::from_secs(1), inbound.recv()).await.unwrap().unwrap());
    }
    assert_eq!(received, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_unread_inbound_does_not_block_commands() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, mut inbound) = spawn_supervisor(transport, LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let mut driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    // nobody reads inbound while the server keeps pushing
    for i in 0..INBOUND_BUFFER + 50 {
        driver
            .events
            .send(TransportEvent::Frame(i.to_string()))
            .await
            .unwrap();
    }
    while driver.events.capacity() < driver.events.max_capacity() {
        sleep(Duration::from_millis(5)).await;
    }

    timeout(Duration::from_secs(1), handle.send("still here"))
        .await
        .expect("send blocked by inbound backlog")
        .unwrap();
    assert_eq!(
        driver.outbound.recv().await,
        Some(Outbound::Text("still here".into()))
    );
    timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("stop blocked by inbound backlog")
        .unwrap();

    // the oldest frames are kept, the overflow is dropped
    let mut received = Vec::new();
    while let Ok(frame) = inbound.try_recv() {
        received.push(frame);
    }
    assert_eq!(received.len(), INBOUND_BUFFER);
    assert_eq!(received[0], "0");
    assert_eq!(received[INBOUND_BUFFER - 1], (INBOUND_BUFFER - 1).to_string());
}

#[tokio::test]
async fn test_send_requires_live_connection() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport, LinearBackoff::default());

    assert_eq!(
        handle.send("early").await,
        Err(SupervisorError::NotConnected(NotConnected))
    );

    handle.start(target()).await.unwrap();
    let mut driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    handle.send("hi").await.unwrap();
    assert_eq!(driver.outbound.recv().await, Some(Outbound::Text("hi".into())));
}

#[tokio::test]
async fn test_send_after_peer_close_fails() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport, LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    driver.mark_closed();
    assert_eq!(
        handle.send("late").await,
        Err(SupervisorError::NotConnected(NotConnected))
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_restart_closes_previous_session() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept, Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport.clone(), LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let mut first = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    handle.start(target()).await.unwrap();
    match first.outbound.recv().await {
        Some(Outbound::Close { code, .. }) => assert_eq!(code, CLOSE_NORMAL),
        other => panic!("expected close, got {other:?}"),
    }

    next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_stop_closes_live_session() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport, LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let mut driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    handle.stop().await.unwrap();
    assert_eq!(
        driver.outbound.recv().await,
        Some(Outbound::Close {
            code: CLOSE_NORMAL,
            reason: "Service stopped".into(),
        })
    );
    assert_eq!(handle.status().state, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_dropping_handle_closes_session() {
    let (transport, mut drivers) = ScriptedTransport::new(&[Step::Accept]);
    let (handle, _inbound) = spawn_supervisor(transport, LinearBackoff::default());

    handle.start(target()).await.unwrap();
    let mut driver = next_driver(&mut drivers).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    drop(handle);
    let close = timeout(Duration::from_secs(1), driver.outbound.recv())
        .await
        .unwrap();
    assert!(matches!(close, Some(Outbound::Close { .. })));
}
