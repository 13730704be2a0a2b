//! Notification delivery to broadcast subscribers and listeners
//!
//! Run with: cargo test -p dem-tests --test notifications

use std::sync::Arc;
use std::time::Duration;

use dem::{
    status_bit, ClearProgress, ClientId, DtcOrigin, EventId, MonitorStatus, Notification, RecordingListener,
    UdsStatus,
};
use dem_tests::{config_with_events, dtc_of, report, settle, started};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_test::{assert_pending, assert_ready_ok};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn test_subscriber_receives_status_changes() {
    let (dem, _) = started(config_with_events(1));
    let mut rx = dem.subscribe();

    dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
    dem.main_function();

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification within a second")
        .unwrap();
    let mut seen = vec![first];
    seen.extend(drain(&mut rx));

    let untested = UdsStatus::from_bits(status_bit::TNCTOC);
    assert!(seen.contains(&Notification::DtcStatusChanged {
        dtc: dtc_of(1),
        old: untested,
        new: UdsStatus::from_bits(0x2F),
    }));
    assert!(seen.contains(&Notification::EventStatusChanged {
        event: EventId(1),
        old: untested,
        new: UdsStatus::from_bits(0x2F),
    }));
    assert!(seen.contains(&Notification::EventDataChanged { event: EventId(1) }));
}

#[test]
fn test_receiver_woken_by_main_function() {
    let (dem, _) = started(config_with_events(1));
    let mut rx = dem.subscribe();
    {
        let mut recv = tokio_test::task::spawn(rx.recv());
        assert_pending!(recv.poll());

        // Queued reports notify nothing until processed
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert!(!recv.is_woken());

        dem.main_function();
        assert!(recv.is_woken());
        assert_ready_ok!(recv.poll());
    }
    drain(&mut rx);
}

#[test]
fn test_duplicate_report_is_silent() {
    let (dem, _) = started(config_with_events(1));
    report(&dem, 1, MonitorStatus::Failed);
    let mut rx = dem.subscribe();

    report(&dem, 1, MonitorStatus::Failed);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn test_listener_sees_clear_completion() {
    let (dem, _) = started(config_with_events(2));
    report(&dem, 1, MonitorStatus::Failed);

    let listener = Arc::new(RecordingListener::new());
    dem.add_listener(listener.clone());
    let client = ClientId(3);
    assert_eq!(
        dem.clear_dtc(client, 0xFF_FFFF, DtcOrigin::Primary).unwrap(),
        ClearProgress::Pending
    );
    settle(&dem);

    let received = listener.take();
    assert!(received.contains(&Notification::ClearDtcCompleted {
        client,
        success: true
    }));
    // The clear itself is silent apart from the completion
    assert!(!received
        .iter()
        .any(|n| matches!(n, Notification::DtcStatusChanged { .. })));
}
