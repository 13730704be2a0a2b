//! Fault memory: displacement, clear requests, filters and NV persistence
//!
//! Run with: cargo test -p dem-tests --test fault_memory

use std::sync::Arc;

use dem::config::DisplacementStrategy;
use dem::{
    ClearProgress, ClientId, DemError, DtcFilter, DtcOrigin, EventId, FileNvStorage, MonitorStatus,
    NvStorage,
};
use dem_tests::{config_with_events, dtc_of, occurrences, report, settle, start_with, started};
use pretty_assertions::assert_eq;
use rstest::rstest;

const ALL_DTCS: u32 = 0xFF_FFFF;

// =============================================================================
// Displacement
// =============================================================================

#[rstest]
#[case::none(DisplacementStrategy::None)]
#[case::priority(DisplacementStrategy::Priority)]
#[case::full(DisplacementStrategy::Full)]
fn test_capacity_never_exceeded(#[case] strategy: DisplacementStrategy) {
    let mut config = config_with_events(6);
    config.memory.primary_size = 3;
    config.features.displacement = strategy;
    for (i, event) in config.events.iter_mut().enumerate() {
        event.priority = 6 - i as u8;
    }
    let (dem, _) = started(config);

    for event in [2, 5, 1, 6, 3, 4] {
        report(&dem, event, MonitorStatus::Failed);
        assert!(dem.get_number_of_event_memory_entries(DtcOrigin::Primary).unwrap() <= 3);
    }
    assert_eq!(dem.get_number_of_event_memory_entries(DtcOrigin::Primary).unwrap(), 3);
    assert!(dem.get_event_memory_overflow(DtcOrigin::Primary).unwrap());
}

#[test]
fn test_higher_priority_displaces_oldest_lower_priority() {
    let mut config = config_with_events(3);
    config.memory.primary_size = 2;
    config.events[0].priority = 5;
    config.events[1].priority = 5;
    config.events[2].priority = 1;
    let (dem, _) = started(config);

    report(&dem, 1, MonitorStatus::Failed);
    report(&dem, 2, MonitorStatus::Failed);
    assert!(!dem.get_event_memory_overflow(DtcOrigin::Primary).unwrap());
    report(&dem, 3, MonitorStatus::Failed);

    assert_eq!(occurrences(&dem, 3), Some(1));
    assert_eq!(occurrences(&dem, 1), None);
    assert_eq!(occurrences(&dem, 2), Some(1));
    assert!(dem.get_event_memory_overflow(DtcOrigin::Primary).unwrap());
}

#[test]
fn test_no_displacement_keeps_existing_entries() {
    let mut config = config_with_events(3);
    config.memory.primary_size = 2;
    config.features.displacement = DisplacementStrategy::None;
    let (dem, _) = started(config);

    for event in 1..=3 {
        report(&dem, event, MonitorStatus::Failed);
    }
    assert_eq!(occurrences(&dem, 1), Some(1));
    assert_eq!(occurrences(&dem, 2), Some(1));
    assert_eq!(occurrences(&dem, 3), None);
    // Status processing is independent of storage
    assert!(dem.get_event_failed(EventId(3)).unwrap());
}

// =============================================================================
// Clear requests
// =============================================================================

#[test]
fn test_second_client_gets_clear_busy() {
    let (dem, _) = started(config_with_events(2));
    report(&dem, 1, MonitorStatus::Failed);

    assert_eq!(
        dem.clear_dtc(ClientId(1), ALL_DTCS, DtcOrigin::Primary).unwrap(),
        ClearProgress::Pending
    );
    assert!(matches!(
        dem.clear_dtc(ClientId(2), ALL_DTCS, DtcOrigin::Primary),
        Err(DemError::ClearBusy)
    ));

    settle(&dem);
    assert_eq!(
        dem.clear_dtc(ClientId(1), ALL_DTCS, DtcOrigin::Primary).unwrap(),
        ClearProgress::Completed
    );
    // The slot is free again
    assert_eq!(
        dem.clear_dtc(ClientId(2), dtc_of(2), DtcOrigin::Primary).unwrap(),
        ClearProgress::Pending
    );
}

#[test]
fn test_clear_single_dtc_keeps_others() {
    let (dem, _) = started(config_with_events(2));
    report(&dem, 1, MonitorStatus::Failed);
    report(&dem, 2, MonitorStatus::Failed);

    dem.clear_dtc(ClientId(1), dtc_of(1), DtcOrigin::Primary).unwrap();
    settle(&dem);
    assert_eq!(
        dem.clear_dtc(ClientId(1), dtc_of(1), DtcOrigin::Primary).unwrap(),
        ClearProgress::Completed
    );
    assert_eq!(occurrences(&dem, 1), None);
    assert_eq!(occurrences(&dem, 2), Some(1));
    assert!(dem.get_event_failed(EventId(2)).unwrap());
}

#[test]
fn test_clear_rejects_unknown_dtc_and_origin() {
    let (dem, _) = started(config_with_events(1));
    assert!(matches!(
        dem.clear_dtc(ClientId(1), 0x123456, DtcOrigin::Primary),
        Err(DemError::WrongDtc(0x123456))
    ));
    assert!(matches!(
        dem.clear_dtc(ClientId(1), ALL_DTCS, DtcOrigin::Permanent),
        Err(DemError::WrongDtcOrigin(_))
    ));
}

#[test]
fn test_clear_reports_memory_error() {
    let (dem, nv) = started(config_with_events(1));
    report(&dem, 1, MonitorStatus::Failed);
    settle(&dem);

    nv.set_fail_writes(true);
    dem.clear_dtc(ClientId(1), ALL_DTCS, DtcOrigin::Primary).unwrap();
    settle(&dem);
    assert!(matches!(
        dem.clear_dtc(ClientId(1), ALL_DTCS, DtcOrigin::Primary),
        Err(DemError::ClearMemoryError(_))
    ));
    // RAM is cleared regardless
    assert!(!dem.get_event_failed(EventId(1)).unwrap());
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_filter_iterates_matching_dtcs() {
    let (dem, _) = started(config_with_events(4));
    report(&dem, 1, MonitorStatus::Failed);
    report(&dem, 3, MonitorStatus::Failed);
    report(&dem, 3, MonitorStatus::Passed);

    let client = ClientId(1);
    dem.set_dtc_filter(client, DtcFilter::status(0x01, DtcOrigin::Primary)).unwrap();
    assert_eq!(dem.get_number_of_filtered_dtc(client).unwrap(), 1);

    dem.set_dtc_filter(client, DtcFilter::status(0x08, DtcOrigin::Primary)).unwrap();
    assert_eq!(dem.get_number_of_filtered_dtc(client).unwrap(), 2);
    let mut found = Vec::new();
    while let Ok((dtc, status)) = dem.get_next_filtered_dtc(client) {
        assert!(status.confirmed());
        found.push(dtc);
    }
    found.sort_unstable();
    assert_eq!(found, vec![dtc_of(1), dtc_of(3)]);
    assert!(matches!(
        dem.get_next_filtered_dtc(client),
        Err(DemError::NoSuchElement)
    ));
}

// =============================================================================
// NV persistence
// =============================================================================

#[test]
fn test_file_nv_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let nv: Arc<dyn NvStorage> = Arc::new(FileNvStorage::new(dir.path()).unwrap());

    let dem = start_with(config_with_events(2), nv.clone());
    report(&dem, 2, MonitorStatus::Failed);
    dem.shutdown().unwrap();

    let nv: Arc<dyn NvStorage> = Arc::new(FileNvStorage::new(dir.path()).unwrap());
    let dem = dem::Dem::new(config_with_events(2), nv, Arc::new(dem::NoDataProvider)).unwrap();
    let restored = dem.init().unwrap();
    assert!(restored.layout_matched);
    assert_eq!(restored.entries, 1);
    assert_eq!(restored.reinitialised, 0);

    let status = dem.get_event_udsstatus(EventId(2)).unwrap();
    assert!(status.confirmed());
    assert!(status.failed_since_clear());
    // A new cycle started at init
    assert!(!status.test_failed_this_cycle());
    assert_eq!(occurrences(&dem, 2), Some(1));
    assert!(!dem.get_event_failed(EventId(1)).unwrap());
}

#[test]
fn test_layout_change_discards_nv() {
    let dir = tempfile::tempdir().unwrap();
    let nv: Arc<dyn NvStorage> = Arc::new(FileNvStorage::new(dir.path()).unwrap());
    let dem = start_with(config_with_events(2), nv.clone());
    report(&dem, 1, MonitorStatus::Failed);
    dem.shutdown().unwrap();

    let dem = dem::Dem::new(config_with_events(3), nv, Arc::new(dem::NoDataProvider)).unwrap();
    let restored = dem.init().unwrap();
    assert!(!restored.layout_matched);
    assert_eq!(restored.entries, 0);
    assert!(!dem.get_event_failed(EventId(1)).unwrap());
}
