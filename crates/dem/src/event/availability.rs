use tracing::info;

use crate::error::{DemError, DemResult};
use crate::ids::EventId;
use crate::monitor::MonitorState;
use crate::state::DemState;
use crate::status::{StoredStatus, UdsStatus};

impl DemState {
    /// Connect or disconnect an event
    ///
    /// A disconnected event reports status 0x00 and ignores monitor
    /// results; its DTC is hidden once all member events are disconnected.
    /// An event whose DTC is stored cannot be disconnected.
    pub(crate) fn set_available(
        &mut self,
        monitor: &mut MonitorState,
        event: EventId,
        available: bool,
    ) -> DemResult<()> {
        let data = self.store.event(event).ok_or(DemError::InvalidEvent(event.0))?;
        if data.internal.disconnected != available {
            return Ok(());
        }
        let rep = self.tables.representative(event);
        if !available {
            let stored = self.store.event(rep).map_or(StoredStatus::None, |d| d.internal.stored);
            if stored != StoredStatus::None {
                return Err(DemError::Rejected(format!(
                    "event {} has a stored DTC and cannot be disconnected",
                    event.0
                )));
            }
        }

        let Some(before) = self.snapshot(event) else {
            return Err(DemError::InvalidEvent(event.0));
        };
        if let Some(data) = self.store.event_mut(event) {
            data.internal.disconnected = !available;
            data.uds = if available {
                UdsStatus::NOT_COMPLETED
            } else {
                UdsStatus::CLEARED
            };
        }
        monitor.set_available(event, available);
        self.commit(before);
        info!(event = %event, available, "Event availability changed");
        Ok(())
    }

    /// Disconnect events that are unavailable by default, without notifications
    pub(crate) fn apply_default_availability(&mut self) {
        let cfg = std::sync::Arc::clone(&self.cfg);
        for (i, event_cfg) in cfg.events.iter().enumerate() {
            if event_cfg.available_by_default {
                continue;
            }
            let event = EventId(i as u16 + 1);
            let rep = self.tables.representative(event);
            let stored = self.store.event(rep).map_or(StoredStatus::None, |d| d.internal.stored);
            if stored != StoredStatus::None {
                tracing::warn!(event = %event, "Stored event kept available");
                continue;
            }
            if let Some(data) = self.store.event_mut(event) {
                data.internal.disconnected = true;
                data.uds = UdsStatus::CLEARED;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemConfig, DtcConfig, EventConfig};
    use crate::ids::{CycleId, DtcIndex};
    use crate::notify::Notification;
    use crate::state::tests::state_for;

    fn setup() -> (DemState, MonitorState) {
        let mut config = DemConfig::default();
        config.dtcs.push(DtcConfig::new(0x010100));
        config.events.push(EventConfig::new("a", Some(0x010100)));
        config.events.push(EventConfig::new("b", Some(0x010100)));
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        (state, monitor)
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let (mut state, mut monitor) = setup();
        state.outbox.clear();
        state.set_available(&mut monitor, EventId(2), false).unwrap();
        assert_eq!(state.store.status(EventId(2)), UdsStatus::CLEARED);
        assert!(!monitor.is_available(EventId(2)));
        assert!(state.dtc_available(DtcIndex(0)));

        state.set_available(&mut monitor, EventId(1), false).unwrap();
        assert!(!state.dtc_available(DtcIndex(0)));

        state.set_available(&mut monitor, EventId(1), true).unwrap();
        assert_eq!(state.store.status(EventId(1)), UdsStatus::NOT_COMPLETED);
        assert!(state
            .outbox
            .iter()
            .any(|n| matches!(n, Notification::EventStatusChanged { event, .. } if *event == EventId(1))));
    }

    #[test]
    fn test_stored_event_cannot_disconnect() {
        let (mut state, mut monitor) = setup();
        state.process_failed(EventId(1), 127);
        // Combined DTC on storage: both members share the entry
        assert!(state.set_available(&mut monitor, EventId(2), false).is_err());
    }

    #[test]
    fn test_repeated_request_is_noop() {
        let (mut state, mut monitor) = setup();
        state.outbox.clear();
        state.set_available(&mut monitor, EventId(1), true).unwrap();
        assert!(state.outbox.is_empty());
    }
}
