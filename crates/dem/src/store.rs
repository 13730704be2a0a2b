//! Status data store
//!
//! Dense arrays indexed by event id (slot 0 unused), DTC index, MIL group
//! and indicator. All access goes through bounds-checked accessors; an
//! out-of-range index is a runtime check failure and the access yields
//! `None`.

use crate::ids::{DtcIndex, EventId, IndicatorId, MilGroupId};
use crate::runtime_check::{RuntimeCheck, RuntimeChecks};
use crate::status::{ExtendedStatus, InternalStatus, QualifyStatus, UdsStatus};

/// Upper bound of the pending-event count of a MIL group
pub const MIL_PENDING_MAX: u8 = 0x7F;

/// Per-event status data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatusData {
    pub uds: UdsStatus,
    pub ext: ExtendedStatus,
    pub internal: InternalStatus,
    pub trip_count: u8,
    pub healing_count: u8,
    pub qualify: QualifyStatus,
}

impl EventStatusData {
    /// Status as seen by clients: unqualified CDTC/WIR masked
    pub fn external(&self) -> UdsStatus {
        if self.internal.disconnected {
            return UdsStatus::CLEARED;
        }
        self.qualify.apply(self.uds)
    }
}

/// Trip and pending accounting of a MIL group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MilGroupState {
    pub trip_count: u8,
    pub pending_count: u8,
    /// Trip counter already advanced in the current cycle
    pub incremented_this_cycle: bool,
}

/// Indicator request bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorState {
    /// Number of events currently requesting the indicator
    pub requests: u16,
}

/// Indicator as presented to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStatus {
    Off,
    Continuous,
}

#[derive(Debug, Clone)]
pub struct StatusStore {
    events: Vec<EventStatusData>,
    dtc_status: Vec<UdsStatus>,
    mil_groups: Vec<MilGroupState>,
    indicators: Vec<IndicatorState>,
    checks: RuntimeChecks,
}

impl StatusStore {
    pub fn new(
        event_count: usize,
        dtc_count: usize,
        mil_group_count: usize,
        indicator_count: usize,
        checks: RuntimeChecks,
    ) -> Self {
        Self {
            events: vec![EventStatusData::default(); event_count + 1],
            dtc_status: vec![UdsStatus::CLEARED; dtc_count],
            mil_groups: vec![MilGroupState::default(); mil_group_count],
            indicators: vec![IndicatorState::default(); indicator_count],
            checks,
        }
    }

    fn valid_event(&self, id: EventId) -> bool {
        id.is_valid() && id.index() < self.events.len()
    }

    pub fn event(&self, id: EventId) -> Option<&EventStatusData> {
        if !self.valid_event(id) {
            self.checks.failed(RuntimeCheck::EventIndex, id);
            return None;
        }
        self.events.get(id.index())
    }

    pub fn event_mut(&mut self, id: EventId) -> Option<&mut EventStatusData> {
        if !self.valid_event(id) {
            self.checks.failed(RuntimeCheck::EventIndex, id);
            return None;
        }
        self.events.get_mut(id.index())
    }

    /// Internal UDS status, cleared for invalid ids
    pub fn status(&self, id: EventId) -> UdsStatus {
        self.event(id).map(|e| e.uds).unwrap_or_default()
    }

    pub fn event_count(&self) -> usize {
        self.events.len() - 1
    }

    /// Stored group status of a combined DTC
    pub fn dtc_status(&self, dtc: DtcIndex) -> UdsStatus {
        match self.dtc_status.get(dtc.index()) {
            Some(status) => *status,
            None => {
                self.checks.failed(RuntimeCheck::DtcIndex, dtc.0);
                UdsStatus::CLEARED
            }
        }
    }

    pub fn set_dtc_status(&mut self, dtc: DtcIndex, status: UdsStatus) {
        match self.dtc_status.get_mut(dtc.index()) {
            Some(slot) => *slot = status,
            None => self.checks.failed(RuntimeCheck::DtcIndex, dtc.0),
        }
    }

    pub fn mil_group(&self, group: MilGroupId) -> Option<&MilGroupState> {
        let state = self.mil_groups.get(group.index());
        if state.is_none() {
            self.checks.failed(RuntimeCheck::MilGroupIndex, group.0);
        }
        state
    }

    pub fn mil_group_mut(&mut self, group: MilGroupId) -> Option<&mut MilGroupState> {
        if group.index() >= self.mil_groups.len() {
            self.checks.failed(RuntimeCheck::MilGroupIndex, group.0);
            return None;
        }
        self.mil_groups.get_mut(group.index())
    }

    pub fn mil_groups(&self) -> &[MilGroupState] {
        &self.mil_groups
    }

    /// One more pending event in `group`, saturating at [`MIL_PENDING_MAX`]
    pub fn increment_mil_pending(&mut self, group: MilGroupId) {
        let checks = self.checks.clone();
        if let Some(state) = self.mil_group_mut(group) {
            if state.pending_count >= MIL_PENDING_MAX {
                checks.failed(RuntimeCheck::MilPendingOverflow, group.0);
            } else {
                state.pending_count += 1;
            }
        }
    }

    /// One pending event less; the trip counter restarts once none are left
    pub fn decrement_mil_pending(&mut self, group: MilGroupId) {
        let checks = self.checks.clone();
        if let Some(state) = self.mil_group_mut(group) {
            if state.pending_count == 0 {
                checks.failed(RuntimeCheck::MilPendingUnderflow, group.0);
                return;
            }
            state.pending_count -= 1;
            if state.pending_count == 0 {
                state.trip_count = 0;
            }
        }
    }

    /// Forget the per-cycle increment flags of all MIL groups
    pub fn reset_mil_cycle_flags(&mut self) {
        for group in &mut self.mil_groups {
            group.incremented_this_cycle = false;
        }
    }

    pub fn request_indicator(&mut self, indicator: IndicatorId) {
        match self.indicators.get_mut(indicator.index()) {
            Some(state) => state.requests = state.requests.saturating_add(1),
            None => self.checks.failed(RuntimeCheck::IndicatorIndex, indicator.0),
        }
    }

    pub fn release_indicator(&mut self, indicator: IndicatorId) {
        match self.indicators.get_mut(indicator.index()) {
            Some(state) if state.requests > 0 => state.requests -= 1,
            Some(_) => self.checks.failed(RuntimeCheck::IndicatorUnderflow, indicator.0),
            None => self.checks.failed(RuntimeCheck::IndicatorIndex, indicator.0),
        }
    }

    pub fn indicator_status(&self, indicator: IndicatorId) -> Option<IndicatorStatus> {
        self.indicators.get(indicator.index()).map(|state| {
            if state.requests > 0 {
                IndicatorStatus::Continuous
            } else {
                IndicatorStatus::Off
            }
        })
    }

    /// Recompute indicator and MIL pending counts from the event statuses
    ///
    /// `indicator_of` and `mil_group_of` give the configured assignment of
    /// an event. Used after NV restore.
    pub fn rebuild_counters<I, M>(&mut self, indicator_of: I, mil_group_of: M)
    where
        I: Fn(EventId) -> Option<IndicatorId>,
        M: Fn(EventId) -> Option<MilGroupId>,
    {
        for indicator in &mut self.indicators {
            indicator.requests = 0;
        }
        for group in &mut self.mil_groups {
            group.pending_count = 0;
        }
        for index in 1..self.events.len() {
            let id = EventId(index as u16);
            let status = self.events[index].uds;
            if status.warning_indicator() {
                if let Some(indicator) = indicator_of(id) {
                    self.request_indicator(indicator);
                }
            }
            if status.pending() {
                if let Some(group) = mil_group_of(id) {
                    self.increment_mil_pending(group);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_bit;
    use bsw_core::DetRecorder;
    use std::sync::Arc;

    fn store() -> (StatusStore, RuntimeChecks) {
        let checks = RuntimeChecks::new(Arc::new(DetRecorder::new()));
        (StatusStore::new(3, 2, 1, 1, checks.clone()), checks)
    }

    #[test]
    fn test_invalid_event_access_is_checked() {
        let (mut store, checks) = store();
        assert!(store.event_mut(EventId(0)).is_none());
        assert!(store.event_mut(EventId(4)).is_none());
        assert!(store.event_mut(EventId(3)).is_some());
        assert_eq!(checks.count(), 2);
        assert_eq!(store.status(EventId(9)), UdsStatus::CLEARED);
    }

    #[test]
    fn test_mil_pending_saturates() {
        let (mut store, checks) = store();
        for _ in 0..200 {
            store.increment_mil_pending(MilGroupId(0));
        }
        assert_eq!(store.mil_group(MilGroupId(0)).unwrap().pending_count, MIL_PENDING_MAX);
        assert_eq!(checks.count(), 200 - MIL_PENDING_MAX as u32);
    }

    #[test]
    fn test_mil_trip_resets_when_no_pending_left() {
        let (mut store, _) = store();
        store.increment_mil_pending(MilGroupId(0));
        store.mil_group_mut(MilGroupId(0)).unwrap().trip_count = 2;
        store.decrement_mil_pending(MilGroupId(0));
        assert_eq!(store.mil_group(MilGroupId(0)).unwrap().trip_count, 0);
    }

    #[test]
    fn test_indicator_requests() {
        let (mut store, checks) = store();
        assert_eq!(store.indicator_status(IndicatorId(0)), Some(IndicatorStatus::Off));
        store.request_indicator(IndicatorId(0));
        store.request_indicator(IndicatorId(0));
        store.release_indicator(IndicatorId(0));
        assert_eq!(
            store.indicator_status(IndicatorId(0)),
            Some(IndicatorStatus::Continuous)
        );
        store.release_indicator(IndicatorId(0));
        store.release_indicator(IndicatorId(0));
        assert_eq!(checks.count(), 1);
        assert_eq!(store.indicator_status(IndicatorId(1)), None);
    }

    #[test]
    fn test_external_status_masks_unqualified_bits() {
        let mut data = EventStatusData {
            uds: UdsStatus::from_bits(status_bit::TF | status_bit::CDTC | status_bit::WIR),
            qualify: QualifyStatus::UNQUALIFIED,
            ..EventStatusData::default()
        };
        assert_eq!(data.external().bits(), status_bit::TF);
        data.internal.disconnected = true;
        assert_eq!(data.external(), UdsStatus::CLEARED);
    }

    #[test]
    fn test_rebuild_counters() {
        let (mut store, _) = store();
        store.event_mut(EventId(1)).unwrap().uds = UdsStatus::from_bits(status_bit::WIR | status_bit::PDTC);
        store.event_mut(EventId(2)).unwrap().uds = UdsStatus::from_bits(status_bit::PDTC);
        store.rebuild_counters(|_| Some(IndicatorId(0)), |_| Some(MilGroupId(0)));
        assert_eq!(
            store.indicator_status(IndicatorId(0)),
            Some(IndicatorStatus::Continuous)
        );
        assert_eq!(store.mil_group(MilGroupId(0)).unwrap().pending_count, 2);
    }
}
