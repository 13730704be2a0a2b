//! Aging of stored DTCs
//!
//! A stored DTC ages by one step for every operation cycle that ends
//! tested and without failure. Aging starts at the first such cycle end
//! (or on the passed result with `aging_start_on_passed`), only while the
//! warning indicator is off when `aging_requires_healing` is set. When the
//! counter reaches the aging target the DTC loses CDTC and its entry is
//! released, or kept as aged with `aging_retain_memory_entry`.
//!
//! A confirmed DTC without an entry (displaced, or stored only for its
//! status) gets an aging-only slot if one is free; otherwise it ages out
//! immediately.

use std::sync::Arc;

use tracing::{debug, info};

use crate::event::effects;
use crate::ids::{EntryIndex, EventId, MemoryId};
use crate::state::DemState;
use crate::status::StoredStatus;
use crate::tables::ConfigLookup;

impl DemState {
    fn stored_status(&self, rep: EventId) -> StoredStatus {
        self.store.event(rep).map_or(StoredStatus::None, |d| d.internal.stored)
    }

    fn set_stored(&mut self, rep: EventId, stored: StoredStatus) {
        for event in self.tables.represented_events(rep) {
            if let Some(data) = self.store.event_mut(event) {
                data.internal.stored = stored;
            }
        }
    }

    /// Aging preconditions apart from the passed cycle
    fn may_age(&self, rep: EventId) -> bool {
        let Some(event_cfg) = self.cfg.event(rep) else {
            return false;
        };
        if !event_cfg.aging_allowed || self.tables.dtc_of(rep).is_none() {
            return false;
        }
        let combined = self.represented_status(rep);
        if combined.test_failed() {
            return false;
        }
        !(self.cfg.features.aging_requires_healing && combined.warning_indicator())
    }

    /// Aging start on a passed result
    pub(crate) fn start_aging_on_passed(&mut self, event: EventId) {
        let rep = self.tables.representative(event);
        if !self.may_age(rep) {
            return;
        }
        if self.stored_status(rep) == StoredStatus::Aging {
            return;
        }
        self.begin_aging(rep);
    }

    /// Operation cycle end for one memory representative
    pub(crate) fn aging_cycle_end(&mut self, rep: EventId) {
        let combined = self.represented_status(rep);
        let passed_cycle = !combined.not_completed_this_cycle() && !combined.test_failed_this_cycle();
        if !passed_cycle || !self.may_age(rep) {
            return;
        }
        match self.stored_status(rep) {
            StoredStatus::Aged => return,
            StoredStatus::Aging => {}
            StoredStatus::Active | StoredStatus::None => {
                if !self.begin_aging(rep) {
                    return;
                }
            }
        }
        self.advance_aging(rep);
    }

    /// Enter the aging state; `false` if there is nothing to age or it completed
    fn begin_aging(&mut self, rep: EventId) -> bool {
        let target = self.cfg.event(rep).map_or(0, |e| e.aging_target);
        match self.stored_status(rep) {
            StoredStatus::Active => {}
            StoredStatus::None => {
                if !self.represented_status(rep).confirmed() {
                    return false;
                }
                if target == 0 || !self.allocate_aging_only(rep) {
                    self.aged(rep);
                    return false;
                }
            }
            StoredStatus::Aging | StoredStatus::Aged => return false,
        }
        self.set_stored(rep, StoredStatus::Aging);
        if let Some((memory, index)) = self.find_entry(rep) {
            if let Some(entry) = self.memory_mut(memory).and_then(|m| m.entry_mut(index)) {
                entry.aging_counter = 0;
            }
            self.mark_entry(memory, index);
        }
        debug!(event = %rep, target, "Aging started");
        if target == 0 {
            self.aged(rep);
            return false;
        }
        true
    }

    fn allocate_aging_only(&mut self, rep: EventId) -> bool {
        let Some(memory_id) = self.tables.dtc_of(rep).and_then(|d| self.tables.memory_of(d)) else {
            return false;
        };
        let Some(slot) = self.memory(memory_id).and_then(|m| m.free_slot()) else {
            return false;
        };
        let stamp = self.next_timestamp();
        let status = self.store.status(rep).bits();
        let Some(memory) = self.memory_mut(memory_id) else {
            return false;
        };
        if !memory.allocate(slot, rep, stamp, status) {
            return false;
        }
        if let Some(entry) = memory.entry_mut(slot) {
            entry.aging_only = true;
        }
        self.mark_entry(memory_id, slot);
        true
    }

    fn advance_aging(&mut self, rep: EventId) {
        let target = self.cfg.event(rep).map_or(0, |e| e.aging_target);
        let Some((memory, index)) = self.find_entry(rep) else {
            self.aged(rep);
            return;
        };
        let Some(entry) = self.memory_mut(memory).and_then(|m| m.entry_mut(index)) else {
            return;
        };
        entry.aging_counter = entry.aging_counter.saturating_add(1);
        let counter = entry.aging_counter;
        self.mark_entry(memory, index);
        debug!(event = %rep, counter, target, "Aging cycle counted");
        if counter >= target {
            self.aged(rep);
        }
    }

    /// Aging completed
    pub(crate) fn aged(&mut self, rep: EventId) {
        let cfg = Arc::clone(&self.cfg);
        let immediate = cfg.event(rep).map_or(false, |e| e.aging_target == 0);
        for event in self.tables.represented_events(rep) {
            let Some(before) = self.snapshot(event) else {
                continue;
            };
            if let Some(data) = self.store.event_mut(event) {
                data.uds = effects::on_aged(data.uds, immediate);
            }
            self.commit(before);
        }

        let entry = self.find_entry(rep);
        let aging_only = entry
            .and_then(|(m, i)| self.memories.get(m.index()).and_then(|mem| mem.entry(i)))
            .map_or(false, |e| e.aging_only);
        match entry {
            Some((memory, index)) if cfg.features.aging_retain_memory_entry && !aging_only => {
                self.set_stored(rep, StoredStatus::Aged);
                self.mark_entry(memory, index);
            }
            Some((memory, index)) => {
                self.release_entry(rep, memory, index);
            }
            None => self.set_stored(rep, StoredStatus::None),
        }
        info!(event = %rep, "DTC aged");
    }

    /// Free the entry of `rep` together with its time-series data
    pub(crate) fn release_entry(&mut self, rep: EventId, memory: MemoryId, index: EntryIndex) {
        if let Some(m) = self.memory_mut(memory) {
            m.release(index);
        }
        self.mark_entry(memory, index);
        self.set_stored(rep, StoredStatus::None);
        if let Some(dtc) = self.tables.dtc_of(rep) {
            self.time_series.release(dtc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemConfig, DtcConfig, EventConfig, IndicatorConfig};
    use crate::ids::CycleId;
    use crate::monitor::MonitorState;
    use crate::state::tests::state_for;
    use crate::status::status_bit;
    use pretty_assertions::assert_eq;

    fn config(aging_target: u8) -> DemConfig {
        let mut config = DemConfig::default();
        config.memory.primary_size = 1;
        config.indicators.push(IndicatorConfig { name: "mil".into() });
        config.dtcs.push(DtcConfig::new(0x010100));
        config.dtcs.push(DtcConfig::new(0x010200));
        let mut a = EventConfig::new("a", Some(0x010100));
        a.aging_target = aging_target;
        config.events.push(a);
        let mut b = EventConfig::new("b", Some(0x010200));
        b.aging_target = aging_target;
        config.events.push(b);
        config
    }

    struct Harness {
        state: DemState,
        monitor: MonitorState,
    }

    impl Harness {
        fn new(config: DemConfig) -> Self {
            let mut monitor = MonitorState::new(&config);
            let mut state = state_for(config);
            state.op_cycle_start(&mut monitor, CycleId(0));
            Self { state, monitor }
        }

        fn restart(&mut self) {
            self.state.op_cycle_start(&mut self.monitor, CycleId(0));
        }

        fn passed_cycles(&mut self, event: u16, n: usize) {
            for _ in 0..n {
                self.state.process_passed(EventId(event), -128);
                self.restart();
            }
        }

        fn stored(&self, event: u16) -> StoredStatus {
            self.state.store.event(EventId(event)).unwrap().internal.stored
        }
    }

    #[test]
    fn test_aging_after_target_cycles() {
        let mut h = Harness::new(config(3));
        h.state.process_failed(EventId(1), 127);
        h.restart();

        h.passed_cycles(1, 2);
        assert_eq!(h.stored(1), StoredStatus::Aging);
        assert_eq!(h.state.entry(EventId(1)).unwrap().aging_counter, 2);
        assert!(h.state.store.status(EventId(1)).confirmed());

        h.passed_cycles(1, 1);
        assert_eq!(h.stored(1), StoredStatus::None);
        assert!(h.state.entry(EventId(1)).is_none());
        let status = h.state.store.status(EventId(1));
        assert!(!status.confirmed());
        assert!(status.test(status_bit::TFSLC));
    }

    #[test]
    fn test_failure_interrupts_aging() {
        let mut h = Harness::new(config(3));
        h.state.process_failed(EventId(1), 127);
        h.restart();
        h.passed_cycles(1, 2);
        h.state.process_failed(EventId(1), 127);
        assert_eq!(h.stored(1), StoredStatus::Active);
        assert_eq!(h.state.entry(EventId(1)).unwrap().aging_counter, 0);
    }

    #[test]
    fn test_untested_cycle_does_not_age() {
        let mut h = Harness::new(config(1));
        h.state.process_failed(EventId(1), 127);
        h.restart();
        h.restart();
        assert_eq!(h.stored(1), StoredStatus::Active);
    }

    #[test]
    fn test_retained_entry_is_aged() {
        let mut config = config(1);
        config.features.aging_retain_memory_entry = true;
        let mut h = Harness::new(config);
        h.state.process_failed(EventId(1), 127);
        h.restart();
        h.passed_cycles(1, 1);
        assert_eq!(h.stored(1), StoredStatus::Aged);
        assert!(h.state.entry(EventId(1)).is_some());

        // An aged entry is the first victim
        h.state.process_failed(EventId(2), 127);
        assert!(h.state.entry(EventId(2)).is_some());
        assert_eq!(h.stored(1), StoredStatus::None);
    }

    #[test]
    fn test_immediate_aging_on_passed() {
        let mut config = config(0);
        config.features.aging_start_on_passed = true;
        let mut h = Harness::new(config);
        h.state.process_failed(EventId(1), 127);
        h.state.process_passed(EventId(1), -128);
        assert_eq!(h.stored(1), StoredStatus::None);
        let status = h.state.store.status(EventId(1));
        assert!(!status.confirmed());
        assert!(!status.pending());
    }

    #[test]
    fn test_indicator_blocks_aging_until_healed() {
        let mut config = config(1);
        config.events[0].indicator = Some(0);
        config.events[0].healing_target = 2;
        let mut h = Harness::new(config);
        h.state.process_failed(EventId(1), 127);
        h.restart();
        h.passed_cycles(1, 1);
        assert_eq!(h.stored(1), StoredStatus::Active);
        // Healing completes at this cycle end, aging follows in the same step
        h.passed_cycles(1, 1);
        assert!(!h.state.store.status(EventId(1)).warning_indicator());
        assert_eq!(h.stored(1), StoredStatus::None);
    }

    #[test]
    fn test_aging_only_entry_for_displaced_dtc() {
        let mut h = Harness::new(config(2));
        h.state.process_failed(EventId(1), 127);
        // Confirmed without entry: release the slot behind the status
        let (memory, index) = h.state.find_entry(EventId(1)).unwrap();
        h.state.release_entry(EventId(1), memory, index);
        h.restart();

        h.passed_cycles(1, 1);
        assert_eq!(h.stored(1), StoredStatus::Aging);
        assert!(h.state.entry(EventId(1)).unwrap().aging_only);
        h.passed_cycles(1, 1);
        assert!(!h.state.store.status(EventId(1)).confirmed());
        assert!(h.state.entry(EventId(1)).is_none());
    }
}
