use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{RecordTrigger, StorageTrigger};
use crate::dtc::DtcNumber;
use crate::event::effects::{self, effect, EventEffects};
use crate::ids::{DtcIndex, EntryIndex, EventId, MemoryId};
use crate::memory::data::{capture_dids, capture_snapshot, render_elements};
use crate::memory::{memory_kind, select_victim, MemoryEntry, VictimInfo};
use crate::notify::Notification;
use crate::nv::NvBlockId;
use crate::runtime_check::RuntimeCheck;
use crate::state::DemState;
use crate::status::{StoredStatus, UdsStatus};
use crate::tables::ConfigLookup;

/// Inputs of one storage step
#[derive(Debug, Clone, Copy)]
pub struct StorageRequest {
    pub effects: EventEffects,
    /// Event status after the transition
    pub status: UdsStatus,
    pub fdc: i8,
    /// The FDC storage threshold was reached
    pub fdc_threshold: bool,
}

fn storage_triggered(trigger: StorageTrigger, request: &StorageRequest, retry: bool) -> bool {
    let e = request.effects;
    match trigger {
        StorageTrigger::TestFailed => e.has(effect::TESTFAILED) || e.has(effect::TESTFAILEDTHISCYCLE),
        StorageTrigger::Pending => e.has(effect::PENDING) || (retry && request.status.pending()),
        StorageTrigger::Confirmed => e.has(effect::CONFIRMED) || (retry && request.status.confirmed()),
    }
}

fn record_triggered(trigger: RecordTrigger, request: &StorageRequest, new_entry: bool) -> bool {
    let e = request.effects;
    let s = request.status;
    match trigger {
        RecordTrigger::TestFailed => e.has(effect::TESTFAILED) || (new_entry && s.test_failed()),
        RecordTrigger::TestFailedThisCycle => {
            e.has(effect::TESTFAILEDTHISCYCLE) || (new_entry && s.test_failed_this_cycle())
        }
        RecordTrigger::Pending => e.has(effect::PENDING) || (new_entry && s.pending()),
        RecordTrigger::Confirmed => e.has(effect::CONFIRMED) || (new_entry && s.confirmed()),
        RecordTrigger::FdcThreshold => request.fdc_threshold,
    }
}

impl DemState {
    /// Store `event` in its fault memory as requested by a transition
    ///
    /// Returns whether the event owns an entry afterwards.
    pub(crate) fn process_storage(&mut self, event: EventId, dtc: DtcIndex, request: StorageRequest) -> bool {
        let cfg = Arc::clone(&self.cfg);
        let Some(memory_id) = self.tables.memory_of(dtc) else {
            self.checks.failed(RuntimeCheck::DtcIndex, dtc.0);
            return false;
        };
        let rep = self.tables.representative(event);

        let mut new_entry = false;
        let index = match self.memory(memory_id).and_then(|m| m.find(rep)) {
            Some(index) => index,
            None => {
                let wants_fdc_record = request.fdc_threshold
                    && cfg.dtc(dtc).map_or(false, |d| {
                        d.snapshot_records
                            .iter()
                            .any(|r| r.trigger == RecordTrigger::FdcThreshold)
                            || d.extended_records
                                .iter()
                                .any(|r| r.trigger == RecordTrigger::FdcThreshold)
                    });
                let triggered = wants_fdc_record
                    || storage_triggered(cfg.features.storage_trigger, &request, cfg.features.retry_storage);
                if !triggered {
                    return false;
                }
                let Some(index) = self.allocate_entry(rep, memory_id) else {
                    return false;
                };
                new_entry = true;
                index
            }
        };

        let mut changed = new_entry;
        let refresh = !new_entry
            && cfg.features.chronology_refresh_on_occurrence
            && request.effects.has(effect::TESTFAILEDTHISCYCLE);
        if refresh {
            let stamp = self.next_timestamp();
            if let Some(memory) = self.memory_mut(memory_id) {
                memory.refresh(index, stamp);
            }
            changed = true;
        }

        let failing = request.effects.has(effect::TESTFAILED) || request.effects.has(effect::TESTFAILEDTHISCYCLE);
        if let Some(entry) = self.memory_mut(memory_id).and_then(|m| m.entry_mut(index)) {
            if entry.aging_only && !request.fdc_threshold {
                // Aging-only slot becomes a full entry again
                entry.aging_only = false;
                entry.aging_counter = 0;
                changed = true;
            }
            if request.effects.has(effect::TESTFAILEDTHISCYCLE) {
                entry.occurrence_counter = entry.occurrence_counter.saturating_add(1);
                entry.cycles_since_last_failed = 0;
                changed = true;
            }
            if request.fdc > entry.max_fdc {
                entry.max_fdc = request.fdc;
                changed = true;
            }
        }
        if failing {
            changed |= self.reactivate(rep, memory_id, index);
        }

        changed |= self.capture_records(event, dtc, memory_id, index, &request, new_entry);
        if changed {
            self.mark_entry(memory_id, index);
            self.notify(Notification::EventDataChanged { event });
        }
        true
    }

    /// A failure during aging puts the entry back to active
    fn reactivate(&mut self, rep: EventId, memory_id: MemoryId, index: EntryIndex) -> bool {
        let stored = self.store.event(rep).map_or(StoredStatus::None, |d| d.internal.stored);
        if stored == StoredStatus::Active {
            return false;
        }
        for event in self.tables.represented_events(rep) {
            if let Some(data) = self.store.event_mut(event) {
                data.internal.stored = StoredStatus::Active;
            }
        }
        if let Some(entry) = self.memory_mut(memory_id).and_then(|m| m.entry_mut(index)) {
            entry.aging_counter = 0;
        }
        debug!(event = %rep, "Aging interrupted");
        true
    }

    fn victim_info(&self, entry: &MemoryEntry) -> VictimInfo {
        let stored = self
            .store
            .event(entry.event)
            .map_or(StoredStatus::None, |d| d.internal.stored);
        VictimInfo {
            priority: self.cfg.event(entry.event).map_or(u8::MAX, |e| e.priority),
            passive: !self.represented_status(entry.event).test_failed(),
            aged: stored == StoredStatus::Aged || entry.aging_only,
        }
    }

    /// J2012 code of the DTC an event reports, for log fields
    pub(crate) fn dtc_code(&self, event: EventId) -> Option<String> {
        let dtc = self.tables.dtc_of(event)?;
        self.cfg.dtc(dtc).map(|d| DtcNumber(d.number).code())
    }

    /// Allocate a slot for `rep`, displacing a victim if the memory is full
    pub(crate) fn allocate_entry(&mut self, rep: EventId, memory_id: MemoryId) -> Option<EntryIndex> {
        let priority = self.cfg.event(rep).map_or(u8::MAX, |e| e.priority);
        let strategy = self.cfg.features.displacement;
        let memory = self.memory(memory_id)?;
        let slot = match memory.free_slot() {
            Some(slot) => Some(slot),
            None => {
                let victim = select_victim(memory, priority, strategy, |entry| self.victim_info(entry));
                if let Some(victim) = victim {
                    self.displace(memory_id, victim);
                }
                victim
            }
        };

        let Some(slot) = slot else {
            if let Some(memory) = self.memory_mut(memory_id) {
                if !memory.overflow {
                    memory.overflow = true;
                    self.dirty.mark(NvBlockId::Admin);
                }
            }
            warn!(
                event = %rep,
                dtc = self.dtc_code(rep).as_deref().unwrap_or("-"),
                memory = %memory_kind(memory_id),
                "Fault memory full, event not stored"
            );
            return None;
        };

        let stamp = self.next_timestamp();
        let status = self.store.status(rep).bits();
        let allocated = self
            .memory_mut(memory_id)
            .map_or(false, |m| m.allocate(slot, rep, stamp, status));
        if !allocated {
            self.checks.failed(RuntimeCheck::EntryIndex, slot.0);
            return None;
        }
        for event in self.tables.represented_events(rep) {
            if let Some(data) = self.store.event_mut(event) {
                data.internal.stored = StoredStatus::Active;
            }
        }
        self.mark_entry(memory_id, slot);
        info!(
            event = %rep,
            dtc = self.dtc_code(rep).as_deref().unwrap_or("-"),
            memory = %memory_kind(memory_id),
            slot = slot.0,
            "Fault memory entry allocated"
        );
        Some(slot)
    }

    /// Evict the entry in `index`; its events lose CDTC and TFSLC
    pub(crate) fn displace(&mut self, memory_id: MemoryId, index: EntryIndex) {
        let Some(victim) = self.memory_mut(memory_id).and_then(|m| m.release(index)) else {
            return;
        };
        self.mark_entry(memory_id, index);
        for event in self.tables.represented_events(victim) {
            let Some(before) = self.snapshot(event) else {
                continue;
            };
            if let Some(data) = self.store.event_mut(event) {
                data.uds = effects::on_displaced(data.uds);
                data.internal.stored = StoredStatus::None;
            }
            self.commit(before);
        }
        if let Some(dtc) = self.tables.dtc_of(victim) {
            self.time_series.release(dtc);
        }
        info!(
            event = %victim,
            dtc = self.dtc_code(victim).as_deref().unwrap_or("-"),
            memory = %memory_kind(memory_id),
            slot = index.0,
            "Fault memory entry displaced"
        );
    }

    /// Take one time-series sample of every DTC with time-series DIDs
    pub(crate) fn sample_time_series<F>(&mut self, fdc_of: F)
    where
        F: Fn(EventId) -> i8,
    {
        if self.time_series.capacity() == 0 {
            return;
        }
        let cfg = Arc::clone(&self.cfg);
        let provider = Arc::clone(&self.provider);
        for dtc in self.tables.dtc_ids().collect::<Vec<_>>() {
            let Some(dids) = cfg.dtc(dtc).map(|d| &d.time_series).filter(|d| !d.is_empty()) else {
                continue;
            };
            let Some(rep) = self.dtc_representative(dtc) else {
                continue;
            };
            let ctx = self.element_context(rep, fdc_of(rep));
            let mut sample = vec![0; dids.iter().map(|d| d.size()).sum()];
            capture_dids(dids, &ctx, provider.as_ref(), rep, &mut sample);
            self.time_series.sample(dtc, sample);
        }
    }

    /// Capture the data records whose trigger fired
    fn capture_records(
        &mut self,
        event: EventId,
        dtc: DtcIndex,
        memory_id: MemoryId,
        index: EntryIndex,
        request: &StorageRequest,
        new_entry: bool,
    ) -> bool {
        let cfg = Arc::clone(&self.cfg);
        let tables = Arc::clone(&self.tables);
        let (Some(dtc_cfg), Some(layout)) = (cfg.dtc(dtc), tables.layout(dtc)) else {
            return false;
        };
        if dtc_cfg.snapshot_records.is_empty() && dtc_cfg.extended_records.is_empty() {
            return false;
        }
        let ctx = self.element_context(event, request.fdc);
        let provider = Arc::clone(&self.provider);
        let checks = self.checks.clone();
        let Some(entry) = self.memory_mut(memory_id).and_then(|m| m.entry_mut(index)) else {
            return false;
        };
        if entry.record_update_locked || entry.aging_only {
            return false;
        }

        let mut changed = false;
        for (i, (record, slot)) in dtc_cfg.snapshot_records.iter().zip(&layout.snapshots).enumerate() {
            let fire = record_triggered(record.trigger, request, new_entry);
            if !fire || (entry.snapshot_is_valid(i) && !record.update) {
                continue;
            }
            let Some(out) = entry.data.get_mut(slot.range()) else {
                checks.failed(RuntimeCheck::RecordLayout, record.number);
                continue;
            };
            capture_snapshot(record, &ctx, provider.as_ref(), event, out);
            entry.snapshot_valid |= 1 << i;
            changed = true;
        }
        for (i, (record, slot)) in dtc_cfg.extended_records.iter().zip(&layout.extended).enumerate() {
            let fire = record_triggered(record.trigger, request, new_entry);
            if !fire || (entry.extended_is_valid(i) && !record.update) {
                continue;
            }
            let Some(out) = entry.data.get_mut(slot.range()) else {
                checks.failed(RuntimeCheck::RecordLayout, record.number);
                continue;
            };
            render_elements(&record.elements, &ctx, provider.as_ref(), event, out);
            entry.extended_valid |= 1 << i;
            changed = true;
        }
        if changed {
            debug!(event = %event, "Data records captured");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DemConfig, DidConfig, DisplacementStrategy, DtcConfig, EventConfig, SnapshotRecordConfig,
    };
    use crate::ids::CycleId;
    use crate::memory::DataElement;
    use crate::monitor::MonitorState;
    use crate::state::tests::state_for;
    use crate::status::status_bit;

    fn config(capacity: u16, strategy: DisplacementStrategy) -> DemConfig {
        let mut config = DemConfig::default();
        config.memory.primary_size = capacity;
        config.features.displacement = strategy;
        for (i, priority) in [(1u32, 2u8), (2, 2), (3, 1)] {
            let number = 0x010000 + i;
            let mut dtc = DtcConfig::new(number);
            dtc.snapshot_records.push(SnapshotRecordConfig {
                number: 1,
                trigger: RecordTrigger::TestFailed,
                update: false,
                dids: vec![DidConfig {
                    did: 0x0100,
                    elements: vec![DataElement::OccurrenceCounter],
                }],
            });
            config.dtcs.push(dtc);
            let mut event = EventConfig::new(format!("e{}", i), Some(number));
            event.priority = priority;
            config.events.push(event);
        }
        config
    }

    fn started(config: DemConfig) -> DemState {
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        state
    }

    #[test]
    fn test_dtc_code_of_event() {
        let state = started(config(2, DisplacementStrategy::Priority));
        assert_eq!(state.dtc_code(EventId(3)).as_deref(), Some("P0100"));
    }

    #[test]
    fn test_entry_allocated_with_snapshot() {
        let mut state = started(config(2, DisplacementStrategy::Priority));
        state.process_failed(EventId(1), 127);
        let entry = state.entry(EventId(1)).unwrap();
        assert_eq!(entry.occurrence_counter, 1);
        assert!(entry.snapshot_is_valid(0));
        assert_eq!(entry.data[0], 1);
        assert_eq!(
            state.store.event(EventId(1)).unwrap().internal.stored,
            StoredStatus::Active
        );
    }

    #[test]
    fn test_displacement_of_lower_priority() {
        let mut state = started(config(2, DisplacementStrategy::Priority));
        state.process_failed(EventId(1), 127);
        state.process_failed(EventId(2), 127);
        state.process_passed(EventId(1), -128);
        state.outbox.clear();

        state.process_failed(EventId(3), 127);
        assert!(state.entry(EventId(3)).is_some());
        assert!(state.entry(EventId(1)).is_none());
        let status = state.store.status(EventId(1));
        assert!(!status.confirmed());
        assert!(!status.test(status_bit::TFSLC));
        assert_eq!(
            state.store.event(EventId(1)).unwrap().internal.stored,
            StoredStatus::None
        );
    }

    #[test]
    fn test_overflow_without_victim() {
        let mut state = started(config(1, DisplacementStrategy::None));
        state.process_failed(EventId(1), 127);
        state.process_failed(EventId(3), 127);
        assert!(state.entry(EventId(3)).is_none());
        assert!(state.memories[0].overflow);
        // Status bits still advance without an entry
        assert!(state.store.status(EventId(3)).confirmed());
    }

    #[test]
    fn test_locked_entry_is_not_displaced() {
        let mut state = started(config(1, DisplacementStrategy::Full));
        state.process_failed(EventId(1), 127);
        state.process_passed(EventId(1), -128);
        state.entry_mut(EventId(1)).unwrap().record_update_locked = true;
        state.process_failed(EventId(3), 127);
        assert!(state.entry(EventId(1)).is_some());
        assert!(state.entry(EventId(3)).is_none());
    }

    #[test]
    fn test_occurrence_counts_failed_cycles() {
        let config = config(2, DisplacementStrategy::Priority);
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        for _ in 0..3 {
            state.op_cycle_start(&mut monitor, CycleId(0));
            state.process_failed(EventId(1), 127);
            state.process_failed(EventId(1), 127);
        }
        let entry = state.entry(EventId(1)).unwrap();
        assert_eq!(entry.occurrence_counter, 3);
        // Snapshot without update keeps the first capture
        assert_eq!(entry.data[0], 1);
    }

    #[test]
    fn test_storage_trigger_confirmed() {
        let mut config = config(2, DisplacementStrategy::Priority);
        config.features.storage_trigger = StorageTrigger::Confirmed;
        config.events[0].trip_target = 2;
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        state.process_failed(EventId(1), 127);
        assert!(state.entry(EventId(1)).is_none());
        state.op_cycle_start(&mut monitor, CycleId(0));
        state.process_failed(EventId(1), 127);
        let entry = state.entry(EventId(1)).unwrap();
        // The TestFailed snapshot is taken at allocation
        assert!(entry.snapshot_is_valid(0));
    }
}
