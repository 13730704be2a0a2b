use std::sync::Arc;

use tracing::{debug, info};

use super::effects::{self, effect, FailedContext};
use crate::config::EventConfig;
use crate::debounce::ResultKind;
use crate::dtc::StorageRequest;
use crate::ids::{CycleId, EventId};
use crate::monitor::{MonitorResult, MonitorState};
use crate::nv::NvBlockId;
use crate::runtime_check::RuntimeCheck;
use crate::state::DemState;
use crate::status::{ext_status_bit, status_bit, ExtendedStatus, QualifyStatus, StoredStatus, UdsStatus};
use crate::tables::ConfigLookup;

impl DemState {
    /// Apply one drained monitor result
    pub(crate) fn process_result(&mut self, event: EventId, result: MonitorResult) {
        match result.kind {
            ResultKind::Failed => self.process_failed(event, result.fdc),
            ResultKind::Passed => self.process_passed(event, result.fdc),
            ResultKind::FdcThreshold => self.process_fdc_threshold(event, result.fdc),
        }
    }

    /// Trip target reached (through the MIL group if the event has one)
    fn test_confirmed(&self, event: EventId, cfg: &EventConfig, ext: ExtendedStatus) -> bool {
        let similar_ok = !cfg.requires_similar_conditions || ext.test(ext_status_bit::SIMILAR_CONDITIONS);
        if cfg.trip_target == 0 {
            return similar_ok;
        }
        let trip = match cfg.mil_group {
            Some(group) => self
                .store
                .mil_group(crate::ids::MilGroupId(group))
                .map_or(0, |g| g.trip_count),
            None => self.store.event(event).map_or(0, |d| d.trip_count),
        };
        trip.saturating_add(1) >= cfg.trip_target && similar_ok
    }

    fn is_stored(&self, event: EventId) -> bool {
        let rep = self.tables.representative(event);
        self.store
            .event(rep)
            .map_or(false, |d| d.internal.stored != StoredStatus::None)
    }

    /// A qualified failed result
    pub(crate) fn process_failed(&mut self, event: EventId, fdc: i8) {
        let cfg = Arc::clone(&self.cfg);
        let Some(event_cfg) = cfg.event(event) else {
            self.checks.failed(RuntimeCheck::EventIndex, event);
            return;
        };
        let Some(before) = self.snapshot(event) else {
            return;
        };
        if event_cfg.latch_test_failed && before.uds.test_failed() && before.uds.confirmed() {
            debug!(event = %event, "Failed result latched");
            return;
        }

        let dtc = self.tables.dtc_of(event);
        let storage_allowed = dtc.is_some() && self.storage_conditions_ok(event);
        let ctx = FailedContext {
            stored: self.is_stored(event),
            retry_storage: cfg.features.retry_storage,
            tfslc_stored_only: cfg.features.tfslc_stored_only,
            storage_allowed,
            test_confirmed: self.test_confirmed(event, event_cfg, before.ext),
            has_indicator: event_cfg.indicator.is_some(),
        };
        let t = effects::on_failed(before.uds, &ctx);

        if let Some(data) = self.store.event_mut(event) {
            data.uds = t.new;
            if t.effects.has(effect::TESTFAILEDTHISCYCLE) {
                data.healing_count = 0;
            }
        }

        if let (Some(dtc), true) = (dtc, storage_allowed) {
            let stored = self.process_storage(
                event,
                dtc,
                StorageRequest {
                    effects: t.effects,
                    status: t.new,
                    fdc,
                    fdc_threshold: false,
                },
            );
            let dtc_cfg = cfg.dtc(dtc);
            let obd = dtc_cfg.map_or(false, |d| d.obd_relevant);

            if stored && cfg.features.tfslc_stored_only {
                if let Some(data) = self.store.event_mut(event) {
                    data.uds = data.uds.with(status_bit::TFSLC);
                }
            }
            if t.effects.has(effect::INDICATOR) && obd {
                if self.permanent.add(dtc, event) {
                    self.dirty.mark(NvBlockId::Permanent);
                } else {
                    debug!(event = %event, "Permanent memory full");
                }
            }
            // Time-series slots follow the fault memory entry
            if stored
                && t.effects.has(effect::TESTFAILEDTHISCYCLE)
                && dtc_cfg.map_or(false, |d| !d.time_series.is_empty())
                && !self.time_series.allocate(dtc)
            {
                debug!(event = %event, "Time-series memory full");
            }
            if cfg.features.dcy_qualification && obd {
                if let Some(data) = self.store.event_mut(event) {
                    if t.effects.has(effect::CONFIRMED) {
                        data.qualify = data.qualify.without(status_bit::CDTC);
                    }
                    if t.effects.has(effect::INDICATOR) {
                        data.qualify = data.qualify.without(status_bit::WIR);
                    }
                }
            }
        }

        if t.effects.has(effect::CONFIRMED) {
            if let Some(data) = self.store.event_mut(event) {
                if data.qualify.is_qualified(status_bit::CDTC) {
                    data.ext = data.ext.with(ext_status_bit::QCSLC);
                }
            }
        }

        debug!(
            event = %event,
            old = %t.old,
            new = %t.new,
            effects = ?t.effects,
            "Processed failed result"
        );
        self.commit(before);
    }

    /// A qualified passed result
    pub(crate) fn process_passed(&mut self, event: EventId, fdc: i8) {
        let cfg = Arc::clone(&self.cfg);
        let Some(event_cfg) = cfg.event(event) else {
            self.checks.failed(RuntimeCheck::EventIndex, event);
            return;
        };
        let Some(before) = self.snapshot(event) else {
            return;
        };
        let t = effects::on_passed(before.uds, event_cfg.healing_target == 0);
        if let Some(data) = self.store.event_mut(event) {
            data.uds = t.new;
            data.ext = data.ext.with(ext_status_bit::TPSLC);
        }
        if t.effects.has(effect::HEALED) {
            self.healed(event, event_cfg);
        }
        if let Some(entry) = self.entry_mut(event) {
            entry.max_fdc = entry.max_fdc.max(fdc);
        }
        debug!(
            event = %event,
            old = %t.old,
            new = %t.new,
            effects = ?t.effects,
            "Processed passed result"
        );
        self.commit(before);

        if cfg.features.aging_start_on_passed {
            self.start_aging_on_passed(event);
        }
    }

    /// WIR was cleared by healing; the caller commits
    fn healed(&mut self, event: EventId, event_cfg: &EventConfig) {
        if let Some(data) = self.store.event_mut(event) {
            data.healing_count = 0;
            if event_cfg.indicator.is_some() {
                data.trip_count = 0;
            }
        }
        if let Some(dtc) = self.tables.dtc_of(event) {
            if self.permanent.remove(dtc) {
                self.dirty.mark(NvBlockId::Permanent);
            }
        }
        info!(event = %event, "Warning indicator healed");
    }

    /// The fault detection counter reached the storage threshold
    pub(crate) fn process_fdc_threshold(&mut self, event: EventId, fdc: i8) {
        let Some(data) = self.store.event_mut(event) else {
            return;
        };
        if data.internal.fdc_toc {
            return;
        }
        data.internal.fdc_toc = true;
        let Some(dtc) = self.tables.dtc_of(event) else {
            return;
        };
        if !self.storage_conditions_ok(event) {
            return;
        }
        let status = self.store.status(event);
        self.process_storage(
            event,
            dtc,
            StorageRequest {
                effects: effects::EventEffects::NONE,
                status,
                fdc,
                fdc_threshold: true,
            },
        );
        debug!(event = %event, fdc, "FDC threshold reached");
    }

    // ── Operation cycles ────────────────────────────────────────────────────

    /// Start (or restart) an operation cycle
    pub(crate) fn op_cycle_start(&mut self, monitor: &mut MonitorState, cycle: CycleId) {
        if self.cycles_started.get(cycle.index()).copied().unwrap_or(false) {
            self.op_cycle_end(cycle);
        }
        let Some(started) = self.cycles_started.get_mut(cycle.index()) else {
            return;
        };
        *started = true;
        self.dirty.mark(NvBlockId::Admin);

        let reset_tf = self.cfg.features.reset_tf_on_cycle_start;
        let tables = Arc::clone(&self.tables);
        for &event in tables.cycle_events(cycle) {
            let Some(before) = self.snapshot(event) else {
                continue;
            };
            if let Some(data) = self.store.event_mut(event) {
                if data.internal.disconnected {
                    continue;
                }
                data.uds = effects::on_cycle_start(data.uds, reset_tf);
                data.ext = data.ext.without(ext_status_bit::MONITOR_DISABLED_TOC);
                data.internal.fdc_toc = false;
            }
            monitor.reset_debounce(event);
            self.commit(before);
        }
        self.store.reset_mil_cycle_flags();
        info!(cycle = cycle.0, "Operation cycle started");
    }

    /// End an operation cycle; no-op if it is not running
    pub(crate) fn op_cycle_end(&mut self, cycle: CycleId) {
        match self.cycles_started.get_mut(cycle.index()) {
            Some(started) if *started => *started = false,
            _ => return,
        }
        self.dirty.mark(NvBlockId::Admin);

        let cfg = Arc::clone(&self.cfg);
        let tables = Arc::clone(&self.tables);
        let events = tables.cycle_events(cycle);
        for &event in events {
            if let Some(event_cfg) = cfg.event(event) {
                self.cycle_end_event(event, event_cfg);
            }
        }

        let mut representatives: Vec<EventId> = events.iter().map(|e| tables.representative(*e)).collect();
        representatives.sort();
        representatives.dedup();
        for rep in representatives {
            self.update_entry_cycle_counters(rep);
            self.aging_cycle_end(rep);
        }
        info!(cycle = cycle.0, "Operation cycle ended");
    }

    fn cycle_end_event(&mut self, event: EventId, event_cfg: &EventConfig) {
        let Some(before) = self.snapshot(event) else {
            return;
        };
        if self.store.event(event).map_or(true, |d| d.internal.disconnected) {
            return;
        }
        let outcome = effects::on_cycle_end(before.uds);
        let mut healed = false;
        if let Some(data) = self.store.event_mut(event) {
            data.uds = outcome.new;
            if outcome.passed_cycle {
                data.trip_count = 0;
                if data.uds.warning_indicator() && event_cfg.healing_target > 0 {
                    data.healing_count = data.healing_count.saturating_add(1);
                    if data.healing_count >= event_cfg.healing_target {
                        data.uds = data.uds.without(status_bit::WIR);
                        healed = true;
                    }
                }
            }
        }
        if healed {
            self.healed(event, event_cfg);
        }
        if outcome.trip {
            self.advance_trip(event, event_cfg);
        }
        self.commit(before);
    }

    /// Once per cycle, never beyond the trip target
    fn advance_trip(&mut self, event: EventId, event_cfg: &EventConfig) {
        let target = event_cfg.trip_target;
        match event_cfg.mil_group {
            Some(group) => {
                if let Some(state) = self.store.mil_group_mut(crate::ids::MilGroupId(group)) {
                    if !state.incremented_this_cycle {
                        state.incremented_this_cycle = true;
                        if state.trip_count < target {
                            state.trip_count += 1;
                            self.dirty.mark(NvBlockId::Status);
                        }
                    }
                }
            }
            None => {
                if let Some(data) = self.store.event_mut(event) {
                    if data.trip_count < target {
                        data.trip_count += 1;
                    }
                }
            }
        }
    }

    fn update_entry_cycle_counters(&mut self, rep: EventId) {
        let combined = self.represented_status(rep);
        if combined.not_completed_this_cycle() {
            return;
        }
        let failed = combined.test_failed_this_cycle();
        let Some((memory, index)) = self.find_entry(rep) else {
            return;
        };
        let Some(entry) = self.memory_mut(memory).and_then(|m| m.entry_mut(index)) else {
            return;
        };
        if entry.aging_only {
            return;
        }
        entry.cycles_since_first_failed = entry.cycles_since_first_failed.saturating_add(1);
        if failed {
            entry.failed_cycles = entry.failed_cycles.saturating_add(1);
            entry.cycles_since_last_failed = 0;
        } else {
            entry.cycles_since_last_failed = entry.cycles_since_last_failed.saturating_add(1);
        }
        self.mark_entry(memory, index);
    }

    /// Combined internal status of all events sharing `rep`'s stored data
    pub(crate) fn represented_status(&self, rep: EventId) -> UdsStatus {
        crate::status::combine_status(
            self.tables
                .represented_events(rep)
                .into_iter()
                .filter_map(|e| self.store.event(e))
                .filter(|d| !d.internal.disconnected)
                .map(|d| d.uds),
        )
    }

    // ── Qualification ───────────────────────────────────────────────────────

    /// The driving cycle qualified: unmask CDTC/WIR of all events
    pub(crate) fn qualify_dcy(&mut self) {
        let tables = Arc::clone(&self.tables);
        for event in tables.event_ids() {
            let Some(before) = self.snapshot(event) else {
                continue;
            };
            if before.qualify == QualifyStatus::QUALIFIED {
                continue;
            }
            if let Some(data) = self.store.event_mut(event) {
                data.qualify = QualifyStatus::QUALIFIED;
                if data.uds.confirmed() {
                    data.ext = data.ext.with(ext_status_bit::QCSLC);
                }
            }
            self.commit(before);
        }
        info!("Driving cycle qualified");
    }

    pub(crate) fn set_similar_conditions(&mut self, event: EventId, similar: bool) {
        let Some(before) = self.snapshot(event) else {
            return;
        };
        if let Some(data) = self.store.event_mut(event) {
            data.ext = if similar {
                data.ext.with(ext_status_bit::SIMILAR_CONDITIONS)
            } else {
                data.ext.without(ext_status_bit::SIMILAR_CONDITIONS)
            };
        }
        self.commit(before);
    }

    // ── Clear ───────────────────────────────────────────────────────────────

    /// Reset an event to its post-clear status
    ///
    /// The permanent entry of an OBD DTC is only removed if the event
    /// passed in the current cycle. Fault memory entries are released by
    /// the caller per DTC.
    pub(crate) fn cleared(&mut self, monitor: &mut MonitorState, event: EventId) {
        let Some(before) = self.snapshot(event) else {
            return;
        };
        let after_clear = match self.cfg.features.status_after_clear {
            crate::config::StatusAfterClear::AllClear => UdsStatus::CLEARED,
            crate::config::StatusAfterClear::NotCompleted => UdsStatus::NOT_COMPLETED,
        };
        let passed_this_cycle =
            !before.uds.not_completed_this_cycle() && !before.uds.test_failed_this_cycle();
        if let Some(data) = self.store.event_mut(event) {
            if data.internal.disconnected {
                return;
            }
            data.uds = after_clear;
            data.ext = ExtendedStatus::default();
            data.trip_count = 0;
            data.healing_count = 0;
            data.qualify = QualifyStatus::QUALIFIED;
            data.internal.fdc_toc = false;
            data.internal.stored = StoredStatus::None;
        }
        monitor.reset_debounce(event);

        if let Some(dtc) = self.tables.dtc_of(event) {
            let obd = self.cfg.dtc(dtc).map_or(false, |d| d.obd_relevant);
            if obd && passed_this_cycle && self.permanent.remove(dtc) {
                self.dirty.mark_immediate(NvBlockId::Permanent);
            }
        }
        debug!(event = %event, "Event cleared");
        self.commit(before);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DemConfig, DidConfig, DisplacementStrategy, DtcConfig, EventConfig, IndicatorConfig, MilGroupConfig,
    };
    use crate::event::EventEffects;
    use crate::ids::{DtcIndex, IndicatorId, MilGroupId};
    use crate::memory::DataElement;
    use crate::state::tests::state_for;
    use crate::store::IndicatorStatus;

    fn config() -> DemConfig {
        let mut config = DemConfig::default();
        config.indicators.push(IndicatorConfig { name: "mil".into() });
        config.mil_groups.push(MilGroupConfig { name: "g".into() });
        config.dtcs.push(DtcConfig::new(0x010100));
        config.dtcs.push(DtcConfig::new(0x020200));
        // 1: single trip with indicator
        let mut a = EventConfig::new("a", Some(0x010100));
        a.indicator = Some(0);
        config.events.push(a);
        // 2: three trips
        let mut b = EventConfig::new("b", Some(0x020200));
        b.trip_target = 3;
        config.events.push(b);
        // 3: no DTC
        config.events.push(EventConfig::new("c", None));
        config
    }

    fn fail(state: &mut DemState, id: u16) {
        state.process_failed(EventId(id), 127);
    }

    fn restart(state: &mut DemState, monitor: &mut MonitorState) {
        state.op_cycle_start(monitor, CycleId(0));
    }

    fn setup() -> (DemState, MonitorState) {
        let config = config();
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        (state, monitor)
    }

    #[test]
    fn test_single_trip_confirm_with_indicator() {
        let (mut state, _) = setup();
        fail(&mut state, 1);
        assert_eq!(state.store.status(EventId(1)).bits(), 0xAF);
        assert_eq!(
            state.store.indicator_status(IndicatorId(0)),
            Some(IndicatorStatus::Continuous)
        );
        assert!(state.entry(EventId(1)).is_some());
        assert_eq!(state.entry(EventId(1)).unwrap().occurrence_counter, 1);
    }

    #[test]
    fn test_unstored_dtc_takes_no_time_series_slot() {
        let mut config = DemConfig::default();
        config.memory.primary_size = 1;
        config.memory.time_series_size = 2;
        config.features.displacement = DisplacementStrategy::None;
        for (i, number) in [0x010100u32, 0x020200].into_iter().enumerate() {
            let mut dtc = DtcConfig::new(number);
            dtc.time_series.push(DidConfig {
                did: 0x0200,
                elements: vec![DataElement::CurrentFdc],
            });
            config.dtcs.push(dtc);
            config.events.push(EventConfig::new(format!("ts{}", i), Some(number)));
        }
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));

        fail(&mut state, 1);
        fail(&mut state, 2);
        assert!(state.entry(EventId(1)).is_some());
        assert!(state.entry(EventId(2)).is_none());
        assert!(state.time_series.find(DtcIndex(0)).is_some());
        assert!(state.time_series.find(DtcIndex(1)).is_none());

        // The free slot is still there for a DTC that gets an entry
        state.displace(crate::memory::PRIMARY, crate::ids::EntryIndex(0));
        assert!(state.time_series.find(DtcIndex(0)).is_none());
        restart(&mut state, &mut monitor);
        fail(&mut state, 2);
        assert!(state.entry(EventId(2)).is_some());
        assert!(state.time_series.find(DtcIndex(1)).is_some());
    }

    #[test]
    fn test_duplicate_failed_is_idempotent() {
        let (mut state, _) = setup();
        fail(&mut state, 2);
        let status = state.store.status(EventId(2));
        let occurrences = state.entry(EventId(2)).unwrap().occurrence_counter;
        fail(&mut state, 2);
        assert_eq!(state.store.status(EventId(2)), status);
        assert_eq!(state.entry(EventId(2)).unwrap().occurrence_counter, occurrences);
        assert_eq!(state.store.event(EventId(2)).unwrap().trip_count, 0);
    }

    #[test]
    fn test_trip_target_confirms_on_third_cycle() {
        let (mut state, mut monitor) = setup();
        for cycle in 1..=3 {
            fail(&mut state, 2);
            let confirmed = state.store.status(EventId(2)).confirmed();
            assert_eq!(confirmed, cycle == 3, "cycle {}", cycle);
            restart(&mut state, &mut monitor);
        }
    }

    #[test]
    fn test_mil_group_trip_counts_once_per_cycle() {
        let mut config = config();
        for name in ["m1", "m2"] {
            let mut e = EventConfig::new(name, Some(0x020200));
            e.trip_target = 2;
            e.mil_group = Some(0);
            config.events.push(e);
        }
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));

        fail(&mut state, 4);
        fail(&mut state, 5);
        assert_eq!(state.store.mil_group(MilGroupId(0)).unwrap().pending_count, 2);
        restart(&mut state, &mut monitor);
        assert_eq!(state.store.mil_group(MilGroupId(0)).unwrap().trip_count, 1);

        fail(&mut state, 5);
        assert!(state.store.status(EventId(5)).confirmed());
    }

    #[test]
    fn test_passed_cycle_resets_pending() {
        let (mut state, mut monitor) = setup();
        fail(&mut state, 2);
        restart(&mut state, &mut monitor);
        assert_eq!(state.store.event(EventId(2)).unwrap().trip_count, 1);
        state.process_passed(EventId(2), -128);
        restart(&mut state, &mut monitor);
        let status = state.store.status(EventId(2));
        assert!(!status.pending());
        assert_eq!(state.store.event(EventId(2)).unwrap().trip_count, 0);
    }

    #[test]
    fn test_event_without_dtc_has_no_storage_effects() {
        let (mut state, _) = setup();
        fail(&mut state, 3);
        assert_eq!(
            state.store.status(EventId(3)).bits(),
            status_bit::TF | status_bit::TFTOC | status_bit::TFSLC
        );
    }

    #[test]
    fn test_storage_condition_blocks_storage() {
        let mut config = config();
        config.storage_conditions.push(crate::config::ConditionConfig {
            name: "voltage".into(),
            initially_fulfilled: false,
        });
        config.events[0].storage_conditions = vec![0];
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        fail(&mut state, 1);
        assert!(!state.store.status(EventId(1)).confirmed());
        assert!(state.entry(EventId(1)).is_none());
    }

    #[test]
    fn test_healing_after_passed_cycles() {
        let mut config = config();
        config.events[0].healing_target = 2;
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        fail(&mut state, 1);
        restart(&mut state, &mut monitor);
        for _ in 0..2 {
            assert!(state.store.status(EventId(1)).warning_indicator());
            state.process_passed(EventId(1), -128);
            restart(&mut state, &mut monitor);
        }
        assert!(!state.store.status(EventId(1)).warning_indicator());
        assert_eq!(
            state.store.indicator_status(IndicatorId(0)),
            Some(IndicatorStatus::Off)
        );
    }

    #[test]
    fn test_immediate_healing_on_passed() {
        let (mut state, _) = setup();
        fail(&mut state, 1);
        state.process_passed(EventId(1), -128);
        let status = state.store.status(EventId(1));
        assert!(!status.warning_indicator());
        assert!(status.confirmed());
        assert!(state.store.event(EventId(1)).unwrap().ext.test(ext_status_bit::TPSLC));
    }

    #[test]
    fn test_latched_failure_ignored() {
        let mut config = config();
        config.events[0].latch_test_failed = true;
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        fail(&mut state, 1);
        restart(&mut state, &mut monitor);
        let before = state.entry(EventId(1)).unwrap().occurrence_counter;
        fail(&mut state, 1);
        assert_eq!(state.entry(EventId(1)).unwrap().occurrence_counter, before);
    }

    #[test]
    fn test_cleared_resets_status() {
        let (mut state, mut monitor) = setup();
        fail(&mut state, 1);
        state.cleared(&mut monitor, EventId(1));
        assert_eq!(state.store.status(EventId(1)), UdsStatus::CLEARED);
        assert_eq!(
            state.store.indicator_status(IndicatorId(0)),
            Some(IndicatorStatus::Off)
        );
    }

    #[test]
    fn test_dcy_qualification_masks_confirmed() {
        let mut config = config();
        config.features.dcy_qualification = true;
        config.dtcs[0].obd_relevant = true;
        config.memory.permanent_size = 2;
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));

        fail(&mut state, 1);
        let data = state.store.event(EventId(1)).unwrap().clone();
        assert!(data.uds.confirmed());
        assert!(!data.external().confirmed());
        assert!(!data.external().warning_indicator());
        assert_eq!(state.permanent.len(), 1);

        state.qualify_dcy();
        let data = state.store.event(EventId(1)).unwrap();
        assert!(data.external().confirmed());
        assert!(data.ext.test(ext_status_bit::QCSLC));
    }

    #[test]
    fn test_effects_debug_names() {
        let effects = EventEffects::from_bits(effect::PENDING | effect::CONFIRMED);
        assert_eq!(format!("{:?}", effects), "EventEffects(PENDING|CONFIRMED)");
    }
}
