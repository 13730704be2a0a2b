//! Dem state guarded by the DiagMonitor lock
//!
//! [`DemState`] owns everything the main function mutates: status data,
//! fault memories, NV dirty tracking and the notification outbox. The
//! transition code in `event`, `aging`, `dtc` and `client` is written as
//! `impl DemState` blocks so that it runs with the lock held and never
//! calls out to NV or listeners.

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::{ClearJob, ClientState};
use crate::config::DemConfig;
use crate::ids::{ClientId, DtcIndex, EntryIndex, EventId, IndicatorId, MemoryId, MilGroupId};
use crate::memory::data::ElementContext;
use crate::memory::{DataProvider, FaultMemory, MemoryEntry, PermanentMemory, TimeSeriesMemory};
use crate::notify::Notification;
use crate::nv::{DirtyTracker, NvBlockId};
use crate::runtime_check::{RuntimeCheck, RuntimeChecks};
use crate::status::{combine_status, status_bit, ExtendedStatus, QualifyStatus, UdsStatus};
use crate::store::StatusStore;
use crate::tables::{ConfigLookup, Tables};

/// Status bits whose change does not need to reach NV on its own
const VOLATILE_BITS: u8 = status_bit::TF | status_bit::TNCTOC;

/// Event status before a transition, for change detection in [`DemState::commit`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusSnapshot {
    pub event: EventId,
    pub uds: UdsStatus,
    pub external: UdsStatus,
    pub ext: ExtendedStatus,
    pub trip: u8,
    pub healing: u8,
    pub qualify: QualifyStatus,
    pub dtc: Option<(DtcIndex, UdsStatus)>,
}

pub(crate) struct DemState {
    pub cfg: Arc<DemConfig>,
    pub tables: Arc<Tables>,
    pub provider: Arc<dyn DataProvider>,
    pub checks: RuntimeChecks,
    pub store: StatusStore,
    /// Indexed by memory id: primary, mirror, user memories
    pub memories: Vec<FaultMemory>,
    pub permanent: PermanentMemory,
    pub time_series: TimeSeriesMemory,
    pub cycles_started: Vec<bool>,
    pub storage_conditions: Vec<bool>,
    /// Next chronology stamp
    pub timestamp: u32,
    pub dirty: DirtyTracker,
    pub outbox: Vec<Notification>,
    /// Status changes are applied without notifications (clear batch)
    pub silent: bool,
    pub clear_job: Option<ClearJob>,
    pub clients: HashMap<ClientId, ClientState>,
}

impl DemState {
    pub fn new(
        cfg: Arc<DemConfig>,
        tables: Arc<Tables>,
        provider: Arc<dyn DataProvider>,
        checks: RuntimeChecks,
    ) -> Self {
        let store = StatusStore::new(
            tables.event_count(),
            tables.dtc_count(),
            cfg.mil_groups.len(),
            cfg.indicators.len(),
            checks.clone(),
        );
        let memories = Self::build_memories(&cfg, &tables);
        let mem = &cfg.memory;
        Self {
            permanent: PermanentMemory::new(mem.permanent_size as usize),
            time_series: TimeSeriesMemory::new(
                mem.time_series_size as usize,
                tables.dtc_count(),
                mem.past_samples as usize,
                mem.future_samples as usize,
            ),
            cycles_started: vec![false; cfg.operation_cycles.len()],
            storage_conditions: cfg
                .storage_conditions
                .iter()
                .map(|c| c.initially_fulfilled)
                .collect(),
            timestamp: 0,
            dirty: DirtyTracker::new(),
            outbox: Vec::new(),
            silent: false,
            clear_job: None,
            clients: HashMap::new(),
            memories,
            store,
            cfg,
            tables,
            provider,
            checks,
        }
    }

    fn build_memories(cfg: &DemConfig, tables: &Tables) -> Vec<FaultMemory> {
        let mut sizes = vec![cfg.memory.primary_size, cfg.memory.mirror_size];
        sizes.extend(cfg.memory.user_sizes.iter().copied());
        sizes
            .into_iter()
            .enumerate()
            .map(|(i, capacity)| {
                let id = MemoryId(i as u8);
                FaultMemory::new(id, capacity as usize, tables.memory_data_size(id))
            })
            .collect()
    }

    /// Forget all runtime data, as after a failed NV restore
    pub fn reset(&mut self) {
        let fresh = DemState::new(
            Arc::clone(&self.cfg),
            Arc::clone(&self.tables),
            Arc::clone(&self.provider),
            self.checks.clone(),
        );
        let clients = std::mem::take(&mut self.clients);
        *self = fresh;
        self.clients = clients;
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    pub fn memory(&self, id: MemoryId) -> Option<&FaultMemory> {
        let memory = self.memories.get(id.index());
        if memory.is_none() {
            self.checks.failed(RuntimeCheck::MemoryIndex, id.0);
        }
        memory
    }

    pub fn memory_mut(&mut self, id: MemoryId) -> Option<&mut FaultMemory> {
        if id.index() >= self.memories.len() {
            self.checks.failed(RuntimeCheck::MemoryIndex, id.0);
            return None;
        }
        self.memories.get_mut(id.index())
    }

    /// Memory and slot holding the stored data of `event`
    pub fn find_entry(&self, event: EventId) -> Option<(MemoryId, EntryIndex)> {
        let dtc = self.tables.dtc_of(event)?;
        let memory_id = self.tables.memory_of(dtc)?;
        let rep = self.tables.representative(event);
        let index = self.memories.get(memory_id.index())?.find(rep)?;
        Some((memory_id, index))
    }

    pub fn entry(&self, event: EventId) -> Option<&MemoryEntry> {
        let (memory_id, index) = self.find_entry(event)?;
        self.memories.get(memory_id.index())?.entry(index)
    }

    pub fn entry_mut(&mut self, event: EventId) -> Option<&mut MemoryEntry> {
        let (memory_id, index) = self.find_entry(event)?;
        self.memories.get_mut(memory_id.index())?.entry_mut(index)
    }

    pub fn indicator_of(&self, event: EventId) -> Option<IndicatorId> {
        self.cfg.event(event).and_then(|e| e.indicator).map(IndicatorId)
    }

    pub fn mil_group_of(&self, event: EventId) -> Option<MilGroupId> {
        self.cfg.event(event).and_then(|e| e.mil_group).map(MilGroupId)
    }

    /// All storage conditions of `event` fulfilled
    pub fn storage_conditions_ok(&self, event: EventId) -> bool {
        self.cfg.event(event).map_or(false, |e| {
            e.storage_conditions
                .iter()
                .all(|c| self.storage_conditions.get(*c as usize).copied().unwrap_or(false))
        })
    }

    /// Internal status of a DTC: stored group byte or folded members
    pub fn dtc_internal_status(&self, dtc: DtcIndex) -> UdsStatus {
        if self.tables.stores_group_status(dtc) {
            return self.store.dtc_status(dtc);
        }
        self.fold_members(dtc)
    }

    fn fold_members(&self, dtc: DtcIndex) -> UdsStatus {
        combine_status(
            self.tables
                .events_of(dtc)
                .iter()
                .filter_map(|e| self.store.event(*e))
                .filter(|d| !d.internal.disconnected)
                .map(|d| d.uds),
        )
    }

    /// DTC status as reported to clients
    pub fn dtc_external_status(&self, dtc: DtcIndex) -> UdsStatus {
        let members = self.tables.events_of(dtc);
        let connected: Vec<_> = members
            .iter()
            .filter_map(|e| self.store.event(*e))
            .filter(|d| !d.internal.disconnected)
            .collect();
        if connected.is_empty() {
            return UdsStatus::CLEARED;
        }
        if members.len() == 1 {
            return connected[0].external();
        }
        let qualify = connected
            .iter()
            .fold(QualifyStatus::UNQUALIFIED, |q, d| q.with(d.qualify.bits()));
        qualify.apply(self.dtc_internal_status(dtc))
    }

    /// A DTC whose events are all disconnected is suppressed
    pub fn dtc_available(&self, dtc: DtcIndex) -> bool {
        self.tables
            .events_of(dtc)
            .iter()
            .filter_map(|e| self.store.event(*e))
            .any(|d| !d.internal.disconnected)
    }

    /// Values for rendering the data elements of `event`'s entry
    pub fn element_context(&self, event: EventId, fdc: i8) -> ElementContext {
        let cfg = self.cfg.event(event);
        let overflow = self
            .tables
            .dtc_of(event)
            .and_then(|d| self.tables.memory_of(d))
            .and_then(|m| self.memories.get(m.index()))
            .map_or(false, |m| m.overflow);
        let mut ctx = ElementContext {
            current_fdc: fdc,
            overflow,
            aging_target: cfg.map_or(0, |c| c.aging_target),
            priority: cfg.map_or(0, |c| c.priority),
            ..ElementContext::default()
        };
        if let Some(entry) = self.entry(event) {
            ctx.occurrence_counter = entry.occurrence_counter;
            ctx.aging_counter = entry.aging_counter;
            ctx.max_fdc = entry.max_fdc;
            ctx.cycles_since_first_failed = entry.cycles_since_first_failed;
            ctx.cycles_since_last_failed = entry.cycles_since_last_failed;
            ctx.failed_cycles = entry.failed_cycles;
            ctx.pre_confirmed_status = entry.pre_confirmed_status;
        }
        ctx
    }

    /// Advance the chronology stamp
    pub fn next_timestamp(&mut self) -> u32 {
        let stamp = self.timestamp;
        self.timestamp = self.timestamp.wrapping_add(1);
        self.dirty.mark(NvBlockId::Admin);
        stamp
    }

    pub fn mark_entry(&mut self, memory: MemoryId, index: EntryIndex) {
        self.dirty.mark(NvBlockId::Entry { memory, index });
    }

    pub fn notify(&mut self, notification: Notification) {
        if !self.silent {
            self.outbox.push(notification);
        }
    }

    // ── Status commit ────────────────────────────────────────────────────────

    /// Capture the state of `event` before modifying it
    pub fn snapshot(&self, event: EventId) -> Option<StatusSnapshot> {
        let data = self.store.event(event)?;
        let dtc = self
            .tables
            .dtc_of(event)
            .map(|d| (d, self.dtc_external_status(d)));
        Some(StatusSnapshot {
            event,
            uds: data.uds,
            external: data.external(),
            ext: data.ext,
            trip: data.trip_count,
            healing: data.healing_count,
            qualify: data.qualify,
            dtc,
        })
    }

    /// Apply the side effects of a status change
    ///
    /// Indicator requests follow WIR edges, MIL group pending counts follow
    /// PDTC edges, the stored group status of a combined DTC is recomputed
    /// and the status block is marked dirty when persisted data changed.
    pub fn commit(&mut self, before: StatusSnapshot) {
        let event = before.event;
        let Some(after) = self.store.event(event).cloned() else {
            return;
        };
        let old = before.uds;
        let new = after.uds;

        if old.warning_indicator() != new.warning_indicator() {
            if let Some(indicator) = self.indicator_of(event) {
                if new.warning_indicator() {
                    self.store.request_indicator(indicator);
                } else {
                    self.store.release_indicator(indicator);
                }
            }
        }
        if old.pending() != new.pending() {
            if let Some(group) = self.mil_group_of(event) {
                if new.pending() {
                    self.store.increment_mil_pending(group);
                } else {
                    self.store.decrement_mil_pending(group);
                }
            }
        }

        let persisted_change = (old.bits() ^ new.bits()) & !VOLATILE_BITS != 0
            || before.ext != after.ext
            || before.trip != after.trip_count
            || before.healing != after.healing_count
            || before.qualify != after.qualify;
        if persisted_change {
            self.dirty.mark(NvBlockId::Status);
        }

        if let Some((dtc, _)) = before.dtc {
            if self.tables.stores_group_status(dtc) {
                let combined = self.fold_members(dtc);
                if combined != self.store.dtc_status(dtc) {
                    self.store.set_dtc_status(dtc, combined);
                    self.dirty.mark(NvBlockId::Status);
                }
            }
        }

        let external = after.external();
        if external != before.external {
            tracing::debug!(
                event = %event,
                old = %before.external,
                new = %external,
                "Event status changed"
            );
            self.notify(Notification::EventStatusChanged {
                event,
                old: before.external,
                new: external,
            });
        }
        if let Some((dtc, dtc_before)) = before.dtc {
            let dtc_after = self.dtc_external_status(dtc);
            if dtc_after != dtc_before {
                if let Some(number) = self.cfg.dtc(dtc).map(|d| d.number) {
                    self.notify(Notification::DtcStatusChanged {
                        dtc: number,
                        old: dtc_before,
                        new: dtc_after,
                    });
                }
            }
        }
    }
}
