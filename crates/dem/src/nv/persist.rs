//! Restore and commit of the Dem NV blocks
//!
//! Encoding happens with the state lock held; the bytes are written by
//! the caller after the lock is released and the outcomes fed back with
//! [`DemState::finish_nv_writes`].

use tracing::{debug, info, warn};

use super::blocks::{self, AdminBlock, EventRecord, StatusBlock};
use super::{layout_id, DirtyState, NvBlockId, NvStorage, WriteOutcome};
use crate::error::NvError;
use crate::event::effects::repair_restored;
use crate::ids::{DtcIndex, EntryIndex, EventId, IndicatorId, MemoryId, MilGroupId};
use crate::state::DemState;
use crate::status::{ExtendedStatus, QualifyStatus, StoredStatus, UdsStatus};
use crate::tables::ConfigLookup;

/// Encoded block waiting to be written
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub block: NvBlockId,
    pub state: DirtyState,
    pub bytes: Vec<u8>,
}

/// What an NV restore found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Admin block present with a matching layout
    pub layout_matched: bool,
    pub entries: usize,
    /// Blocks that failed to read or decode
    pub reinitialised: usize,
}

fn read(nv: &dyn NvStorage, block: NvBlockId) -> Result<Option<Vec<u8>>, NvError> {
    nv.read_block(block)
}

impl DemState {
    /// Every block the current configuration persists
    pub(crate) fn all_blocks(&self) -> Vec<NvBlockId> {
        let mut all = vec![NvBlockId::Admin, NvBlockId::Status];
        for memory in &self.memories {
            all.extend((0..memory.capacity()).map(|i| NvBlockId::Entry {
                memory: memory.id(),
                index: EntryIndex(i as u16),
            }));
        }
        if self.permanent.capacity() > 0 {
            all.push(NvBlockId::Permanent);
        }
        all
    }

    fn mark_all_dirty(&mut self) {
        for block in self.all_blocks() {
            self.dirty.mark(block);
        }
    }

    /// Load all blocks from `nv`
    ///
    /// A missing admin block or a layout mismatch starts from defaults and
    /// schedules a full write. Single blocks that fail to decode are
    /// reinitialised and rewritten.
    pub(crate) fn restore(&mut self, nv: &dyn NvStorage) -> RestoreReport {
        let mut report = RestoreReport::default();
        let admin = match read(nv, NvBlockId::Admin).and_then(|b| b.map(|b| blocks::decode_admin(&b)).transpose()) {
            Ok(Some(admin)) if admin.layout_id == layout_id(&self.cfg) => admin,
            Ok(Some(admin)) => {
                warn!(
                    stored = format!("0x{:08X}", admin.layout_id),
                    "NV layout changed, discarding stored data"
                );
                self.reset();
                self.mark_all_dirty();
                return report;
            }
            Ok(None) => {
                info!("No NV data, starting from defaults");
                self.mark_all_dirty();
                return report;
            }
            Err(e) => {
                warn!(error = %e, "Admin block unreadable, discarding stored data");
                self.reset();
                self.mark_all_dirty();
                report.reinitialised += 1;
                return report;
            }
        };
        report.layout_matched = true;
        self.apply_admin(&admin);

        match read(nv, NvBlockId::Status).and_then(|b| b.map(|b| blocks::decode_status(&b)).transpose()) {
            Ok(Some(status)) if status.events.len() == self.store.event_count() => self.apply_status(&status),
            Ok(Some(status)) => {
                warn!(events = status.events.len(), "Status block does not match the event table");
                self.dirty.mark(NvBlockId::Status);
                report.reinitialised += 1;
            }
            Ok(None) => self.dirty.mark(NvBlockId::Status),
            Err(e) => {
                warn!(error = %e, "Status block reinitialised");
                self.dirty.mark(NvBlockId::Status);
                report.reinitialised += 1;
            }
        }

        for memory_index in 0..self.memories.len() {
            let memory = MemoryId(memory_index as u8);
            let capacity = self.memories[memory_index].capacity();
            let data_size = self.tables.memory_data_size(memory);
            for i in 0..capacity {
                let index = EntryIndex(i as u16);
                let block = NvBlockId::Entry { memory, index };
                let decoded = read(nv, block).and_then(|b| b.map(|b| blocks::decode_entry(&b, data_size)).transpose());
                match decoded {
                    Ok(Some(entry)) if entry.is_free() => {}
                    Ok(Some(entry)) if self.entry_belongs_to(entry.event, memory) => {
                        if self.memories[memory_index].restore_slot(index, entry) {
                            report.entries += 1;
                        }
                    }
                    Ok(Some(entry)) => {
                        warn!(block = %block, event = %entry.event, "Entry does not belong to this memory");
                        self.dirty.mark(block);
                        report.reinitialised += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(block = %block, error = %e, "Entry block reinitialised");
                        self.dirty.mark(block);
                        report.reinitialised += 1;
                    }
                }
            }
        }
        self.renumber_stamps();

        if self.permanent.capacity() > 0 {
            match read(nv, NvBlockId::Permanent).and_then(|b| b.map(|b| blocks::decode_permanent(&b)).transpose()) {
                Ok(Some(slots)) => {
                    for (i, slot) in slots.into_iter().enumerate() {
                        let valid = slot.as_ref().map_or(true, |p| self.tables.dtc_of(p.event) == Some(p.dtc));
                        if !valid || !self.permanent.restore_slot(i, slot) {
                            self.dirty.mark(NvBlockId::Permanent);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Permanent block reinitialised");
                    self.dirty.mark(NvBlockId::Permanent);
                    report.reinitialised += 1;
                }
            }
        }

        self.reconcile_stored();
        let cfg = std::sync::Arc::clone(&self.cfg);
        let indicator_of = |e: EventId| cfg.event(e).and_then(|c| c.indicator).map(IndicatorId);
        let mil_group_of = |e: EventId| cfg.event(e).and_then(|c| c.mil_group).map(MilGroupId);
        self.store.rebuild_counters(indicator_of, mil_group_of);
        info!(
            entries = report.entries,
            reinitialised = report.reinitialised,
            "NV data restored"
        );
        report
    }

    /// Reassign the chronology stamps of all restored entries to 0..n
    ///
    /// The stamp counter wraps, so restored stamps are ordered circularly
    /// first. Entries whose stamp changes are rewritten.
    fn renumber_stamps(&mut self) {
        let mut stamped: Vec<(u32, (MemoryId, EntryIndex))> = self
            .memories
            .iter()
            .flat_map(|m| {
                m.slots()
                    .filter(|(_, e)| !e.is_free())
                    .map(move |(i, e)| (e.timestamp, (m.id(), i)))
            })
            .collect();
        order_by_stamp(&mut stamped);

        let next = stamped.len() as u32;
        for (stamp, (old, (memory, index))) in (0u32..).zip(stamped) {
            if old == stamp {
                continue;
            }
            if let Some(entry) = self.memory_mut(memory).and_then(|m| m.entry_mut(index)) {
                entry.timestamp = stamp;
            }
            self.mark_entry(memory, index);
        }
        for memory in &mut self.memories {
            memory.rebuild_chronology();
        }
        if self.timestamp != next {
            debug!(from = self.timestamp, to = next, "Chronology stamps renumbered");
            self.timestamp = next;
            self.dirty.mark(NvBlockId::Admin);
        }
    }

    fn entry_belongs_to(&self, event: EventId, memory: MemoryId) -> bool {
        self.tables.is_valid_event(event)
            && self.tables.representative(event) == event
            && self.tables.dtc_of(event).and_then(|d| self.tables.memory_of(d)) == Some(memory)
    }

    fn apply_admin(&mut self, admin: &AdminBlock) {
        self.timestamp = admin.timestamp;
        for (memory, overflow) in self.memories.iter_mut().zip(&admin.overflow) {
            memory.overflow = *overflow;
        }
        for (started, restored) in self.cycles_started.iter_mut().zip(&admin.cycles_started) {
            *started = *restored;
        }
    }

    fn apply_status(&mut self, status: &StatusBlock) {
        for (i, record) in status.events.iter().enumerate() {
            let Some(data) = self.store.event_mut(EventId(i as u16 + 1)) else {
                continue;
            };
            data.uds = repair_restored(UdsStatus::from_bits(record.uds));
            data.ext = ExtendedStatus::from_bits(record.ext);
            data.internal.stored = StoredStatus::from_byte(record.stored).unwrap_or_default();
            data.trip_count = record.trip;
            data.healing_count = record.healing;
            data.qualify = QualifyStatus::from_bits(record.qualify);
        }
        for (i, trip) in status.mil_trip.iter().enumerate() {
            if let Some(group) = self.store.mil_group_mut(MilGroupId(i as u16)) {
                group.trip_count = *trip;
            }
        }
        for (i, bits) in status.dtc_status.iter().enumerate() {
            let dtc = DtcIndex(i as u16);
            if self.tables.stores_group_status(dtc) {
                self.store.set_dtc_status(dtc, UdsStatus::from_bits(*bits));
            }
        }
    }

    /// Align the stored state of the representatives with the memories
    fn reconcile_stored(&mut self) {
        for event in self.tables.event_ids().collect::<Vec<_>>() {
            if self.tables.representative(event) != event {
                continue;
            }
            let entry = self.entry(event).map(|e| e.aging_only);
            let Some(data) = self.store.event_mut(event) else {
                continue;
            };
            let stored = match (entry, data.internal.stored) {
                (None, _) => StoredStatus::None,
                (Some(true), StoredStatus::None) => StoredStatus::Aging,
                (Some(false), StoredStatus::None) => StoredStatus::Active,
                (Some(_), stored) => stored,
            };
            if stored != data.internal.stored {
                debug!(event = %event, ?stored, "Stored state repaired");
                data.internal.stored = stored;
                self.dirty.mark(NvBlockId::Status);
            }
        }
    }

    // ── Commit ───────────────────────────────────────────────────────────────

    fn encode(&self, block: NvBlockId) -> Option<Vec<u8>> {
        match block {
            NvBlockId::Admin => Some(blocks::encode_admin(&AdminBlock {
                layout_id: layout_id(&self.cfg),
                timestamp: self.timestamp,
                overflow: self.memories.iter().map(|m| m.overflow).collect(),
                cycles_started: self.cycles_started.clone(),
            })),
            NvBlockId::Status => {
                let events = (1..=self.store.event_count())
                    .map(|i| {
                        self.store.event(EventId(i as u16)).map_or(EventRecord::default(), |d| EventRecord {
                            uds: d.uds.bits(),
                            ext: d.ext.bits(),
                            stored: d.internal.stored.to_byte(),
                            trip: d.trip_count,
                            healing: d.healing_count,
                            qualify: d.qualify.bits(),
                        })
                    })
                    .collect();
                Some(blocks::encode_status(&StatusBlock {
                    events,
                    mil_trip: self.store.mil_groups().iter().map(|g| g.trip_count).collect(),
                    dtc_status: self.tables.dtc_ids().map(|d| self.store.dtc_status(d).bits()).collect(),
                }))
            }
            NvBlockId::Entry { memory, index } => self
                .memories
                .get(memory.index())
                .and_then(|m| m.entry(index))
                .map(blocks::encode_entry),
            NvBlockId::Permanent => Some(blocks::encode_permanent(self.permanent.slots())),
        }
    }

    /// Encode up to `budget` dirty blocks (all of them for `None`)
    pub(crate) fn take_nv_writes(&mut self, budget: Option<usize>) -> Vec<PendingWrite> {
        let batch = match budget {
            Some(n) => self.dirty.take_batch(n),
            None => self.dirty.take_all(),
        };
        batch
            .into_iter()
            .filter_map(|(block, state)| match self.encode(block) {
                Some(bytes) => Some(PendingWrite { block, state, bytes }),
                None => {
                    self.checks.failed(crate::runtime_check::RuntimeCheck::NvBlock, block);
                    None
                }
            })
            .collect()
    }

    /// Feed back write results: failed blocks are requeued
    pub(crate) fn finish_nv_writes(&mut self, outcomes: &[WriteOutcome]) {
        for outcome in outcomes {
            if let Err(e) = &outcome.result {
                warn!(block = %outcome.block, error = %e, "NV write failed, block requeued");
                self.dirty.requeue(outcome.block, outcome.state);
            }
            self.on_clear_block_written(outcome);
        }
    }
}

/// Sort `(stamp, key)` pairs oldest first when the stamps may have wrapped
///
/// Live stamps cover a short arc of the u32 range; the oldest one follows
/// the widest gap between circular neighbours.
fn order_by_stamp<T: Ord>(items: &mut [(u32, T)]) {
    items.sort();
    let len = items.len();
    let start = (0..len).max_by_key(|&i| {
        let prev = items[(i + len - 1) % len].0;
        (items[i].0.wrapping_sub(prev), std::cmp::Reverse(i))
    });
    if let Some(start) = start {
        items.rotate_left(start);
    }
}

/// Write encoded blocks; call without the state lock held
pub fn write_blocks(nv: &dyn NvStorage, writes: Vec<PendingWrite>) -> Vec<WriteOutcome> {
    writes
        .into_iter()
        .map(|w| {
            let result = nv.write_block(w.block, &w.bytes);
            if result.is_ok() {
                debug!(block = %w.block, bytes = w.bytes.len(), "NV block written");
            }
            WriteOutcome {
                block: w.block,
                state: w.state,
                result,
            }
        })
        .collect()
}
