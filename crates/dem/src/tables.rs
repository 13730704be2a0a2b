//! Lookup tables derived from the configuration
//!
//! Built once at construction; read-only afterwards.

use std::collections::HashMap;

use crate::config::{Combination, DemConfig, DtcConfig, EventConfig};
use crate::ids::{CycleId, DtcIndex, EventId, MemoryId, MilGroupId};
use crate::memory::{self, RecordLayout};

#[derive(Debug, Clone)]
pub struct Tables {
    /// Indexed by event id; slot 0 unused
    event_dtc: Vec<Option<DtcIndex>>,
    /// Member events of each DTC, ascending
    dtc_events: Vec<Vec<EventId>>,
    dtc_by_number: HashMap<u32, DtcIndex>,
    dtc_memory: Vec<MemoryId>,
    layouts: Vec<RecordLayout>,
    mil_members: Vec<Vec<EventId>>,
    cycle_events: Vec<Vec<EventId>>,
    /// Largest record layout per memory id
    memory_data_size: Vec<usize>,
    combination: Combination,
}

impl Tables {
    pub fn build(config: &DemConfig) -> Self {
        let dtc_by_number: HashMap<u32, DtcIndex> = config
            .dtcs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.number, DtcIndex(i as u16)))
            .collect();

        let mut event_dtc = vec![None; config.events.len() + 1];
        let mut dtc_events = vec![Vec::new(); config.dtcs.len()];
        let mut mil_members = vec![Vec::new(); config.mil_groups.len()];
        let mut cycle_events = vec![Vec::new(); config.operation_cycles.len()];

        for (i, event) in config.events.iter().enumerate() {
            let id = EventId(i as u16 + 1);
            let dtc = event.dtc.and_then(|n| dtc_by_number.get(&n).copied());
            event_dtc[id.index()] = dtc;
            if let Some(dtc) = dtc {
                dtc_events[dtc.index()].push(id);
            }
            if let Some(group) = event.mil_group.and_then(|g| mil_members.get_mut(g as usize)) {
                group.push(id);
            }
            if let Some(cycle) = cycle_events.get_mut(event.operation_cycle as usize) {
                cycle.push(id);
            }
        }

        let dtc_memory: Vec<MemoryId> = config
            .dtcs
            .iter()
            .map(|d| memory::memory_id(d.destination))
            .collect();
        let layouts: Vec<RecordLayout> = config.dtcs.iter().map(RecordLayout::for_dtc).collect();

        let memory_count = 2 + config.memory.user_sizes.len();
        let mut memory_data_size = vec![0usize; memory_count];
        for (layout, memory) in layouts.iter().zip(&dtc_memory) {
            if let Some(size) = memory_data_size.get_mut(memory.index()) {
                *size = (*size).max(layout.total);
            }
        }

        Self {
            event_dtc,
            dtc_events,
            dtc_by_number,
            dtc_memory,
            layouts,
            mil_members,
            cycle_events,
            memory_data_size,
            combination: config.features.combination,
        }
    }

    /// Number of configured events
    pub fn event_count(&self) -> usize {
        self.event_dtc.len() - 1
    }

    /// Whether `id` lies in [1, event_count]
    pub fn is_valid_event(&self, id: EventId) -> bool {
        id.is_valid() && id.index() < self.event_dtc.len()
    }

    /// All configured event ids, ascending
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> {
        (1..self.event_dtc.len() as u16).map(EventId)
    }

    pub fn dtc_count(&self) -> usize {
        self.dtc_events.len()
    }

    pub fn dtc_ids(&self) -> impl Iterator<Item = DtcIndex> {
        (0..self.dtc_events.len() as u16).map(DtcIndex)
    }

    pub fn dtc_of(&self, event: EventId) -> Option<DtcIndex> {
        self.event_dtc.get(event.index()).copied().flatten()
    }

    pub fn events_of(&self, dtc: DtcIndex) -> &[EventId] {
        self.dtc_events.get(dtc.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dtc_index(&self, number: u32) -> Option<DtcIndex> {
        self.dtc_by_number.get(&number).copied()
    }

    pub fn memory_of(&self, dtc: DtcIndex) -> Option<MemoryId> {
        self.dtc_memory.get(dtc.index()).copied()
    }

    pub fn layout(&self, dtc: DtcIndex) -> Option<&RecordLayout> {
        self.layouts.get(dtc.index())
    }

    pub fn memory_count(&self) -> usize {
        self.memory_data_size.len()
    }

    pub fn memory_data_size(&self, memory: MemoryId) -> usize {
        self.memory_data_size.get(memory.index()).copied().unwrap_or(0)
    }

    pub fn mil_members(&self, group: MilGroupId) -> &[EventId] {
        self.mil_members.get(group.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cycle_events(&self, cycle: CycleId) -> &[EventId] {
        self.cycle_events.get(cycle.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// DTC with more than one event
    pub fn is_combined(&self, dtc: DtcIndex) -> bool {
        self.events_of(dtc).len() > 1
    }

    /// Whether the group status of `dtc` is persisted
    pub fn stores_group_status(&self, dtc: DtcIndex) -> bool {
        self.combination == Combination::OnStorage && self.is_combined(dtc)
    }

    /// Event whose slot and counters carry the stored data of `event`
    ///
    /// With combination on storage all members of a combined DTC share the
    /// entry of the lowest member event; otherwise each event stands alone.
    pub fn representative(&self, event: EventId) -> EventId {
        match self.dtc_of(event) {
            Some(dtc) if self.stores_group_status(dtc) => {
                self.events_of(dtc).first().copied().unwrap_or(event)
            }
            _ => event,
        }
    }

    /// Events sharing the stored data of `representative`
    pub fn represented_events(&self, representative: EventId) -> Vec<EventId> {
        match self.dtc_of(representative) {
            Some(dtc) if self.stores_group_status(dtc) => self.events_of(dtc).to_vec(),
            _ => vec![representative],
        }
    }
}

/// Config lookups by typed index
pub trait ConfigLookup {
    fn event(&self, id: EventId) -> Option<&EventConfig>;
    fn dtc(&self, index: DtcIndex) -> Option<&DtcConfig>;
}

impl ConfigLookup for DemConfig {
    fn event(&self, id: EventId) -> Option<&EventConfig> {
        if !id.is_valid() {
            return None;
        }
        self.events.get(id.index() - 1)
    }

    fn dtc(&self, index: DtcIndex) -> Option<&DtcConfig> {
        self.dtcs.get(index.index())
    }
}
