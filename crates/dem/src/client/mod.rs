//! Diagnostic client interface
//!
//! Operations used by diagnostic communication layers: DTC filtering,
//! status and record readout, clearing, and record update locking. Every
//! client has its own filter cursor; only one clear may run at a time.

pub mod clear;
pub mod filter;
pub mod readout;

use serde::{Deserialize, Serialize};

pub use clear::{ClearProgress, DtcSelector};
pub use filter::DtcFilter;

pub(crate) use clear::ClearJob;

use crate::error::{DemError, DemResult};
use crate::ids::{ClientId, DtcIndex, EventId, MemoryId};
use crate::memory::{self, MemoryEntry};
use crate::state::DemState;

/// Memory a client request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcOrigin {
    Primary,
    Mirror,
    User(u8),
    /// OBD permanent memory
    Permanent,
}

impl DtcOrigin {
    /// Fault memory of the origin; `None` for the permanent memory
    pub fn memory(self) -> Option<MemoryId> {
        match self {
            DtcOrigin::Primary => Some(memory::PRIMARY),
            DtcOrigin::Mirror => Some(memory::MIRROR),
            DtcOrigin::User(n) => Some(MemoryId(n.saturating_add(2))),
            DtcOrigin::Permanent => None,
        }
    }
}

impl std::fmt::Display for DtcOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DtcOrigin::Primary => f.write_str("primary"),
            DtcOrigin::Mirror => f.write_str("mirror"),
            DtcOrigin::User(n) => write!(f, "user-{}", n),
            DtcOrigin::Permanent => f.write_str("permanent"),
        }
    }
}

/// Per-client bookkeeping
#[derive(Debug, Clone, Default)]
pub(crate) struct ClientState {
    pub filter: Option<filter::FilterState>,
    /// DTC frozen by `disable_dtc_record_update`
    pub record_lock: Option<(DtcIndex, MemoryId)>,
}

impl DemState {
    /// Fault memory behind `origin`, if it exists and has slots
    pub(crate) fn origin_memory(&self, origin: DtcOrigin) -> DemResult<MemoryId> {
        origin
            .memory()
            .filter(|m| self.memories.get(m.index()).map_or(false, |mem| mem.capacity() > 0))
            .ok_or_else(|| DemError::WrongDtcOrigin(origin.to_string()))
    }

    /// Configured DTC stored in the memory of `origin`
    pub(crate) fn resolve_dtc(&self, number: u32, origin: DtcOrigin) -> DemResult<(DtcIndex, MemoryId)> {
        let memory = self.origin_memory(origin)?;
        let dtc = self.tables.dtc_index(number).ok_or(DemError::WrongDtc(number))?;
        if self.tables.memory_of(dtc) != Some(memory) {
            return Err(DemError::WrongDtc(number));
        }
        Ok((dtc, memory))
    }

    /// Memory representative of a DTC
    pub(crate) fn dtc_representative(&self, dtc: DtcIndex) -> Option<EventId> {
        self.tables
            .events_of(dtc)
            .first()
            .map(|e| self.tables.representative(*e))
    }

    /// Occupied entry of `dtc` in `memory`
    pub(crate) fn dtc_entry(&self, dtc: DtcIndex, memory: MemoryId) -> Option<&MemoryEntry> {
        let mem = self.memories.get(memory.index())?;
        self.tables
            .events_of(dtc)
            .iter()
            .find_map(|e| mem.find(self.tables.representative(*e)))
            .and_then(|index| mem.entry(index))
            .filter(|entry| !entry.aging_only)
    }

    pub(crate) fn client_mut(&mut self, client: ClientId) -> &mut ClientState {
        self.clients.entry(client).or_default()
    }

    /// Freeze the entry of a DTC: no record updates, no displacement
    pub(crate) fn disable_record_update(
        &mut self,
        client: ClientId,
        number: u32,
        origin: DtcOrigin,
    ) -> DemResult<()> {
        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let (dtc, memory) = self.resolve_dtc(number, origin)?;
        if let Some((old_dtc, old_memory)) = self.client_mut(client).record_lock.take() {
            self.set_record_lock(old_dtc, old_memory, false);
        }
        self.set_record_lock(dtc, memory, true);
        self.client_mut(client).record_lock = Some((dtc, memory));
        Ok(())
    }

    pub(crate) fn enable_record_update(&mut self, client: ClientId) -> DemResult<()> {
        match self.client_mut(client).record_lock.take() {
            Some((dtc, memory)) => {
                self.set_record_lock(dtc, memory, false);
                Ok(())
            }
            None => Err(DemError::Rejected("record update not disabled".into())),
        }
    }

    fn set_record_lock(&mut self, dtc: DtcIndex, memory: MemoryId, locked: bool) {
        let Some(rep) = self.dtc_representative(dtc) else {
            return;
        };
        let Some(mem) = self.memories.get_mut(memory.index()) else {
            return;
        };
        let Some(index) = mem.find(rep) else {
            return;
        };
        if let Some(entry) = mem.entry_mut(index) {
            entry.record_update_locked = locked;
        }
    }

    /// Whether a memory lost an entry for lack of space
    pub(crate) fn memory_overflow(&self, origin: DtcOrigin) -> DemResult<bool> {
        let memory = self.origin_memory(origin)?;
        Ok(self.memories.get(memory.index()).map_or(false, |m| m.overflow))
    }

    pub(crate) fn memory_entry_count(&self, origin: DtcOrigin) -> DemResult<usize> {
        if origin == DtcOrigin::Permanent {
            return Ok(self.permanent.len());
        }
        let memory = self.origin_memory(origin)?;
        Ok(self
            .memories
            .get(memory.index())
            .map_or(0, |m| m.iter_chronological().filter(|(_, e)| !e.aging_only).count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemConfig, DtcConfig, EventConfig};
    use crate::ids::CycleId;
    use crate::monitor::MonitorState;
    use crate::state::tests::state_for;

    fn setup() -> DemState {
        let mut config = DemConfig::default();
        config.memory.primary_size = 2;
        config.dtcs.push(DtcConfig::new(0x010100));
        config.dtcs.push(DtcConfig::new(0x010200));
        config.dtcs.push(DtcConfig::new(0x010300));
        for (name, dtc) in [("a", 0x010100), ("b", 0x010200), ("c", 0x010300)] {
            config.events.push(EventConfig::new(name, Some(dtc)));
        }
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));
        state
    }

    #[test]
    fn test_origin_validation() {
        let state = setup();
        assert!(state.origin_memory(DtcOrigin::Primary).is_ok());
        assert!(matches!(
            state.origin_memory(DtcOrigin::Mirror),
            Err(DemError::WrongDtcOrigin(_))
        ));
        assert!(matches!(
            state.resolve_dtc(0x999999, DtcOrigin::Primary),
            Err(DemError::WrongDtc(0x999999))
        ));
    }

    #[test]
    fn test_record_lock_blocks_displacement() {
        let mut config = DemConfig::default();
        config.memory.primary_size = 1;
        config.features.displacement = crate::config::DisplacementStrategy::Full;
        config.dtcs.push(DtcConfig::new(0x010100));
        config.dtcs.push(DtcConfig::new(0x010200));
        let mut low = EventConfig::new("low", Some(0x010100));
        low.priority = 5;
        config.events.push(low);
        config.events.push(EventConfig::new("high", Some(0x010200)));
        let mut monitor = MonitorState::new(&config);
        let mut state = state_for(config);
        state.op_cycle_start(&mut monitor, CycleId(0));

        state.process_failed(EventId(1), 127);
        state
            .disable_record_update(ClientId(0), 0x010100, DtcOrigin::Primary)
            .unwrap();
        state.process_failed(EventId(2), 127);
        assert!(state.entry(EventId(2)).is_none());
        assert!(state.memory_overflow(DtcOrigin::Primary).unwrap());

        state.enable_record_update(ClientId(0)).unwrap();
        assert!(!state.entry(EventId(1)).unwrap().record_update_locked);
        assert!(state.enable_record_update(ClientId(0)).is_err());
    }

    #[test]
    fn test_entry_count() {
        let mut state = setup();
        assert_eq!(state.memory_entry_count(DtcOrigin::Primary).unwrap(), 0);
        state.process_failed(EventId(1), 127);
        assert_eq!(state.memory_entry_count(DtcOrigin::Primary).unwrap(), 1);
        assert_eq!(state.memory_entry_count(DtcOrigin::Permanent).unwrap(), 0);
    }
}
