//! Typed indices into the Dem tables
//!
//! Every cross reference inside the Dem is an index into a statically
//! sized table. The newtypes below keep the different index spaces apart;
//! range validation happens in the owning table's accessors.

use serde::{Deserialize, Serialize};

/// Event identifier (1-based, 0 is reserved as invalid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u16);

impl EventId {
    /// The reserved invalid event id
    pub const INVALID: EventId = EventId(0);

    /// Table index of this event (the id itself, slot 0 is unused)
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EventId {
    fn from(id: u16) -> Self {
        EventId(id)
    }
}

/// Slot index inside one fault memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryIndex(pub u16);

impl EntryIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EntryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into the DTC table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtcIndex(pub u16);

impl DtcIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a fault memory pool (primary, mirror, user memories)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u8);

impl MemoryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the MIL group table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilGroupId(pub u16);

impl MilGroupId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the indicator table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorId(pub u8);

impl IndicatorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the operation cycle table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub u8);

impl CycleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a diagnostic client (Dcm, J1939Dcm, tester application)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u8);

/// Index into the enable or storage condition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(pub u8);

impl ConditionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
