//! OBD permanent fault memory
//!
//! Holds OBD DTCs that requested the MIL. Capacity-bound, no displacement;
//! entries survive a client clear until the DTC healed or passed.

use crate::ids::{DtcIndex, EventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermanentEntry {
    pub dtc: DtcIndex,
    /// Event that activated the MIL
    pub event: EventId,
}

#[derive(Debug, Clone, Default)]
pub struct PermanentMemory {
    slots: Vec<Option<PermanentEntry>>,
}

impl PermanentMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, dtc: DtcIndex) -> bool {
        self.slots.iter().flatten().any(|e| e.dtc == dtc)
    }

    /// Add a DTC; `false` if the memory is full. Adding a present DTC is a no-op.
    pub fn add(&mut self, dtc: DtcIndex, event: EventId) -> bool {
        if self.contains(dtc) {
            return true;
        }
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some(PermanentEntry { dtc, event });
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, dtc: DtcIndex) -> bool {
        let mut removed = false;
        for slot in &mut self.slots {
            if slot.map(|e| e.dtc) == Some(dtc) {
                *slot = None;
                removed = true;
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermanentEntry> + '_ {
        self.slots.iter().flatten()
    }

    /// Raw slots, for NV encoding
    pub fn slots(&self) -> &[Option<PermanentEntry>] {
        &self.slots
    }

    pub fn restore_slot(&mut self, index: usize, entry: Option<PermanentEntry>) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }
}
