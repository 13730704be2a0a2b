//! Fault memory entry (one slot of a memory pool)

use crate::ids::EventId;

/// One fault memory slot
///
/// A slot is free while `event` is [`EventId::INVALID`]. Occupied slots
/// belong to the memory representative of the stored DTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub event: EventId,
    /// Chronology stamp; larger is newer
    pub timestamp: u32,
    pub occurrence_counter: u8,
    /// Elapsed aging cycles
    pub aging_counter: u8,
    pub max_fdc: i8,
    pub cycles_since_first_failed: u8,
    pub cycles_since_last_failed: u8,
    pub failed_cycles: u8,
    /// UDS status of the event when the entry was allocated
    pub pre_confirmed_status: u8,
    /// Bit n set: snapshot record n of the DTC layout holds data
    pub snapshot_valid: u32,
    /// Bit n set: extended record n of the DTC layout holds data
    pub extended_valid: u32,
    /// Record buffer sized for the largest DTC layout of the memory
    pub data: Vec<u8>,
    /// Entry only tracks aging of a confirmed DTC that lost its entry
    pub aging_only: bool,
    /// Frozen by `disable_dtc_record_update`
    pub record_update_locked: bool,
}

impl MemoryEntry {
    pub fn new(data_size: usize) -> Self {
        Self {
            event: EventId::INVALID,
            timestamp: 0,
            occurrence_counter: 0,
            aging_counter: 0,
            max_fdc: 0,
            cycles_since_first_failed: 0,
            cycles_since_last_failed: 0,
            failed_cycles: 0,
            pre_confirmed_status: 0,
            snapshot_valid: 0,
            extended_valid: 0,
            data: vec![0; data_size],
            aging_only: false,
            record_update_locked: false,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.event.is_valid()
    }

    /// Take the slot for `event`, resetting all counters and records
    pub fn occupy(&mut self, event: EventId, timestamp: u32, status: u8) {
        let size = self.data.len();
        *self = MemoryEntry::new(size);
        self.event = event;
        self.timestamp = timestamp;
        self.pre_confirmed_status = status;
    }

    pub fn release(&mut self) {
        let size = self.data.len();
        *self = MemoryEntry::new(size);
    }

    pub fn snapshot_is_valid(&self, index: usize) -> bool {
        index < 32 && self.snapshot_valid & (1 << index) != 0
    }

    pub fn extended_is_valid(&self, index: usize) -> bool {
        index < 32 && self.extended_valid & (1 << index) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_and_release() {
        let mut entry = MemoryEntry::new(4);
        assert!(entry.is_free());

        entry.occupy(EventId(3), 7, 0x2F);
        entry.occurrence_counter = 2;
        entry.snapshot_valid = 0b10;
        assert!(!entry.is_free());
        assert!(entry.snapshot_is_valid(1));
        assert!(!entry.snapshot_is_valid(0));
        assert_eq!(entry.timestamp, 7);

        entry.occupy(EventId(4), 9, 0x00);
        assert_eq!(entry.occurrence_counter, 0);
        assert_eq!(entry.snapshot_valid, 0);

        entry.release();
        assert!(entry.is_free());
        assert_eq!(entry.data.len(), 4);
    }
}
