//! Fixed-capacity fault memory pool

use crate::ids::{EntryIndex, EventId, MemoryId};

use super::chronology::Chronology;
use super::entry::MemoryEntry;

/// Logical role of a memory pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Primary,
    Mirror,
    User(u8),
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Primary => f.write_str("primary"),
            MemoryKind::Mirror => f.write_str("mirror"),
            MemoryKind::User(n) => write!(f, "user{}", n),
        }
    }
}

/// One fault memory: a fixed slot array plus its chronology
///
/// The number of occupied slots never exceeds the capacity given at
/// construction; slots are reused, never added.
#[derive(Debug, Clone)]
pub struct FaultMemory {
    id: MemoryId,
    entries: Vec<MemoryEntry>,
    chronology: Chronology,
    /// An entry could not be stored since the last clear
    pub overflow: bool,
}

impl FaultMemory {
    pub fn new(id: MemoryId, capacity: usize, data_size: usize) -> Self {
        Self {
            id,
            entries: (0..capacity).map(|_| MemoryEntry::new(data_size)).collect(),
            chronology: Chronology::with_capacity(capacity),
            overflow: false,
        }
    }

    pub fn id(&self) -> MemoryId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn occupied(&self) -> usize {
        self.chronology.len()
    }

    pub fn chronology(&self) -> &Chronology {
        &self.chronology
    }

    /// Bounds-checked slot access
    pub fn entry(&self, index: EntryIndex) -> Option<&MemoryEntry> {
        self.entries.get(index.index())
    }

    /// Bounds-checked mutable slot access
    pub fn entry_mut(&mut self, index: EntryIndex) -> Option<&mut MemoryEntry> {
        self.entries.get_mut(index.index())
    }

    /// Slot owned by `event`
    pub fn find(&self, event: EventId) -> Option<EntryIndex> {
        self.chronology
            .iter()
            .find(|i| self.entries.get(i.index()).map(|e| e.event) == Some(event))
    }

    /// Lowest free slot
    pub fn free_slot(&self) -> Option<EntryIndex> {
        self.entries
            .iter()
            .position(MemoryEntry::is_free)
            .map(|i| EntryIndex(i as u16))
    }

    /// Occupy a free slot for `event` and append it to the chronology
    ///
    /// Returns `false` if the slot does not exist or is occupied.
    pub fn allocate(&mut self, index: EntryIndex, event: EventId, timestamp: u32, status: u8) -> bool {
        match self.entries.get_mut(index.index()) {
            Some(entry) if entry.is_free() => {
                entry.occupy(event, timestamp, status);
                self.chronology.push_newest(index);
                true
            }
            _ => false,
        }
    }

    /// Free a slot and drop it from the chronology
    pub fn release(&mut self, index: EntryIndex) -> Option<EventId> {
        let entry = self.entries.get_mut(index.index())?;
        if entry.is_free() {
            return None;
        }
        let event = entry.event;
        entry.release();
        self.chronology.remove(index);
        Some(event)
    }

    /// Move an occupied slot to the newest chronology position
    pub fn refresh(&mut self, index: EntryIndex, timestamp: u32) {
        if let Some(entry) = self.entries.get_mut(index.index()) {
            if !entry.is_free() {
                entry.timestamp = timestamp;
                self.chronology.push_newest(index);
            }
        }
    }

    /// Occupied slots, oldest first
    pub fn iter_chronological(&self) -> impl Iterator<Item = (EntryIndex, &MemoryEntry)> + '_ {
        self.chronology
            .iter()
            .filter_map(|i| self.entries.get(i.index()).map(|e| (i, e)))
    }

    /// All slots including free ones, by index
    pub fn slots(&self) -> impl Iterator<Item = (EntryIndex, &MemoryEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (EntryIndex(i as u16), e))
    }

    /// Replace a slot with restored content and rebuild the chronology
    pub fn restore_slot(&mut self, index: EntryIndex, restored: MemoryEntry) -> bool {
        match self.entries.get_mut(index.index()) {
            Some(entry) if entry.data.len() == restored.data.len() => {
                *entry = restored;
                true
            }
            _ => false,
        }
    }

    pub fn rebuild_chronology(&mut self) {
        let occupied: Vec<(EntryIndex, u32)> = self
            .slots()
            .filter(|(_, e)| !e.is_free())
            .map(|(i, e)| (i, e.timestamp))
            .collect();
        self.chronology.rebuild(occupied);
    }
}
