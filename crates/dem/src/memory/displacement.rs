//! Victim selection when a fault memory is full
//!
//! Candidates are ranked into classes, lowest class wins and ties go to
//! the oldest entry in the chronology:
//!
//! | class | entry                                   | strategies      |
//! |-------|-----------------------------------------|-----------------|
//! | 0     | aged (retained after aging)             | all             |
//! | 1     | lower priority, passive                 | Priority, Full  |
//! | 2     | lower priority, active                  | Priority, Full  |
//! | 3     | equal priority, passive                 | Full            |
//!
//! Entries frozen by `disable_dtc_record_update` are never displaced.

use crate::config::DisplacementStrategy;
use crate::ids::EntryIndex;

use super::entry::MemoryEntry;
use super::pool::FaultMemory;

/// Ranking inputs of an occupied entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VictimInfo {
    /// Event priority, 1 is the highest
    pub priority: u8,
    /// The owning event is not currently failed
    pub passive: bool,
    /// Aging completed, entry only retained
    pub aged: bool,
}

fn class_of(info: VictimInfo, new_priority: u8, strategy: DisplacementStrategy) -> Option<u8> {
    if info.aged {
        return Some(0);
    }
    let lower = info.priority > new_priority;
    let equal = info.priority == new_priority;
    match strategy {
        DisplacementStrategy::None => None,
        DisplacementStrategy::Priority => match (lower, info.passive) {
            (true, true) => Some(1),
            (true, false) => Some(2),
            _ => None,
        },
        DisplacementStrategy::Full => match (lower, equal, info.passive) {
            (true, _, true) => Some(1),
            (true, _, false) => Some(2),
            (false, true, true) => Some(3),
            _ => None,
        },
    }
}

/// Pick the entry to displace for a new event of priority `new_priority`
pub fn select_victim<F>(
    memory: &FaultMemory,
    new_priority: u8,
    strategy: DisplacementStrategy,
    info: F,
) -> Option<EntryIndex>
where
    F: Fn(&MemoryEntry) -> VictimInfo,
{
    let mut best: Option<(u8, EntryIndex)> = None;
    for (index, entry) in memory.iter_chronological() {
        if entry.record_update_locked {
            continue;
        }
        let Some(class) = class_of(info(entry), new_priority, strategy) else {
            continue;
        };
        // Chronological iteration: the first entry of a class is the oldest
        if best.map_or(true, |(c, _)| class < c) {
            best = Some((class, index));
        }
    }
    best.map(|(_, index)| index)
}
