//! Fault memories
//!
//! Fixed-capacity slot pools for the primary, mirror and user memories,
//! plus the OBD permanent memory and the time-series memory. Memory ids
//! are assigned in the order primary (0), mirror (1), user memories (2..).

pub mod chronology;
pub mod data;
pub mod displacement;
pub mod entry;
pub mod permanent;
pub mod pool;
pub mod time_series;

pub use chronology::Chronology;
pub use data::{DataElement, DataProvider, NoDataProvider, RecordLayout, StaticDataProvider};
pub use displacement::{select_victim, VictimInfo};
pub use entry::MemoryEntry;
pub use permanent::{PermanentEntry, PermanentMemory};
pub use pool::{FaultMemory, MemoryKind};
pub use time_series::{TimeSeriesMemory, TimeSeriesSamples};

use crate::config::MemoryDestination;
use crate::ids::MemoryId;

pub const PRIMARY: MemoryId = MemoryId(0);
pub const MIRROR: MemoryId = MemoryId(1);

/// Memory id of a configured destination
pub fn memory_id(destination: MemoryDestination) -> MemoryId {
    match destination {
        MemoryDestination::Primary => PRIMARY,
        MemoryDestination::Mirror => MIRROR,
        MemoryDestination::User(n) => MemoryId(n.saturating_add(2)),
    }
}

/// Kind of a memory id
pub fn memory_kind(id: MemoryId) -> MemoryKind {
    match id.0 {
        0 => MemoryKind::Primary,
        1 => MemoryKind::Mirror,
        n => MemoryKind::User(n - 2),
    }
}
