//! NV persistence
//!
//! RAM is authoritative. Changes mark blocks dirty; the main function
//! encodes up to `nv_writes_per_cycle` dirty blocks under the state lock
//! and writes them after releasing it. Blocks that fail to decode at init
//! are reinitialised.

pub mod blocks;
pub mod codec;
pub mod dirty;
pub mod persist;
pub mod storage;

pub use dirty::{DirtyState, DirtyTracker};
pub use persist::{write_blocks, PendingWrite, RestoreReport};
pub use storage::{FileNvStorage, MemoryNvStorage, NvStorage};

use crc::{Crc, CRC_32_ISO_HDLC};
use serde::Serialize;

use crate::config::DemConfig;
use crate::ids::{EntryIndex, MemoryId};

/// Identifies one NV block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NvBlockId {
    Admin,
    Status,
    Entry { memory: MemoryId, index: EntryIndex },
    Permanent,
}

impl std::fmt::Display for NvBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NvBlockId::Admin => f.write_str("admin"),
            NvBlockId::Status => f.write_str("status"),
            NvBlockId::Entry { memory, index } => write!(f, "entry-{}-{}", memory.0, index.0),
            NvBlockId::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Serialize)]
struct LayoutKey<'a> {
    events: usize,
    dtcs: Vec<u32>,
    memory: &'a crate::config::MemoryConfig,
    mil_groups: usize,
    cycles: usize,
    records: Vec<usize>,
}

/// Fingerprint of everything the NV layout depends on
///
/// Data written under a different layout id is discarded at init.
pub fn layout_id(config: &DemConfig) -> u32 {
    let key = LayoutKey {
        events: config.events.len(),
        dtcs: config.dtcs.iter().map(|d| d.number).collect(),
        memory: &config.memory,
        mil_groups: config.mil_groups.len(),
        cycles: config.operation_cycles.len(),
        records: config
            .dtcs
            .iter()
            .map(|d| crate::memory::RecordLayout::for_dtc(d).total)
            .collect(),
    };
    let encoded = serde_json::to_vec(&key).unwrap_or_default();
    Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&encoded)
}

/// Result of committing one block
#[derive(Debug)]
pub struct WriteOutcome {
    pub block: NvBlockId,
    pub state: DirtyState,
    pub result: Result<(), crate::error::NvError>,
}
