//! NV storage backends

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::NvBlockId;
use crate::error::NvError;

/// Block-oriented non-volatile storage
pub trait NvStorage: Send + Sync {
    /// Read a block; `Ok(None)` if it was never written
    fn read_block(&self, block: NvBlockId) -> Result<Option<Vec<u8>>, NvError>;

    /// Persist a block
    fn write_block(&self, block: NvBlockId, data: &[u8]) -> Result<(), NvError>;
}

/// In-RAM storage with write failure injection
#[derive(Debug, Default)]
pub struct MemoryNvStorage {
    blocks: Mutex<HashMap<NvBlockId, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryNvStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn block(&self, block: NvBlockId) -> Option<Vec<u8>> {
        self.blocks.lock().get(&block).cloned()
    }

    pub fn blocks(&self) -> Vec<NvBlockId> {
        let mut ids: Vec<NvBlockId> = self.blocks.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Flip a byte of a stored block
    pub fn corrupt(&self, block: NvBlockId, offset: usize) -> bool {
        match self.blocks.lock().get_mut(&block).and_then(|b| b.get_mut(offset)) {
            Some(byte) => {
                *byte ^= 0xFF;
                true
            }
            None => false,
        }
    }
}

impl NvStorage for MemoryNvStorage {
    fn read_block(&self, block: NvBlockId) -> Result<Option<Vec<u8>>, NvError> {
        Ok(self.blocks.lock().get(&block).cloned())
    }

    fn write_block(&self, block: NvBlockId, data: &[u8]) -> Result<(), NvError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NvError::Rejected(block.to_string()));
        }
        self.blocks.lock().insert(block, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One file per block below a directory
#[derive(Debug, Clone)]
pub struct FileNvStorage {
    dir: PathBuf,
}

impl FileNvStorage {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, NvError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, block: NvBlockId) -> PathBuf {
        self.dir.join(format!("{}.bin", block))
    }
}

impl NvStorage for FileNvStorage {
    fn read_block(&self, block: NvBlockId) -> Result<Option<Vec<u8>>, NvError> {
        match std::fs::read(self.path(block)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NvError::Io(e)),
        }
    }

    fn write_block(&self, block: NvBlockId, data: &[u8]) -> Result<(), NvError> {
        let path = self.path(block);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        debug!(block = %block, bytes = data.len(), "NV block written");
        Ok(())
    }
}
