//! Dirty block tracking

use std::collections::BTreeMap;

use super::NvBlockId;

/// Commit urgency of a dirty block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// Written when the per-cycle budget allows
    Dirty,
    /// Written before any `Dirty` block
    Immediate,
}

#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    blocks: BTreeMap<NvBlockId, DirtyState>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, block: NvBlockId) {
        self.blocks.entry(block).or_insert(DirtyState::Dirty);
    }

    pub fn mark_immediate(&mut self, block: NvBlockId) {
        self.blocks.insert(block, DirtyState::Immediate);
    }

    pub fn state(&self, block: NvBlockId) -> Option<DirtyState> {
        self.blocks.get(&block).copied()
    }

    pub fn is_dirty(&self, block: NvBlockId) -> bool {
        self.blocks.contains_key(&block)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Remove up to `budget` blocks for writing, immediate blocks first
    pub fn take_batch(&mut self, budget: usize) -> Vec<(NvBlockId, DirtyState)> {
        let batch: Vec<(NvBlockId, DirtyState)> = self
            .ordered()
            .into_iter()
            .take(budget)
            .collect();
        for (block, _) in &batch {
            self.blocks.remove(block);
        }
        batch
    }

    /// Remove every dirty block, immediate blocks first
    pub fn take_all(&mut self) -> Vec<(NvBlockId, DirtyState)> {
        let all = self.ordered();
        self.blocks.clear();
        all
    }

    fn ordered(&self) -> Vec<(NvBlockId, DirtyState)> {
        let mut all: Vec<(NvBlockId, DirtyState)> = self.blocks.iter().map(|(b, s)| (*b, *s)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        all
    }

    /// Put a block back after a failed write, keeping a stronger state
    pub fn requeue(&mut self, block: NvBlockId, state: DirtyState) {
        let entry = self.blocks.entry(block).or_insert(state);
        if state > *entry {
            *entry = state;
        }
    }
}
