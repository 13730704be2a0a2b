//! ClearDiagnosticInformation
//!
//! A clear request is validated when it is made and executed by the next
//! main function. The job then waits until every NV block it touched has
//! been written. The requesting client polls with the same call and gets
//! [`ClearProgress::Pending`] until the outcome is known; any other client
//! gets `ClearBusy` meanwhile.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use super::DtcOrigin;
use crate::dtc::{dtc_group, DtcNumber};
use crate::error::{DemError, DemResult};
use crate::ids::{ClientId, DtcIndex, MemoryId};
use crate::memory;
use crate::monitor::MonitorState;
use crate::notify::Notification;
use crate::nv::{NvBlockId, WriteOutcome};
use crate::state::DemState;
use crate::tables::ConfigLookup;

/// DTCs addressed by a clear request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtcSelector {
    All,
    /// Functional group by group address (0x000000, 0x400000, ..)
    Group(u32),
    Single(DtcIndex),
}

impl DtcSelector {
    fn matches(self, dtc: DtcIndex, number: u32) -> bool {
        match self {
            DtcSelector::All => true,
            DtcSelector::Group(group) => DtcNumber(number).category().group_address() == group,
            DtcSelector::Single(selected) => selected == dtc,
        }
    }
}

/// Progress of an accepted clear request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearProgress {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClearFailure {
    NotAllowed,
    Memory(String),
}

impl From<ClearFailure> for DemError {
    fn from(failure: ClearFailure) -> Self {
        match failure {
            ClearFailure::NotAllowed => DemError::ClearFailed,
            ClearFailure::Memory(reason) => DemError::ClearMemoryError(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClearJobState {
    /// Accepted, runs in the next main function
    Requested,
    /// RAM cleared, waiting for these blocks to reach NV
    Writing {
        blocks: BTreeSet<NvBlockId>,
        failed: Option<String>,
    },
    Done(Result<(), ClearFailure>),
}

#[derive(Debug, Clone)]
pub(crate) struct ClearJob {
    pub client: ClientId,
    pub selector: DtcSelector,
    pub origin: DtcOrigin,
    pub state: ClearJobState,
}

const GROUP_ADDRESSES: [u32; 4] = [
    dtc_group::POWERTRAIN,
    dtc_group::CHASSIS,
    dtc_group::BODY,
    dtc_group::NETWORK,
];

impl DemState {
    /// Request or poll a clear
    pub(crate) fn clear_dtc(&mut self, client: ClientId, number: u32, origin: DtcOrigin) -> DemResult<ClearProgress> {
        if let Some(job) = &self.clear_job {
            if job.client != client {
                return Err(DemError::ClearBusy);
            }
            if let ClearJobState::Done(result) = &job.state {
                let result = result.clone();
                self.clear_job = None;
                return result.map(|_| ClearProgress::Completed).map_err(DemError::from);
            }
            return Ok(ClearProgress::Pending);
        }

        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let memory = self.origin_memory(origin)?;
        let selector = if number == dtc_group::ALL {
            DtcSelector::All
        } else if let Some(dtc) = self.tables.dtc_index(number) {
            if self.tables.memory_of(dtc) != Some(memory) {
                return Err(DemError::WrongDtc(number));
            }
            DtcSelector::Single(dtc)
        } else if GROUP_ADDRESSES.contains(&number) {
            DtcSelector::Group(number)
        } else {
            return Err(DemError::WrongDtc(number));
        };

        let dtc = DtcNumber(number);
        info!(client = client.0, dtc = %dtc, code = %dtc.code(), %origin, "Clear requested");
        self.clear_job = Some(ClearJob {
            client,
            selector,
            origin,
            state: ClearJobState::Requested,
        });
        Ok(ClearProgress::Pending)
    }

    /// Execute a requested clear (main function, state lock held)
    pub(crate) fn process_clear_job(&mut self, monitor: &mut MonitorState) {
        let Some(job) = self.clear_job.clone() else {
            return;
        };
        if job.state != ClearJobState::Requested {
            return;
        }
        let Some(memory) = job.origin.memory() else {
            self.finish_clear(Err(ClearFailure::NotAllowed));
            return;
        };

        let cfg = Arc::clone(&self.cfg);
        let selected: Vec<DtcIndex> = self
            .tables
            .dtc_ids()
            .filter(|dtc| self.tables.memory_of(*dtc) == Some(memory))
            .filter(|dtc| cfg.dtc(*dtc).map_or(false, |d| job.selector.matches(*dtc, d.number)))
            .collect();
        let allowed: Vec<DtcIndex> = selected
            .iter()
            .copied()
            .filter(|dtc| cfg.dtc(*dtc).map_or(false, |d| d.clear_allowed))
            .collect();
        if !selected.is_empty() && allowed.is_empty() {
            warn!(client = job.client.0, "Clear not allowed for any selected DTC");
            self.finish_clear(Err(ClearFailure::NotAllowed));
            return;
        }

        let mut blocks = BTreeSet::new();
        self.silent = true;
        for dtc in allowed {
            self.clear_single_dtc(monitor, dtc, memory, &mut blocks);
        }
        self.silent = false;

        if job.selector == DtcSelector::All {
            if let Some(mem) = self.memory_mut(memory) {
                mem.overflow = false;
            }
            blocks.insert(NvBlockId::Admin);
        }
        if memory != memory::MIRROR {
            blocks.insert(NvBlockId::Status);
        }
        for block in &blocks {
            self.dirty.mark_immediate(*block);
        }
        info!(client = job.client.0, blocks = blocks.len(), "DTCs cleared in RAM");
        if let Some(job) = self.clear_job.as_mut() {
            job.state = ClearJobState::Writing { blocks, failed: None };
        }
    }

    fn clear_single_dtc(
        &mut self,
        monitor: &mut MonitorState,
        dtc: DtcIndex,
        memory: MemoryId,
        blocks: &mut BTreeSet<NvBlockId>,
    ) {
        let events = self.tables.events_of(dtc).to_vec();
        let permanent_before = self.permanent.len();
        if memory != memory::MIRROR {
            for event in &events {
                self.cleared(monitor, *event);
            }
        }
        if self.permanent.len() != permanent_before {
            blocks.insert(NvBlockId::Permanent);
        }

        if let Some(rep) = self.dtc_representative(dtc) {
            let index = self.memories.get(memory.index()).and_then(|m| m.find(rep));
            if let Some(index) = index {
                self.release_entry(rep, memory, index);
                blocks.insert(NvBlockId::Entry { memory, index });
            }
        }
        self.time_series.release(dtc);
    }

    /// A block write finished; advance the clear job waiting for it
    pub(crate) fn on_clear_block_written(&mut self, outcome: &WriteOutcome) {
        let done = match self.clear_job.as_mut().map(|j| &mut j.state) {
            Some(ClearJobState::Writing { blocks, failed }) => {
                if !blocks.remove(&outcome.block) {
                    return;
                }
                if let Err(e) = &outcome.result {
                    failed.get_or_insert_with(|| format!("{}: {}", outcome.block, e));
                }
                if !blocks.is_empty() {
                    return;
                }
                match failed.take() {
                    Some(reason) => Err(ClearFailure::Memory(reason)),
                    None => Ok(()),
                }
            }
            _ => return,
        };
        self.finish_clear(done);
    }

    fn finish_clear(&mut self, result: Result<(), ClearFailure>) {
        let Some(job) = self.clear_job.as_mut() else {
            return;
        };
        let success = result.is_ok();
        job.state = ClearJobState::Done(result);
        let client = job.client;
        info!(client = client.0, success, "Clear completed");
        self.notify(Notification::ClearDtcCompleted { client, success });
    }

    /// Writing blocks still outstanding, if the job waits for NV
    pub(crate) fn clear_pending_blocks(&self) -> usize {
        match self.clear_job.as_ref().map(|j| &j.state) {
            Some(ClearJobState::Writing { blocks, .. }) => blocks.len(),
            _ => 0,
        }
    }
}
