//! Time-series snapshot memory
//!
//! DTCs with time-series DIDs are sampled every main function into a
//! ring of `past_samples`. A failure allocates an entry that copies the
//! ring and keeps recording until `future_samples` were taken.

use std::collections::VecDeque;

use crate::ids::DtcIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesEntry {
    pub dtc: DtcIndex,
    pub past: Vec<Vec<u8>>,
    pub future: Vec<Vec<u8>>,
}

/// Samples recorded around a failure
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeSeriesSamples {
    /// Oldest first, the last element is the newest sample before the failure
    pub past: Vec<Vec<u8>>,
    pub future: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesMemory {
    past_samples: usize,
    future_samples: usize,
    /// Rolling pre-failure samples per DTC
    rings: Vec<VecDeque<Vec<u8>>>,
    slots: Vec<Option<TimeSeriesEntry>>,
}

impl TimeSeriesMemory {
    pub fn new(capacity: usize, dtc_count: usize, past_samples: usize, future_samples: usize) -> Self {
        Self {
            past_samples,
            future_samples,
            rings: vec![VecDeque::with_capacity(past_samples); dtc_count],
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record one sample of `dtc`
    pub fn sample(&mut self, dtc: DtcIndex, sample: Vec<u8>) {
        for entry in self.slots.iter_mut().flatten() {
            if entry.dtc == dtc && entry.future.len() < self.future_samples {
                entry.future.push(sample.clone());
            }
        }
        if self.past_samples == 0 {
            return;
        }
        if let Some(ring) = self.rings.get_mut(dtc.index()) {
            if ring.len() >= self.past_samples {
                ring.pop_front();
            }
            ring.push_back(sample);
        }
    }

    /// Start recording for `dtc`; `false` if no slot is free
    pub fn allocate(&mut self, dtc: DtcIndex) -> bool {
        if self.find(dtc).is_some() {
            return true;
        }
        let past = self
            .rings
            .get(dtc.index())
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default();
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some(TimeSeriesEntry {
                    dtc,
                    past,
                    future: Vec::new(),
                });
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, dtc: DtcIndex) -> bool {
        let mut released = false;
        for slot in &mut self.slots {
            if slot.as_ref().map(|e| e.dtc) == Some(dtc) {
                *slot = None;
                released = true;
            }
        }
        released
    }

    pub fn find(&self, dtc: DtcIndex) -> Option<&TimeSeriesEntry> {
        self.slots.iter().flatten().find(|e| e.dtc == dtc)
    }

    pub fn samples(&self, dtc: DtcIndex) -> Option<TimeSeriesSamples> {
        self.find(dtc).map(|e| TimeSeriesSamples {
            past: e.past.clone(),
            future: e.future.clone(),
        })
    }
}
