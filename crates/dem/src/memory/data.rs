//! Snapshot and extended data elements
//!
//! Each DTC owns a [`RecordLayout`] mapping its snapshot and extended
//! records to byte ranges of the fault memory entry's data buffer.
//! Snapshot records freeze every element at capture time. Extended
//! records freeze external, constant and current-FDC elements; internal
//! counters are rendered from the entry at readout time.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DidConfig, DtcConfig, ExtendedRecordConfig, SnapshotRecordConfig};
use crate::ids::EventId;

/// One element of a data record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataElement {
    OccurrenceCounter,
    /// Remaining aging cycles
    AgingCounter,
    /// Elapsed aging cycles
    AgingCounterUpcounting,
    MaxFdcSinceLastClear,
    CurrentFdc,
    CyclesSinceFirstFailed,
    CyclesSinceLastFailed,
    FailedCycles,
    OverflowIndication,
    Priority,
    PreConfirmedStatus,
    Constant {
        #[serde(deserialize_with = "crate::config::deserialize_hex_bytes_vec")]
        value: Vec<u8>,
    },
    /// Application data read through the [`DataProvider`]
    External {
        #[serde(deserialize_with = "crate::config::deserialize_hex_u16")]
        did: u16,
        size: u8,
    },
}

impl DataElement {
    pub fn size(&self) -> usize {
        match self {
            DataElement::Constant { value } => value.len(),
            DataElement::External { size, .. } => *size as usize,
            _ => 1,
        }
    }

    /// Whether the element reflects a live entry counter
    pub fn is_internal_counter(&self) -> bool {
        !matches!(
            self,
            DataElement::Constant { .. } | DataElement::External { .. } | DataElement::CurrentFdc
        )
    }
}

/// Source of application data for external elements
pub trait DataProvider: Send + Sync {
    /// Fill `buf` with the current value of `did` for `event`
    ///
    /// Returns `false` when the value is unavailable; the element is then
    /// recorded as zeros.
    fn read_data(&self, event: EventId, did: u16, buf: &mut [u8]) -> bool;
}

/// Provider without application data
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDataProvider;

impl DataProvider for NoDataProvider {
    fn read_data(&self, _event: EventId, _did: u16, _buf: &mut [u8]) -> bool {
        false
    }
}

/// Provider backed by a table of DID values
#[derive(Debug, Default)]
pub struct StaticDataProvider {
    values: RwLock<HashMap<u16, Vec<u8>>>,
}

impl StaticDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&self, did: u16, value: impl Into<Vec<u8>>) {
        self.values.write().insert(did, value.into());
    }

    pub fn value(&self, did: u16) -> Option<Vec<u8>> {
        self.values.read().get(&did).cloned()
    }
}

impl DataProvider for StaticDataProvider {
    fn read_data(&self, _event: EventId, did: u16, buf: &mut [u8]) -> bool {
        let values = self.values.read();
        match values.get(&did) {
            Some(value) => {
                let n = value.len().min(buf.len());
                buf[..n].copy_from_slice(&value[..n]);
                buf[n..].fill(0);
                true
            }
            None => false,
        }
    }
}

/// Values of the internal data elements of one entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementContext {
    pub occurrence_counter: u8,
    pub aging_counter: u8,
    pub aging_target: u8,
    pub max_fdc: i8,
    pub current_fdc: i8,
    pub cycles_since_first_failed: u8,
    pub cycles_since_last_failed: u8,
    pub failed_cycles: u8,
    pub overflow: bool,
    pub priority: u8,
    pub pre_confirmed_status: u8,
}

/// Render one element into `out` (exactly `element.size()` bytes)
pub fn render_element(
    element: &DataElement,
    ctx: &ElementContext,
    provider: &dyn DataProvider,
    event: EventId,
    out: &mut [u8],
) {
    match element {
        DataElement::OccurrenceCounter => out[0] = ctx.occurrence_counter,
        DataElement::AgingCounter => out[0] = ctx.aging_target.saturating_sub(ctx.aging_counter),
        DataElement::AgingCounterUpcounting => out[0] = ctx.aging_counter,
        DataElement::MaxFdcSinceLastClear => out[0] = ctx.max_fdc as u8,
        DataElement::CurrentFdc => out[0] = ctx.current_fdc as u8,
        DataElement::CyclesSinceFirstFailed => out[0] = ctx.cycles_since_first_failed,
        DataElement::CyclesSinceLastFailed => out[0] = ctx.cycles_since_last_failed,
        DataElement::FailedCycles => out[0] = ctx.failed_cycles,
        DataElement::OverflowIndication => out[0] = ctx.overflow as u8,
        DataElement::Priority => out[0] = ctx.priority,
        DataElement::PreConfirmedStatus => out[0] = ctx.pre_confirmed_status,
        DataElement::Constant { value } => out.copy_from_slice(value),
        DataElement::External { did, .. } => {
            if !provider.read_data(event, *did, out) {
                debug!(event = %event, did = format!("0x{:04X}", did), "Data element unavailable");
                out.fill(0);
            }
        }
    }
}

/// Render a list of elements back to back
pub fn render_elements(
    elements: &[DataElement],
    ctx: &ElementContext,
    provider: &dyn DataProvider,
    event: EventId,
    out: &mut [u8],
) {
    let mut offset = 0;
    for element in elements {
        let size = element.size();
        render_element(element, ctx, provider, event, &mut out[offset..offset + size]);
        offset += size;
    }
}

/// Capture a snapshot record (all DIDs, back to back)
pub fn capture_snapshot(
    record: &SnapshotRecordConfig,
    ctx: &ElementContext,
    provider: &dyn DataProvider,
    event: EventId,
    out: &mut [u8],
) {
    capture_dids(&record.dids, ctx, provider, event, out);
}

/// Capture a list of DIDs back to back
pub fn capture_dids(
    dids: &[DidConfig],
    ctx: &ElementContext,
    provider: &dyn DataProvider,
    event: EventId,
    out: &mut [u8],
) {
    let mut offset = 0;
    for did in dids {
        let size = did.size();
        render_elements(&did.elements, ctx, provider, event, &mut out[offset..offset + size]);
        offset += size;
    }
}

/// Refresh the live internal counters of a stored extended record
pub fn refresh_extended(record: &ExtendedRecordConfig, ctx: &ElementContext, out: &mut [u8]) {
    let mut offset = 0;
    for element in &record.elements {
        let size = element.size();
        if element.is_internal_counter() {
            render_element(element, ctx, &NoDataProvider, EventId::INVALID, &mut out[offset..offset + size]);
        }
        offset += size;
    }
}

/// Position of one record inside the entry data buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    pub number: u8,
    pub offset: usize,
    pub size: usize,
}

impl RecordSlot {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Byte layout of the data records of one DTC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordLayout {
    pub snapshots: Vec<RecordSlot>,
    pub extended: Vec<RecordSlot>,
    pub total: usize,
}

impl RecordLayout {
    pub fn for_dtc(dtc: &DtcConfig) -> Self {
        let mut offset = 0;
        let snapshots = dtc
            .snapshot_records
            .iter()
            .map(|r| {
                let slot = RecordSlot {
                    number: r.number,
                    offset,
                    size: r.size(),
                };
                offset += slot.size;
                slot
            })
            .collect();
        let extended = dtc
            .extended_records
            .iter()
            .map(|r| {
                let slot = RecordSlot {
                    number: r.number,
                    offset,
                    size: r.size(),
                };
                offset += slot.size;
                slot
            })
            .collect();
        Self {
            snapshots,
            extended,
            total: offset,
        }
    }

    pub fn snapshot_index(&self, number: u8) -> Option<usize> {
        self.snapshots.iter().position(|s| s.number == number)
    }

    pub fn extended_index(&self, number: u8) -> Option<usize> {
        self.extended.iter().position(|s| s.number == number)
    }
}
