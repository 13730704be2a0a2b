//! Snapshot and extended data readout (UDS 0x19 04/06)
//!
//! Freeze frames are returned as `[record][#DIDs][DID hi][DID lo][data]..`
//! per record, extended records as `[record][data]`. Record 0xFF selects
//! every record holding data. A configured record without data yields no
//! bytes; an unconfigured record number is `NoSuchElement`.

use super::DtcOrigin;
use crate::error::{DemError, DemResult};
use crate::memory::data::{refresh_extended, ElementContext};
use crate::memory::TimeSeriesSamples;
use crate::state::DemState;
use crate::tables::ConfigLookup;

/// Record number selecting all records
pub const ALL_RECORDS: u8 = 0xFF;

fn copy_out(data: &[u8], buf: &mut [u8]) -> DemResult<usize> {
    let Some(out) = buf.get_mut(..data.len()) else {
        return Err(DemError::BufferTooSmall {
            need: data.len(),
            have: buf.len(),
        });
    };
    out.copy_from_slice(data);
    Ok(data.len())
}

impl DemState {
    /// Rendered freeze frame records of a DTC
    pub(crate) fn render_freeze_frames(&self, number: u32, origin: DtcOrigin, record: u8) -> DemResult<Vec<u8>> {
        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let (dtc, memory) = self.resolve_dtc(number, origin)?;
        let dtc_cfg = self.cfg.dtc(dtc).ok_or(DemError::WrongDtc(number))?;
        let layout = self.tables.layout(dtc).ok_or(DemError::WrongDtc(number))?;
        if record != ALL_RECORDS && layout.snapshot_index(record).is_none() {
            return Err(DemError::NoSuchElement);
        }
        let Some(entry) = self.dtc_entry(dtc, memory) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for (i, (config, slot)) in dtc_cfg.snapshot_records.iter().zip(&layout.snapshots).enumerate() {
            if (record != ALL_RECORDS && config.number != record) || !entry.snapshot_is_valid(i) {
                continue;
            }
            let Some(data) = entry.data.get(slot.range()) else {
                continue;
            };
            out.push(config.number);
            out.push(config.dids.len() as u8);
            let mut offset = 0;
            for did in &config.dids {
                let size = did.size();
                out.extend_from_slice(&did.did.to_be_bytes());
                out.extend_from_slice(&data[offset..offset + size]);
                offset += size;
            }
        }
        Ok(out)
    }

    /// Rendered extended data records of a DTC
    ///
    /// Internal counters are refreshed to their current values. Records
    /// made only of internal counters are readable as soon as the entry
    /// exists, even before their trigger fired.
    pub(crate) fn render_extended(&self, number: u32, origin: DtcOrigin, record: u8) -> DemResult<Vec<u8>> {
        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let (dtc, memory) = self.resolve_dtc(number, origin)?;
        let dtc_cfg = self.cfg.dtc(dtc).ok_or(DemError::WrongDtc(number))?;
        let layout = self.tables.layout(dtc).ok_or(DemError::WrongDtc(number))?;
        if record != ALL_RECORDS && layout.extended_index(record).is_none() {
            return Err(DemError::NoSuchElement);
        }
        let Some(entry) = self.dtc_entry(dtc, memory) else {
            return Ok(Vec::new());
        };
        let ctx = match self.dtc_representative(dtc) {
            Some(rep) => self.element_context(rep, 0),
            None => ElementContext::default(),
        };

        let mut out = Vec::new();
        for (i, (config, slot)) in dtc_cfg.extended_records.iter().zip(&layout.extended).enumerate() {
            if record != ALL_RECORDS && config.number != record {
                continue;
            }
            let counters_only = config.elements.iter().all(|e| e.is_internal_counter());
            if !entry.extended_is_valid(i) && !counters_only {
                continue;
            }
            let Some(data) = entry.data.get(slot.range()) else {
                continue;
            };
            let mut data = data.to_vec();
            refresh_extended(config, &ctx, &mut data);
            out.push(config.number);
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    pub(crate) fn freeze_frame_data(
        &self,
        number: u32,
        origin: DtcOrigin,
        record: u8,
        buf: &mut [u8],
    ) -> DemResult<usize> {
        copy_out(&self.render_freeze_frames(number, origin, record)?, buf)
    }

    pub(crate) fn extended_data(
        &self,
        number: u32,
        origin: DtcOrigin,
        record: u8,
        buf: &mut [u8],
    ) -> DemResult<usize> {
        copy_out(&self.render_extended(number, origin, record)?, buf)
    }

    /// Samples recorded around the failure of a DTC
    pub(crate) fn time_series_samples(&self, number: u32, origin: DtcOrigin) -> DemResult<TimeSeriesSamples> {
        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let (dtc, _) = self.resolve_dtc(number, origin)?;
        self.time_series.samples(dtc).ok_or(DemError::NoSuchElement)
    }
}
