//! DTC filter and iteration (UDS 0x19 01/02/0A)

use tracing::debug;

use super::DtcOrigin;
use crate::error::{DemError, DemResult};
use crate::ids::{ClientId, DtcIndex, EventId};
use crate::state::DemState;
use crate::status::UdsStatus;
use crate::tables::ConfigLookup;

/// Filter criteria set by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtcFilter {
    /// 0x00 matches every DTC
    pub status_mask: u8,
    pub origin: DtcOrigin,
    /// Match DTCs sharing at least one severity bit
    pub severity: Option<u8>,
    /// Report the fault detection counter with each DTC
    pub with_fdc: bool,
}

impl DtcFilter {
    pub fn status(status_mask: u8, origin: DtcOrigin) -> Self {
        Self {
            status_mask,
            origin,
            severity: None,
            with_fdc: false,
        }
    }
}

/// Filter plus resumable cursor over the DTC table
#[derive(Debug, Clone)]
pub(crate) struct FilterState {
    pub filter: DtcFilter,
    /// Next DTC index to examine
    pub cursor: usize,
}

impl DemState {
    pub(crate) fn set_dtc_filter(&mut self, client: ClientId, filter: DtcFilter) -> DemResult<()> {
        if filter.origin != DtcOrigin::Permanent {
            self.origin_memory(filter.origin)?;
        }
        debug!(client = client.0, ?filter, "DTC filter set");
        self.client_mut(client).filter = Some(FilterState { filter, cursor: 0 });
        Ok(())
    }

    fn filter_of(&self, client: ClientId) -> DemResult<&FilterState> {
        self.clients
            .get(&client)
            .and_then(|c| c.filter.as_ref())
            .ok_or_else(|| DemError::Rejected("no DTC filter set".into()))
    }

    /// Status reported to clients: masked by the availability mask
    pub(crate) fn reported_dtc_status(&self, dtc: DtcIndex) -> UdsStatus {
        UdsStatus::from_bits(self.dtc_external_status(dtc).bits() & self.cfg.features.status_availability_mask)
    }

    fn dtc_matches(&self, dtc: DtcIndex, filter: &DtcFilter) -> bool {
        let Some(dtc_cfg) = self.cfg.dtc(dtc) else {
            return false;
        };
        if !self.dtc_available(dtc) {
            return false;
        }
        let in_origin = match filter.origin {
            DtcOrigin::Permanent => self.permanent.contains(dtc),
            origin => origin.memory().is_some() && self.tables.memory_of(dtc) == origin.memory(),
        };
        if !in_origin {
            return false;
        }
        if let Some(severity) = filter.severity {
            if dtc_cfg.severity & severity == 0 {
                return false;
            }
        }
        filter.origin == DtcOrigin::Permanent
            || filter.status_mask == 0
            || self.reported_dtc_status(dtc).any(filter.status_mask)
    }

    pub(crate) fn number_of_filtered_dtc(&self, client: ClientId) -> DemResult<usize> {
        let state = self.filter_of(client)?;
        Ok(self
            .tables
            .dtc_ids()
            .filter(|dtc| self.dtc_matches(*dtc, &state.filter))
            .count())
    }

    /// Advance the cursor of `client` to the next matching DTC
    fn next_filtered(&mut self, client: ClientId) -> DemResult<DtcIndex> {
        let state = self.filter_of(client)?.clone();
        let found = (state.cursor..self.tables.dtc_count())
            .map(|i| DtcIndex(i as u16))
            .find(|dtc| self.dtc_matches(*dtc, &state.filter));
        let cursor = found.map_or(self.tables.dtc_count(), |d| d.index() + 1);
        if let Some(filter) = self.client_mut(client).filter.as_mut() {
            filter.cursor = cursor;
        }
        found.ok_or(DemError::NoSuchElement)
    }

    /// Next DTC number and its reported status
    pub(crate) fn next_filtered_dtc(&mut self, client: ClientId) -> DemResult<(u32, UdsStatus)> {
        let dtc = self.next_filtered(client)?;
        let number = self.cfg.dtc(dtc).map(|d| d.number).ok_or(DemError::NoSuchElement)?;
        Ok((number, self.reported_dtc_status(dtc)))
    }

    /// Next DTC number and the largest FDC of its events
    pub(crate) fn next_filtered_dtc_and_fdc<F>(&mut self, client: ClientId, fdc_of: F) -> DemResult<(u32, i8)>
    where
        F: Fn(EventId) -> i8,
    {
        let dtc = self.next_filtered(client)?;
        let number = self.cfg.dtc(dtc).map(|d| d.number).ok_or(DemError::NoSuchElement)?;
        let fdc = self
            .tables
            .events_of(dtc)
            .iter()
            .map(|e| fdc_of(*e))
            .max()
            .unwrap_or(0);
        Ok((number, fdc))
    }

    /// Reported status of one DTC
    pub(crate) fn status_of_dtc(&self, number: u32, origin: DtcOrigin) -> DemResult<UdsStatus> {
        if origin == DtcOrigin::Permanent {
            return Err(DemError::WrongDtcOrigin(origin.to_string()));
        }
        let (dtc, _) = self.resolve_dtc(number, origin)?;
        if !self.dtc_available(dtc) {
            return Err(DemError::WrongDtc(number));
        }
        Ok(self.reported_dtc_status(dtc))
    }
}
