//! Integration tests for the Dem/LdCom/SomeIpTp stack
//!
//! Shared fixtures live here; the tests themselves are under `tests/`:
//!
//! - `status_scenarios.rs` - event status transitions through the public `Dem` API
//! - `fault_memory.rs` - displacement, clear, filters and NV persistence
//! - `notifications.rs` - broadcast and listener delivery
//! - `ldcom_someiptp.rs` - LdCom handle checks and SomeIpTp loopback transfers
//!
//! ```bash
//! cargo test -p dem-tests
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bsw_core::{BufReqReturn, NotOk, PduId, PduInfo, PduLength, RetryInfo, StdResult};
use dem::config::{DtcConfig, EventConfig, ExtendedRecordConfig, RecordTrigger};
use dem::memory::DataElement;
use dem::{CycleId, Dem, DemConfig, EventId, MemoryNvStorage, MonitorStatus, NoDataProvider, NvStorage};
use ldcom::{LdCom, PduRouter};

/// Extended record holding the occurrence counter, configured on every test DTC
pub const OCCURRENCE_RECORD: u8 = 0x01;

/// DTC number of the N-th test event (1-based)
pub fn dtc_of(event: u16) -> u32 {
    0x010000 + u32::from(event) * 0x100
}

/// One DTC per event, each with an occurrence counter record
pub fn config_with_events(count: u16) -> DemConfig {
    let mut config = DemConfig::default();
    for event in 1..=count {
        let mut dtc = DtcConfig::new(dtc_of(event));
        dtc.extended_records.push(ExtendedRecordConfig {
            number: OCCURRENCE_RECORD,
            trigger: RecordTrigger::TestFailed,
            update: true,
            elements: vec![DataElement::OccurrenceCounter],
        });
        config.dtcs.push(dtc);
        config
            .events
            .push(EventConfig::new(format!("event_{}", event), Some(dtc_of(event))));
    }
    config
}

/// A Dem over in-memory NV, initialized
pub fn started(config: DemConfig) -> (Dem, Arc<MemoryNvStorage>) {
    let nv = Arc::new(MemoryNvStorage::new());
    let dem = start_with(config, nv.clone());
    (dem, nv)
}

pub fn start_with(config: DemConfig, nv: Arc<dyn NvStorage>) -> Dem {
    let dem = Dem::new(config, nv, Arc::new(NoDataProvider)).expect("valid configuration");
    dem.init().expect("init");
    dem
}

/// Report and process one monitor result
pub fn report(dem: &Dem, event: u16, status: MonitorStatus) {
    dem.set_event_status(EventId(event), status).expect("report accepted");
    dem.main_function();
}

/// End and restart operation cycle 0
pub fn next_cycle(dem: &Dem) {
    dem.set_operation_cycle_state(CycleId(0), false).expect("cycle end");
    dem.set_operation_cycle_state(CycleId(0), true).expect("cycle start");
}

/// Run the main function until no NV write is pending
pub fn settle(dem: &Dem) {
    for _ in 0..32 {
        dem.main_function();
    }
}

/// Occurrence counter of a stored DTC, `None` without entry
pub fn occurrences(dem: &Dem, event: u16) -> Option<u8> {
    let mut buf = [0u8; 8];
    let len = dem
        .get_extended_data_record_by_dtc(dtc_of(event), dem::DtcOrigin::Primary, OCCURRENCE_RECORD, &mut buf)
        .expect("readout");
    (len == 2).then_some(buf[1])
}

/// Route of the loopback PDU router
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub pdur_id: PduId,
    /// LdCom handle the data is pulled from
    pub tx: PduId,
    /// LdCom handle the data is delivered to
    pub rx: PduId,
}

/// PDU router looping TP transmissions back into LdCom receptions
///
/// Each transmit request is served synchronously: the frame is pulled with
/// `copy_tx_data` in `segment` sized pieces and pushed into the Rx handle.
pub struct LoopbackRouter {
    ldcom: OnceLock<Weak<LdCom>>,
    routes: Vec<Route>,
    segment: usize,
    transmits: AtomicUsize,
}

impl LoopbackRouter {
    pub fn new(routes: Vec<Route>, segment: usize) -> Arc<Self> {
        Arc::new(Self {
            ldcom: OnceLock::new(),
            routes,
            segment: segment.max(1),
            transmits: AtomicUsize::new(0),
        })
    }

    pub fn attach(&self, ldcom: &Arc<LdCom>) {
        let _ = self.ldcom.set(Arc::downgrade(ldcom));
    }

    /// Transmit requests received so far
    pub fn transmit_count(&self) -> usize {
        self.transmits.load(Ordering::SeqCst)
    }

    fn transfer(&self, ldcom: &LdCom, route: Route, total: usize) -> StdResult {
        let sor = ldcom.start_of_reception(route.rx, &PduInfo::empty(), total as PduLength);
        if sor.result != BufReqReturn::Ok {
            return Err(NotOk);
        }
        let mut segment = vec![0u8; self.segment];
        let mut sent = 0;
        while sent < total {
            let n = self.segment.min(total - sent);
            let tx = ldcom.copy_tx_data(route.tx, &mut segment[..n], Some(RetryInfo::confirmed()));
            if tx.result != BufReqReturn::Ok {
                ldcom.tp_rx_indication(route.rx, Err(NotOk));
                return Err(NotOk);
            }
            let rx = ldcom.copy_rx_data(route.rx, &PduInfo::new(&segment[..n]));
            if rx.result != BufReqReturn::Ok {
                ldcom.tp_rx_indication(route.rx, Err(NotOk));
                return Err(NotOk);
            }
            sent += n;
        }
        ldcom.tp_rx_indication(route.rx, Ok(()));
        Ok(())
    }
}

impl PduRouter for LoopbackRouter {
    fn ldcom_transmit(&self, pdur_id: PduId, info: &PduInfo<'_>) -> StdResult {
        self.transmits.fetch_add(1, Ordering::SeqCst);
        let route = self.routes.iter().find(|r| r.pdur_id == pdur_id).copied().ok_or(NotOk)?;
        let ldcom = self.ldcom.get().and_then(Weak::upgrade).ok_or(NotOk)?;
        let result = self.transfer(&ldcom, route, info.len());
        ldcom.tp_tx_confirmation(route.tx, result);
        Ok(())
    }
}
