//! The LdCom router

use std::sync::{Arc, Weak};

use bsw_core::{DetError, DetReporter, ModuleId, PduId, PduInfo, PduLength, RetryInfo, StdResult};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{ApiType, Direction, LdComConfig, LdComPduConfig};
use crate::error::{LdComError, LdComResult};
use crate::upper::{LdComUpper, PduRouter, TpBuffer};

/// Service ids reported with DET errors
pub mod service {
    pub const INIT: u8 = 0x01;
    pub const DEINIT: u8 = 0x02;
    pub const TRANSMIT: u8 = 0x05;
    pub const TX_CONFIRMATION: u8 = 0x40;
    pub const TRIGGER_TRANSMIT: u8 = 0x41;
    pub const RX_INDICATION: u8 = 0x42;
    pub const COPY_TX_DATA: u8 = 0x43;
    pub const COPY_RX_DATA: u8 = 0x44;
    pub const TP_RX_INDICATION: u8 = 0x45;
    pub const START_OF_RECEPTION: u8 = 0x46;
    pub const TP_TX_CONFIRMATION: u8 = 0x48;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    Init,
}

/// Which side handed us the handle
#[derive(Debug, Clone, Copy)]
enum Caller {
    Upper,
    Lower,
}

pub struct LdCom {
    config: LdComConfig,
    router: Arc<dyn PduRouter>,
    det: Arc<dyn DetReporter>,
    uppers: RwLock<Vec<Option<Weak<dyn LdComUpper>>>>,
    state: RwLock<State>,
}

impl std::fmt::Debug for LdCom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdCom")
            .field("pdus", &self.config.pdus.len())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl LdCom {
    pub fn new(config: LdComConfig, router: Arc<dyn PduRouter>, det: Arc<dyn DetReporter>) -> Self {
        let uppers = vec![None; config.pdus.len()];
        Self {
            config,
            router,
            det,
            uppers: RwLock::new(uppers),
            state: RwLock::new(State::Uninit),
        }
    }

    pub fn config(&self) -> &LdComConfig {
        &self.config
    }

    /// Bind the consumer of PDU `id`
    ///
    /// LdCom keeps a weak reference so the consumer may own the `LdCom`.
    pub fn bind(&self, id: PduId, upper: &Arc<dyn LdComUpper>) -> LdComResult<()> {
        let mut uppers = self.uppers.write();
        let slot = uppers
            .get_mut(usize::from(id))
            .ok_or(LdComError::InvalidPduId(id))?;
        *slot = Some(Arc::downgrade(upper));
        debug!(pdu = id, "Upper layer bound");
        Ok(())
    }

    pub fn init(&self) {
        *self.state.write() = State::Init;
        info!(pdus = self.config.pdus.len(), "LdCom initialized");
    }

    pub fn deinit(&self) {
        let mut state = self.state.write();
        if *state == State::Uninit {
            self.report(service::DEINIT, &LdComError::Uninit);
            return;
        }
        *state = State::Uninit;
        info!("LdCom deinitialized");
    }

    pub fn is_initialized(&self) -> bool {
        *self.state.read() == State::Init
    }

    fn report(&self, api: u8, err: &LdComError) {
        if let Some(code) = err.det_code() {
            self.det.report_error(DetError {
                module: ModuleId::LDCOM,
                instance: 0,
                api,
                error: code,
            });
        }
    }

    /// Validate a call, reporting DET on failure
    fn check(
        &self,
        api: u8,
        id: PduId,
        direction: Direction,
        kind: Option<ApiType>,
        caller: Caller,
    ) -> LdComResult<&LdComPduConfig> {
        let result = if !self.is_initialized() {
            Err(LdComError::Uninit)
        } else {
            self.config
                .pdu(id)
                .filter(|pdu| pdu.direction == direction && kind.map_or(true, |k| pdu.api == k))
                .ok_or(match caller {
                    Caller::Upper => LdComError::InvalidSignalId(id),
                    Caller::Lower => LdComError::InvalidPduId(id),
                })
        };
        if let Err(err) = &result {
            self.report(api, err);
        }
        result
    }

    fn upper(&self, id: PduId) -> Option<Arc<dyn LdComUpper>> {
        let upper = self
            .uppers
            .read()
            .get(usize::from(id))
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade);
        if upper.is_none() {
            warn!(pdu = id, "No upper layer bound");
        }
        upper
    }

    /// Request transmission of signal `id`
    pub fn transmit(&self, id: PduId, info: &PduInfo<'_>) -> LdComResult<()> {
        let pdu = self.check(service::TRANSMIT, id, Direction::Tx, None, Caller::Upper)?;
        if pdu.api == ApiType::If && info.sdu.is_none() {
            let err = LdComError::ParamPointer;
            self.report(service::TRANSMIT, &err);
            return Err(err);
        }
        debug!(pdu = id, len = info.len(), "Transmit");
        self.router.ldcom_transmit(pdu.pdur_id, info).map_err(|_| {
            warn!(pdu = id, pdur = pdu.pdur_id, "Transmit rejected by PDU router");
            LdComError::Rejected(id)
        })
    }

    pub fn rx_indication(&self, id: PduId, info: &PduInfo<'_>) {
        if self
            .check(service::RX_INDICATION, id, Direction::Rx, Some(ApiType::If), Caller::Lower)
            .is_err()
        {
            return;
        }
        if info.sdu.is_none() {
            self.report(service::RX_INDICATION, &LdComError::ParamPointer);
            return;
        }
        if let Some(upper) = self.upper(id) {
            upper.rx_indication(id, info);
        }
    }

    pub fn tx_confirmation(&self, id: PduId, result: StdResult) {
        if self
            .check(service::TX_CONFIRMATION, id, Direction::Tx, Some(ApiType::If), Caller::Lower)
            .is_err()
        {
            return;
        }
        if let Some(upper) = self.upper(id) {
            upper.tx_confirmation(id, result);
        }
    }

    /// Fetch the content of PDU `id` into `buf`, returning the copied length
    pub fn trigger_transmit(&self, id: PduId, buf: &mut [u8]) -> LdComResult<usize> {
        self.check(service::TRIGGER_TRANSMIT, id, Direction::Tx, Some(ApiType::If), Caller::Lower)?;
        let upper = self.upper(id).ok_or(LdComError::NoUpper(id))?;
        upper
            .trigger_transmit(id, buf)
            .map_err(|_| LdComError::TriggerTransmitFailed(id))
    }

    pub fn start_of_reception(&self, id: PduId, info: &PduInfo<'_>, tp_sdu_length: PduLength) -> TpBuffer {
        if self
            .check(service::START_OF_RECEPTION, id, Direction::Rx, Some(ApiType::Tp), Caller::Lower)
            .is_err()
        {
            return TpBuffer::not_ok();
        }
        match self.upper(id) {
            Some(upper) => upper.start_of_reception(id, info, tp_sdu_length),
            None => TpBuffer::not_ok(),
        }
    }

    pub fn copy_rx_data(&self, id: PduId, info: &PduInfo<'_>) -> TpBuffer {
        if self
            .check(service::COPY_RX_DATA, id, Direction::Rx, Some(ApiType::Tp), Caller::Lower)
            .is_err()
        {
            return TpBuffer::not_ok();
        }
        match self.upper(id) {
            Some(upper) => upper.copy_rx_data(id, info),
            None => TpBuffer::not_ok(),
        }
    }

    pub fn tp_rx_indication(&self, id: PduId, result: StdResult) {
        if self
            .check(service::TP_RX_INDICATION, id, Direction::Rx, Some(ApiType::Tp), Caller::Lower)
            .is_err()
        {
            return;
        }
        if let Some(upper) = self.upper(id) {
            upper.tp_rx_indication(id, result);
        }
    }

    pub fn copy_tx_data(&self, id: PduId, buf: &mut [u8], retry: Option<RetryInfo>) -> TpBuffer {
        if self
            .check(service::COPY_TX_DATA, id, Direction::Tx, Some(ApiType::Tp), Caller::Lower)
            .is_err()
        {
            return TpBuffer::not_ok();
        }
        match self.upper(id) {
            Some(upper) => upper.copy_tx_data(id, buf, retry),
            None => TpBuffer::not_ok(),
        }
    }

    pub fn tp_tx_confirmation(&self, id: PduId, result: StdResult) {
        if self
            .check(service::TP_TX_CONFIRMATION, id, Direction::Tx, Some(ApiType::Tp), Caller::Lower)
            .is_err()
        {
            return;
        }
        if let Some(upper) = self.upper(id) {
            upper.tp_tx_confirmation(id, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::det_code;
    use bsw_core::{BufReqReturn, DetRecorder, NotOk};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const IF_TX: PduId = 0;
    const IF_RX: PduId = 1;
    const TP_TX: PduId = 2;
    const TP_RX: PduId = 3;

    #[derive(Default)]
    struct Router {
        sent: Mutex<Vec<(PduId, Vec<u8>)>>,
        refuse: Mutex<bool>,
    }

    impl PduRouter for Router {
        fn ldcom_transmit(&self, pdur_id: PduId, info: &PduInfo<'_>) -> StdResult {
            if *self.refuse.lock() {
                return Err(NotOk);
            }
            self.sent.lock().push((pdur_id, info.sdu.unwrap_or_default().to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Upper {
        calls: Mutex<Vec<String>>,
    }

    impl LdComUpper for Upper {
        fn rx_indication(&self, id: PduId, info: &PduInfo<'_>) {
            self.calls.lock().push(format!("rx {} {:?}", id, info.sdu));
        }

        fn tx_confirmation(&self, id: PduId, result: StdResult) {
            self.calls.lock().push(format!("txconf {} {}", id, result.is_ok()));
        }

        fn trigger_transmit(&self, _id: PduId, buf: &mut [u8]) -> StdResult<usize> {
            let out = buf.get_mut(..2).ok_or(NotOk)?;
            out.copy_from_slice(&[0xCA, 0xFE]);
            Ok(2)
        }

        fn start_of_reception(&self, id: PduId, _info: &PduInfo<'_>, len: PduLength) -> TpBuffer {
            self.calls.lock().push(format!("sor {} {}", id, len));
            TpBuffer::ok(len)
        }

        fn copy_tx_data(&self, id: PduId, buf: &mut [u8], _retry: Option<RetryInfo>) -> TpBuffer {
            self.calls.lock().push(format!("copytx {} {}", id, buf.len()));
            TpBuffer::ok(0)
        }
    }

    fn setup() -> (LdCom, Arc<Router>, Arc<DetRecorder>, Arc<dyn LdComUpper>, Arc<Upper>) {
        let config = LdComConfig {
            pdus: vec![
                LdComPduConfig::new("if_tx", Direction::Tx, ApiType::If, 10),
                LdComPduConfig::new("if_rx", Direction::Rx, ApiType::If, 0),
                LdComPduConfig::new("tp_tx", Direction::Tx, ApiType::Tp, 12),
                LdComPduConfig::new("tp_rx", Direction::Rx, ApiType::Tp, 0),
            ],
        };
        let router = Arc::new(Router::default());
        let det = Arc::new(DetRecorder::new());
        let ldcom = LdCom::new(config, router.clone(), det.clone());
        let upper = Arc::new(Upper::default());
        let dyn_upper: Arc<dyn LdComUpper> = upper.clone();
        for id in 0..4 {
            ldcom.bind(id, &dyn_upper).unwrap();
        }
        ldcom.init();
        (ldcom, router, det, dyn_upper, upper)
    }

    #[test]
    fn test_transmit_routes_to_pdur_handle() {
        let (ldcom, router, det, _keep, _) = setup();
        ldcom.transmit(IF_TX, &PduInfo::new(&[1, 2, 3])).unwrap();
        ldcom.transmit(TP_TX, &PduInfo::new(&[4; 40])).unwrap();

        let sent = router.sent.lock();
        assert_eq!(sent[0], (10, vec![1, 2, 3]));
        assert_eq!(sent[1].0, 12);
        assert_eq!(sent[1].1.len(), 40);
        assert!(det.errors().is_empty());
    }

    #[test]
    fn test_transmit_rejected_by_router() {
        let (ldcom, router, det, _keep, _) = setup();
        *router.refuse.lock() = true;
        assert_eq!(
            ldcom.transmit(IF_TX, &PduInfo::new(&[1])),
            Err(LdComError::Rejected(IF_TX))
        );
        // Not a development error
        assert!(det.errors().is_empty());
    }

    #[rstest]
    #[case::rx_handle(IF_RX)]
    #[case::tp_rx_handle(TP_RX)]
    #[case::out_of_range(9)]
    fn test_transmit_invalid_signal(#[case] id: PduId) {
        let (ldcom, _, det, _keep, _) = setup();
        assert_eq!(
            ldcom.transmit(id, &PduInfo::new(&[1])),
            Err(LdComError::InvalidSignalId(id))
        );
        assert!(det.contains(ModuleId::LDCOM, service::TRANSMIT, det_code::INVALID_SIGNAL_ID));
    }

    #[test]
    fn test_transmit_if_requires_buffer() {
        let (ldcom, _, det, _keep, _) = setup();
        assert_eq!(ldcom.transmit(IF_TX, &PduInfo::empty()), Err(LdComError::ParamPointer));
        assert!(det.contains(ModuleId::LDCOM, service::TRANSMIT, det_code::PARAM_POINTER));
    }

    #[test]
    fn test_calls_before_init_are_rejected() {
        let (ldcom, router, det, _keep, upper) = setup();
        ldcom.deinit();
        assert_eq!(ldcom.transmit(IF_TX, &PduInfo::new(&[1])), Err(LdComError::Uninit));
        ldcom.rx_indication(IF_RX, &PduInfo::new(&[1]));

        assert!(router.sent.lock().is_empty());
        assert!(upper.calls.lock().is_empty());
        assert!(det.contains(ModuleId::LDCOM, service::TRANSMIT, det_code::UNINIT));
        assert!(det.contains(ModuleId::LDCOM, service::RX_INDICATION, det_code::UNINIT));

        ldcom.deinit();
        assert!(det.contains(ModuleId::LDCOM, service::DEINIT, det_code::UNINIT));
    }

    #[test]
    fn test_lower_callbacks_forwarded() {
        let (ldcom, _, det, _keep, upper) = setup();
        ldcom.rx_indication(IF_RX, &PduInfo::new(&[7]));
        ldcom.tx_confirmation(IF_TX, Ok(()));
        let sor = ldcom.start_of_reception(TP_RX, &PduInfo::empty(), 100);
        let copy = ldcom.copy_tx_data(TP_TX, &mut [0u8; 8], None);

        assert_eq!(sor, TpBuffer::ok(100));
        assert_eq!(copy.result, BufReqReturn::Ok);
        assert_eq!(
            *upper.calls.lock(),
            vec![
                "rx 1 Some([7])".to_string(),
                "txconf 0 true".to_string(),
                "sor 3 100".to_string(),
                "copytx 2 8".to_string(),
            ]
        );
        assert!(det.errors().is_empty());
    }

    #[rstest]
    #[case::if_rx_on_tx(IF_TX, service::RX_INDICATION)]
    #[case::tp_rx_on_if(IF_RX, service::START_OF_RECEPTION)]
    #[case::copy_tx_on_rx(TP_RX, service::COPY_TX_DATA)]
    fn test_wrong_direction_is_invalid_pdu(#[case] id: PduId, #[case] api: u8) {
        let (ldcom, _, det, _keep, upper) = setup();
        match api {
            service::RX_INDICATION => ldcom.rx_indication(id, &PduInfo::new(&[1])),
            service::START_OF_RECEPTION => {
                assert_eq!(ldcom.start_of_reception(id, &PduInfo::empty(), 4), TpBuffer::not_ok())
            }
            _ => assert_eq!(ldcom.copy_tx_data(id, &mut [0u8; 4], None), TpBuffer::not_ok()),
        }
        assert!(upper.calls.lock().is_empty());
        assert!(det.contains(ModuleId::LDCOM, api, det_code::INVALID_PDU_SDU_ID));
    }

    #[test]
    fn test_rx_indication_requires_buffer() {
        let (ldcom, _, det, _keep, upper) = setup();
        ldcom.rx_indication(IF_RX, &PduInfo::empty());
        assert!(upper.calls.lock().is_empty());
        assert!(det.contains(ModuleId::LDCOM, service::RX_INDICATION, det_code::PARAM_POINTER));
    }

    #[test]
    fn test_trigger_transmit() {
        let (ldcom, _, _, _keep, _) = setup();
        let mut buf = [0u8; 8];
        assert_eq!(ldcom.trigger_transmit(IF_TX, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0xCA, 0xFE]);
    }

    #[test]
    fn test_trigger_transmit_upper_failure() {
        let (ldcom, _, det, _keep, _) = setup();
        let result = ldcom.trigger_transmit(IF_TX, &mut [0u8; 1]);
        assert_eq!(result, Err(LdComError::TriggerTransmitFailed(IF_TX)));
        assert_eq!(result.unwrap_err().det_code(), None);
        assert!(det.errors().is_empty());
    }

    #[test]
    fn test_dropped_upper_refuses() {
        let (ldcom, _, _, keep, upper) = setup();
        drop(keep);
        drop(upper);
        assert_eq!(ldcom.start_of_reception(TP_RX, &PduInfo::empty(), 4), TpBuffer::not_ok());
        assert_eq!(
            ldcom.trigger_transmit(IF_TX, &mut [0u8; 4]),
            Err(LdComError::NoUpper(IF_TX))
        );
    }

    #[test]
    fn test_bind_out_of_range() {
        let (ldcom, _, _, keep, _) = setup();
        assert_eq!(ldcom.bind(4, &keep), Err(LdComError::InvalidPduId(4)));
    }
}
