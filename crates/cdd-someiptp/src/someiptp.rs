//! The SomeIpTp driver
//!
//! Tx holds one frame (header + payload) until the TP confirmation. Rx keeps
//! two frame buffers: one may be locked by a reader while the other
//! receives. The control block is always taken before a buffer lock and
//! never while a buffer lock is held.

use std::sync::Arc;

use bsw_core::{
    BufReqReturn, DetError, DetReporter, ModuleId, PduId, PduInfo, PduLength, RetryInfo, StdResult,
    TpDataState,
};
use ldcom::{LdCom, LdComResult, LdComUpper, TpBuffer};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::SomeIpTpConfig;
use crate::error::{det_code, service, RteError, RteResult};

#[derive(Debug)]
struct TxBuffer {
    data: Vec<u8>,
    len: usize,
    copied: usize,
    busy: bool,
}

#[derive(Debug)]
struct RxBuffer {
    data: Vec<u8>,
    len: usize,
    expected: usize,
}

#[derive(Debug, Default)]
struct RxControl {
    /// Buffer currently being filled
    receiving: Option<usize>,
    /// Last completely received buffer
    newest: Option<usize>,
    /// `newest` was not read yet
    fresh: bool,
    /// Buffer a reader is copying from
    locked: Option<usize>,
}

impl RxControl {
    /// Buffer for a new reception: never the locked one, preferably not
    /// the newest unread one
    fn pick_target(&self) -> Option<usize> {
        (0..2)
            .find(|&i| Some(i) != self.locked && Some(i) != self.newest)
            .or_else(|| (0..2).find(|&i| Some(i) != self.locked))
    }
}

pub struct SomeIpTp {
    config: SomeIpTpConfig,
    ldcom: Arc<LdCom>,
    det: Arc<dyn DetReporter>,
    tx: Mutex<TxBuffer>,
    rx_ctrl: Mutex<RxControl>,
    rx_buffers: [Mutex<RxBuffer>; 2],
}

impl std::fmt::Debug for SomeIpTp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SomeIpTp")
            .field("config", &self.config)
            .field("tx", &*self.tx.lock())
            .field("rx", &*self.rx_ctrl.lock())
            .finish()
    }
}

impl SomeIpTp {
    /// Create the driver and bind it to its Tx and Rx handles at `ldcom`
    pub fn new(config: SomeIpTpConfig, ldcom: Arc<LdCom>, det: Arc<dyn DetReporter>) -> LdComResult<Arc<Self>> {
        let capacity = config.frame_capacity();
        let rx_buffer = || {
            Mutex::new(RxBuffer {
                data: vec![0; capacity],
                len: 0,
                expected: 0,
            })
        };
        let tp = Arc::new(Self {
            tx: Mutex::new(TxBuffer {
                data: vec![0; capacity],
                len: 0,
                copied: 0,
                busy: false,
            }),
            rx_ctrl: Mutex::new(RxControl::default()),
            rx_buffers: [rx_buffer(), rx_buffer()],
            config,
            ldcom,
            det,
        });
        let upper: Arc<dyn LdComUpper> = tp.clone();
        tp.ldcom.bind(tp.config.tx_pdu, &upper)?;
        tp.ldcom.bind(tp.config.rx_pdu, &upper)?;
        Ok(tp)
    }

    pub fn config(&self) -> &SomeIpTpConfig {
        &self.config
    }

    /// Whether a transmission is in flight
    pub fn is_busy(&self) -> bool {
        self.tx.lock().busy
    }

    fn report(&self, api: u8, error: u8) {
        self.det.report_error(DetError {
            module: ModuleId::CDD,
            instance: 0,
            api,
            error,
        });
    }

    /// Send `payload` behind the configured header
    pub fn write(&self, payload: &[u8]) -> RteResult<()> {
        if payload.len() > self.config.max_payload {
            return Err(RteError::Limit {
                len: payload.len(),
                limit: self.config.max_payload,
            });
        }
        let frame = {
            let mut tx = self.tx.lock();
            if tx.busy {
                return Err(RteError::ComBusy);
            }
            let header = self.config.header.len();
            let len = header + payload.len();
            tx.data[..header].copy_from_slice(&self.config.header);
            tx.data[header..len].copy_from_slice(payload);
            tx.len = len;
            tx.copied = 0;
            tx.busy = true;
            tx.data[..len].to_vec()
        };

        // The lower layer may call back into copy_tx_data from here
        if let Err(err) = self.ldcom.transmit(self.config.tx_pdu, &PduInfo::new(&frame)) {
            warn!(pdu = self.config.tx_pdu, error = %err, "SomeIpTp transmit refused");
            self.tx.lock().busy = false;
            return Err(RteError::ComStopped);
        }
        debug!(pdu = self.config.tx_pdu, len = frame.len(), "SomeIpTp transmission started");
        Ok(())
    }

    /// Copy the newest received payload into `out`
    ///
    /// Each payload is delivered once; a too small `out` leaves it unread.
    pub fn read(&self, out: &mut [u8]) -> RteResult<usize> {
        let index = {
            let mut ctrl = self.rx_ctrl.lock();
            match ctrl.newest {
                Some(i) if ctrl.fresh => {
                    ctrl.locked = Some(i);
                    i
                }
                _ => return Err(RteError::NoData),
            }
        };

        let result = {
            let buffer = self.rx_buffers[index].lock();
            let payload = &buffer.data[self.config.header.len()..buffer.len];
            match out.get_mut(..payload.len()) {
                Some(dst) => {
                    dst.copy_from_slice(payload);
                    Ok(payload.len())
                }
                None => Err(RteError::Limit {
                    len: payload.len(),
                    limit: out.len(),
                }),
            }
        };

        let mut ctrl = self.rx_ctrl.lock();
        ctrl.locked = None;
        if result.is_ok() && ctrl.newest == Some(index) {
            ctrl.fresh = false;
        }
        result
    }
}

impl LdComUpper for SomeIpTp {
    fn start_of_reception(&self, id: PduId, _info: &PduInfo<'_>, tp_sdu_length: PduLength) -> TpBuffer {
        if id != self.config.rx_pdu {
            self.report(service::START_OF_RECEPTION, det_code::PARAM);
            return TpBuffer::not_ok();
        }
        let len = tp_sdu_length as usize;
        if len > self.config.frame_capacity() {
            warn!(len, capacity = self.config.frame_capacity(), "SomeIpTp reception too large");
            return TpBuffer::with(BufReqReturn::Overflow, 0);
        }
        if len < self.config.header.len() {
            warn!(len, "SomeIpTp reception shorter than header");
            return TpBuffer::not_ok();
        }

        let target = {
            let mut ctrl = self.rx_ctrl.lock();
            if ctrl.receiving.is_some() {
                debug!("SomeIpTp reception restarted");
            }
            let Some(target) = ctrl.pick_target() else {
                return TpBuffer::with(BufReqReturn::Busy, 0);
            };
            if ctrl.newest == Some(target) {
                ctrl.newest = None;
                ctrl.fresh = false;
            }
            ctrl.receiving = Some(target);
            target
        };

        let mut buffer = self.rx_buffers[target].lock();
        buffer.len = 0;
        buffer.expected = len;
        TpBuffer::ok(tp_sdu_length)
    }

    fn copy_rx_data(&self, id: PduId, info: &PduInfo<'_>) -> TpBuffer {
        if id != self.config.rx_pdu {
            self.report(service::COPY_RX_DATA, det_code::PARAM);
            return TpBuffer::not_ok();
        }
        let Some(index) = self.rx_ctrl.lock().receiving else {
            self.report(service::COPY_RX_DATA, det_code::SEQUENCE);
            return TpBuffer::not_ok();
        };

        let mut buffer = self.rx_buffers[index].lock();
        let data = info.sdu.unwrap_or_default();
        let end = buffer.len + data.len();
        if end > buffer.expected {
            warn!(end, expected = buffer.expected, "SomeIpTp segment exceeds announced length");
            return TpBuffer::not_ok();
        }
        let start = buffer.len;
        buffer.data[start..end].copy_from_slice(data);
        buffer.len = end;
        TpBuffer::ok((buffer.expected - end) as PduLength)
    }

    fn tp_rx_indication(&self, id: PduId, result: StdResult) {
        if id != self.config.rx_pdu {
            self.report(service::TP_RX_INDICATION, det_code::PARAM);
            return;
        }
        let mut ctrl = self.rx_ctrl.lock();
        let Some(index) = ctrl.receiving.take() else {
            self.report(service::TP_RX_INDICATION, det_code::SEQUENCE);
            return;
        };
        let (len, complete) = {
            let buffer = self.rx_buffers[index].lock();
            (buffer.len, buffer.len == buffer.expected)
        };
        if result.is_ok() && complete {
            ctrl.newest = Some(index);
            ctrl.fresh = true;
            debug!(len, buffer = index, "SomeIpTp payload received");
        } else {
            warn!(len, ok = result.is_ok(), "SomeIpTp reception discarded");
        }
    }

    fn copy_tx_data(&self, id: PduId, buf: &mut [u8], retry: Option<RetryInfo>) -> TpBuffer {
        if id != self.config.tx_pdu {
            self.report(service::COPY_TX_DATA, det_code::PARAM);
            return TpBuffer::not_ok();
        }
        let mut tx = self.tx.lock();
        if !tx.busy {
            self.report(service::COPY_TX_DATA, det_code::SEQUENCE);
            return TpBuffer::not_ok();
        }
        if let Some(retry) = retry.filter(|r| r.state == TpDataState::Retry) {
            let back = retry.tx_tp_data_cnt as usize;
            if back > tx.copied {
                warn!(back, copied = tx.copied, "SomeIpTp retry beyond start of frame");
                return TpBuffer::not_ok();
            }
            tx.copied -= back;
        }

        let remaining = tx.len - tx.copied;
        if buf.len() > remaining {
            return TpBuffer::with(BufReqReturn::Busy, remaining as PduLength);
        }
        let start = tx.copied;
        buf.copy_from_slice(&tx.data[start..start + buf.len()]);
        tx.copied += buf.len();
        TpBuffer::ok((tx.len - tx.copied) as PduLength)
    }

    fn tp_tx_confirmation(&self, id: PduId, result: StdResult) {
        if id != self.config.tx_pdu {
            self.report(service::TP_TX_CONFIRMATION, det_code::PARAM);
            return;
        }
        let mut tx = self.tx.lock();
        if !tx.busy {
            self.report(service::TP_TX_CONFIRMATION, det_code::SEQUENCE);
            return;
        }
        tx.busy = false;
        match result {
            Ok(()) => debug!(len = tx.len, "SomeIpTp transmission confirmed"),
            Err(_) => warn!(len = tx.len, copied = tx.copied, "SomeIpTp transmission failed"),
        }
    }
}
