//! Interfaces towards the layers above and below LdCom

use bsw_core::{BufReqReturn, NotOk, PduId, PduInfo, PduLength, RetryInfo, StdResult};

/// Outcome of a TP buffer handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpBuffer {
    pub result: BufReqReturn,
    /// Remaining buffer space (Rx) or remaining data (Tx) after the call
    pub available: PduLength,
}

impl TpBuffer {
    pub fn ok(available: PduLength) -> Self {
        Self {
            result: BufReqReturn::Ok,
            available,
        }
    }

    pub fn not_ok() -> Self {
        Self {
            result: BufReqReturn::NotOk,
            available: 0,
        }
    }

    pub fn with(result: BufReqReturn, available: PduLength) -> Self {
        Self { result, available }
    }
}

/// Consumer of one or more LdCom PDUs
///
/// Only the callbacks matching the PDU's direction and API type are ever
/// invoked; the defaults refuse everything.
pub trait LdComUpper: Send + Sync {
    /// A PDU was received over the communication interface
    fn rx_indication(&self, _id: PduId, _info: &PduInfo<'_>) {}

    /// A PDU sent over the communication interface left the bus (or failed)
    fn tx_confirmation(&self, _id: PduId, _result: StdResult) {}

    /// The lower layer asks for the PDU content just before sending it
    fn trigger_transmit(&self, _id: PduId, _buf: &mut [u8]) -> StdResult<usize> {
        Err(NotOk)
    }

    /// A segmented reception of `tp_sdu_length` bytes begins
    fn start_of_reception(&self, _id: PduId, _info: &PduInfo<'_>, _tp_sdu_length: PduLength) -> TpBuffer {
        TpBuffer::not_ok()
    }

    /// Next segment of a reception; an empty `info` queries the free space
    fn copy_rx_data(&self, _id: PduId, _info: &PduInfo<'_>) -> TpBuffer {
        TpBuffer::not_ok()
    }

    /// A segmented reception ended
    fn tp_rx_indication(&self, _id: PduId, _result: StdResult) {}

    /// Fill `buf` with the next segment of a segmented transmission
    fn copy_tx_data(&self, _id: PduId, _buf: &mut [u8], _retry: Option<RetryInfo>) -> TpBuffer {
        TpBuffer::not_ok()
    }

    /// A segmented transmission ended
    fn tp_tx_confirmation(&self, _id: PduId, _result: StdResult) {}
}

/// The PDU router below LdCom
pub trait PduRouter: Send + Sync {
    /// Request transmission of the PDU router handle `pdur_id`
    ///
    /// For TP PDUs `info` carries the complete SDU so the router knows the
    /// total length; data is fetched afterwards through `copy_tx_data`.
    fn ldcom_transmit(&self, pdur_id: PduId, info: &PduInfo<'_>) -> StdResult;
}
