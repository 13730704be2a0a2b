//! PDU descriptors and transport-protocol buffer handshakes

use serde::{Deserialize, Serialize};

/// Handle of a PDU inside one module's configuration table
pub type PduId = u16;

/// Length of a PDU or TP SDU in bytes
pub type PduLength = u32;

/// A view on a PDU payload
///
/// `sdu` is `None` when the caller passed no data buffer; modules treat a
/// missing buffer as a parameter-pointer violation wherever a buffer is
/// required.
#[derive(Debug, Clone, Copy, Default)]
pub struct PduInfo<'a> {
    /// Payload bytes
    pub sdu: Option<&'a [u8]>,
    /// Optional meta data (addressing information)
    pub meta: Option<&'a [u8]>,
}

impl<'a> PduInfo<'a> {
    /// Create a PDU view over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            sdu: Some(data),
            meta: None,
        }
    }

    /// A PDU view without data buffer (used for length queries)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload length, 0 when no buffer is attached
    pub fn len(&self) -> usize {
        self.sdu.map(<[u8]>::len).unwrap_or(0)
    }

    /// Whether the view carries no payload bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a TP buffer request (`BufReq_ReturnType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufReqReturn {
    /// Buffer request accomplished
    Ok,
    /// Buffer request not successful, the transfer is aborted
    NotOk,
    /// Temporarily no buffer available, retry later
    Busy,
    /// The requested length exceeds the available buffer
    Overflow,
}

/// State of the data in a TP retransmission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TpDataState {
    /// Data copied may be released
    Confirmed,
    /// Data must be kept for a possible retransmission
    Retry,
    /// The last copied data may be discarded
    Pending,
}

/// Retransmission information passed with `CopyTxData`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    /// State of the previously copied data
    pub state: TpDataState,
    /// Number of bytes to rewind when `state` is `Retry`
    pub tx_tp_data_cnt: PduLength,
}

impl RetryInfo {
    /// Request confirmation of everything copied so far
    pub fn confirmed() -> Self {
        Self {
            state: TpDataState::Confirmed,
            tx_tp_data_cnt: 0,
        }
    }

    /// Request the last `count` bytes again
    pub fn retry(count: PduLength) -> Self {
        Self {
            state: TpDataState::Retry,
            tx_tp_data_cnt: count,
        }
    }
}
