//! LdCom error types and DET codes

use bsw_core::PduId;
use thiserror::Error;

pub type LdComResult<T> = Result<T, LdComError>;

/// DET error codes of the LdCom module
pub mod det_code {
    pub const PARAM: u8 = 0x01;
    pub const UNINIT: u8 = 0x02;
    pub const PARAM_POINTER: u8 = 0x03;
    pub const INVALID_PDU_SDU_ID: u8 = 0x04;
    pub const INVALID_SIGNAL_ID: u8 = 0x05;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LdComError {
    #[error("LdCom is not initialized")]
    Uninit,

    /// Handle passed by a lower layer is unknown or of the wrong kind
    #[error("invalid PDU id {0}")]
    InvalidPduId(PduId),

    /// Handle passed by an upper layer is unknown or of the wrong kind
    #[error("invalid signal id {0}")]
    InvalidSignalId(PduId),

    #[error("missing data buffer")]
    ParamPointer,

    #[error("invalid parameter: {0}")]
    Param(String),

    /// The PDU router refused the request
    #[error("transmit of PDU {0} rejected by the PDU router")]
    Rejected(PduId),

    /// No upper layer is bound to the PDU, or it was dropped
    #[error("no upper layer bound to PDU {0}")]
    NoUpper(PduId),

    /// The upper layer could not provide the PDU content
    #[error("upper layer failed to provide PDU {0}")]
    TriggerTransmitFailed(PduId),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LdComError {
    /// DET code reported for this error, if it is a development error
    pub fn det_code(&self) -> Option<u8> {
        match self {
            LdComError::Uninit => Some(det_code::UNINIT),
            LdComError::InvalidPduId(_) => Some(det_code::INVALID_PDU_SDU_ID),
            LdComError::InvalidSignalId(_) => Some(det_code::INVALID_SIGNAL_ID),
            LdComError::ParamPointer => Some(det_code::PARAM_POINTER),
            LdComError::Param(_) => Some(det_code::PARAM),
            LdComError::Rejected(_)
            | LdComError::NoUpper(_)
            | LdComError::TriggerTransmitFailed(_)
            | LdComError::Config(_) => None,
        }
    }
}
