//! RTE return codes of the SomeIpTp interface

use thiserror::Error;

pub type RteResult<T> = Result<T, RteError>;

/// DET codes reported by the driver
pub mod det_code {
    /// Callback received for a handle the driver does not own
    pub const PARAM: u8 = 0x01;
    /// TP callback outside of an active transfer
    pub const SEQUENCE: u8 = 0x02;
}

/// Service ids reported with DET errors
pub mod service {
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const START_OF_RECEPTION: u8 = 0x46;
    pub const COPY_RX_DATA: u8 = 0x44;
    pub const TP_RX_INDICATION: u8 = 0x45;
    pub const COPY_TX_DATA: u8 = 0x43;
    pub const TP_TX_CONFIRMATION: u8 = 0x48;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RteError {
    /// A transmission is still in flight
    #[error("communication busy")]
    ComBusy,

    /// Payload or output buffer size out of bounds
    #[error("size limit exceeded: {len} bytes, limit {limit}")]
    Limit { len: usize, limit: usize },

    /// No new payload since the last read
    #[error("no data")]
    NoData,

    /// The transmit request was refused below
    #[error("communication stopped")]
    ComStopped,

    #[error("configuration error: {0}")]
    Config(String),
}

impl RteError {
    /// Numeric `Std_ReturnType` value used by the RTE
    pub fn code(&self) -> u8 {
        match self {
            RteError::ComStopped => 128,
            RteError::Limit { .. } => 130,
            RteError::NoData => 131,
            RteError::ComBusy => 141,
            RteError::Config(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(RteError::NoData.code(), 131);
        assert_eq!(RteError::Limit { len: 9, limit: 8 }.code(), 130);
        assert_eq!(RteError::ComBusy.code(), 141);
    }
}
