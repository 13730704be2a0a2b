use bsw_core::PduId;
use serde::{Deserialize, Serialize};

use crate::error::{RteError, RteResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SomeIpTpConfig {
    /// LdCom handle used for transmission
    pub tx_pdu: PduId,
    /// LdCom handle used for reception
    pub rx_pdu: PduId,
    /// Bytes placed in front of every payload
    #[serde(default)]
    pub header: Vec<u8>,
    /// Largest payload accepted by `write` and `start_of_reception`
    pub max_payload: usize,
}

impl SomeIpTpConfig {
    pub fn from_toml_str(text: &str) -> RteResult<Self> {
        toml::from_str(text).map_err(|e| RteError::Config(e.to_string()))
    }

    /// Size of one Tx or Rx buffer
    pub fn frame_capacity(&self) -> usize {
        self.header.len() + self.max_payload
    }
}
