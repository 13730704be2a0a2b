//! PDU table of the LdCom module

use bsw_core::PduId;
use serde::{Deserialize, Serialize};

use crate::error::{LdComError, LdComResult};

/// Side of a PDU as seen from the upper layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Tx,
    Rx,
}

/// Interface used by the lower layer for a PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// Communication interface (single-frame, direct copy)
    If,
    /// Transport protocol (segmented, buffer handshakes)
    Tp,
}

/// One configured PDU, addressed by its index in [`LdComConfig::pdus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdComPduConfig {
    /// Name for logs
    #[serde(default)]
    pub name: String,
    pub direction: Direction,
    pub api: ApiType,
    /// Handle of the PDU at the PDU router (Tx only)
    #[serde(default)]
    pub pdur_id: PduId,
}

impl LdComPduConfig {
    pub fn new(name: impl Into<String>, direction: Direction, api: ApiType, pdur_id: PduId) -> Self {
        Self {
            name: name.into(),
            direction,
            api,
            pdur_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdComConfig {
    #[serde(default)]
    pub pdus: Vec<LdComPduConfig>,
}

impl LdComConfig {
    /// Parse a TOML table with a `[[pdus]]` array
    pub fn from_toml_str(text: &str) -> LdComResult<Self> {
        toml::from_str(text).map_err(|e| LdComError::Config(e.to_string()))
    }

    pub fn pdu(&self, id: PduId) -> Option<&LdComPduConfig> {
        self.pdus.get(usize::from(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_toml() {
        let config = LdComConfig::from_toml_str(
            r#"
            [[pdus]]
            name = "SomeIpTp_Tx"
            direction = "tx"
            api = "tp"
            pdur_id = 7

            [[pdus]]
            direction = "rx"
            api = "if"
            "#,
        )
        .unwrap();

        assert_eq!(config.pdus.len(), 2);
        assert_eq!(
            config.pdu(0),
            Some(&LdComPduConfig::new("SomeIpTp_Tx", Direction::Tx, ApiType::Tp, 7))
        );
        assert_eq!(config.pdu(1).unwrap().pdur_id, 0);
        assert!(config.pdu(2).is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_direction() {
        let err = LdComConfig::from_toml_str(
            r#"
            [[pdus]]
            direction = "both"
            api = "if"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LdComError::Config(_)));
    }
}
