//! ldcom - Large Data COM
//!
//! Thin routing layer between upper-layer consumers of large PDUs (signals
//! that bypass the signal-based COM) and the PDU router. Every PDU handle is
//! bound to one [`LdComUpper`] implementation; lower-layer callbacks are
//! forwarded to it, transmit requests are forwarded to the [`PduRouter`].
//!
//! Handles are checked against the configured direction and API type. A
//! handle used on the wrong side counts as an invalid id.

pub mod config;
pub mod error;
pub mod ldcom;
pub mod upper;

pub use config::{ApiType, Direction, LdComConfig, LdComPduConfig};
pub use error::{LdComError, LdComResult};
pub use ldcom::{service, LdCom};
pub use upper::{LdComUpper, PduRouter, TpBuffer};
