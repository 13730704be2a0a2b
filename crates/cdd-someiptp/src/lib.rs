//! cdd-someiptp - SOME/IP TP complex device driver
//!
//! Sends and receives one large SOME/IP payload through LdCom TP PDUs. The
//! configured header (the transformer data offset) is prepended on
//! transmission and stripped on reception.
//!
//! Reception is double buffered: while the application reads the newest
//! complete payload, the next one is received into the other buffer.

pub mod config;
pub mod error;
pub mod someiptp;

pub use config::SomeIpTpConfig;
pub use error::{RteError, RteResult};
pub use someiptp::SomeIpTp;
