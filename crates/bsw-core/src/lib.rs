//! bsw-core - Shared Basic-Software vocabulary
//!
//! This crate provides the types that the Dem, LdCom and SomeIpTp crates
//! exchange with each other and with their integrators: PDU descriptors,
//! the standard return/buffer-request codes and the development error
//! (DET) reporting hook.

pub mod det;
pub mod error;
pub mod pdu;

pub use det::{DetError, DetRecorder, DetReporter, ModuleId, NoDet, TracingDet};
pub use error::{NotOk, StdResult};
pub use pdu::{BufReqReturn, PduId, PduInfo, PduLength, RetryInfo, TpDataState};
