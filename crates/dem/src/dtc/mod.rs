//! DTC numbers and fault memory storage
//!
//! [`storage`] decides when an event gets a fault memory entry, evicts a
//! victim when the memory is full and captures the data records.

pub mod number;
pub mod storage;

pub use number::{dtc_group, DtcCategory, DtcNumber};
pub use storage::StorageRequest;
