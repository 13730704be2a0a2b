//! Standard return type shared by all modules

use thiserror::Error;

/// The `E_NOT_OK` outcome of a standard service call
///
/// Callers that need the reason consult the DET hook; the return value
/// itself only says that the request was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request not accepted (E_NOT_OK)")]
pub struct NotOk;

/// Result type for standard services (`E_OK` / `E_NOT_OK`)
pub type StdResult<T = ()> = Result<T, NotOk>;

/// Numeric encoding of a standard result (`E_OK` = 0, `E_NOT_OK` = 1)
pub fn std_return_code<T>(result: &StdResult<T>) -> u8 {
    match result {
        Ok(_) => 0x00,
        Err(NotOk) => 0x01,
    }
}
