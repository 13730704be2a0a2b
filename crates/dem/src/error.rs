//! Error types for the Dem client and event APIs

use thiserror::Error;

/// Result type for Dem operations
pub type DemResult<T> = Result<T, DemError>;

/// Numeric return codes of the Dem service interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DemReturn {
    Ok = 0x00,
    NotOk = 0x01,
    Pending = 0x04,
    ClearBusy = 0x05,
    ClearMemoryError = 0x06,
    ClearFailed = 0x07,
    WrongDtc = 0x08,
    WrongDtcOrigin = 0x09,
    NoSuchElement = 0x30,
    BufferTooSmall = 0x31,
}

impl DemReturn {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors returned by the Dem
#[derive(Debug, Error)]
pub enum DemError {
    /// DTC number unknown or not matching the requested origin
    #[error("Wrong DTC: 0x{0:06X}")]
    WrongDtc(u32),

    /// Requested DTC origin (memory) does not exist
    #[error("Wrong DTC origin: {0}")]
    WrongDtcOrigin(String),

    /// Another clear operation is in progress
    #[error("Clear operation busy")]
    ClearBusy,

    /// Clear was not allowed for any selected DTC
    #[error("Clear failed")]
    ClearFailed,

    /// Clear completed in RAM but NV storage could not be updated
    #[error("Clear memory error: {0}")]
    ClearMemoryError(String),

    /// Caller-provided buffer cannot hold the requested data
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Requested record or filter element does not exist
    #[error("No such element")]
    NoSuchElement,

    /// The Dem is not (or no longer) initialized
    #[error("Dem not initialized")]
    Uninit,

    /// Event id outside the configured event table
    #[error("Invalid event id: {0}")]
    InvalidEvent(u16),

    /// Event is currently disconnected
    #[error("Event {0} unavailable")]
    EventUnavailable(u16),

    /// The event report queue is full
    #[error("Report queue overflow for event {0}")]
    QueueOverflow(u16),

    /// Request not accepted in the current state
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// NV backend failure
    #[error("NV error: {0}")]
    Nv(#[from] NvError),
}

impl DemError {
    /// Returns the AUTOSAR return code for this error
    pub fn return_code(&self) -> DemReturn {
        match self {
            DemError::WrongDtc(_) => DemReturn::WrongDtc,
            DemError::WrongDtcOrigin(_) => DemReturn::WrongDtcOrigin,
            DemError::ClearBusy => DemReturn::ClearBusy,
            DemError::ClearFailed => DemReturn::ClearFailed,
            DemError::ClearMemoryError(_) => DemReturn::ClearMemoryError,
            DemError::BufferTooSmall { .. } => DemReturn::BufferTooSmall,
            DemError::NoSuchElement => DemReturn::NoSuchElement,
            DemError::Uninit
            | DemError::InvalidEvent(_)
            | DemError::EventUnavailable(_)
            | DemError::QueueOverflow(_)
            | DemError::Rejected(_)
            | DemError::Config(_)
            | DemError::Nv(_) => DemReturn::NotOk,
        }
    }
}

impl From<ConfigError> for DemError {
    fn from(err: ConfigError) -> Self {
        DemError::Config(err.to_string())
    }
}

/// Errors of the NV storage backends and the block codec
#[derive(Debug, Error)]
pub enum NvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the request (write failure, busy)
    #[error("Block {0} rejected by NV backend")]
    Rejected(String),

    /// Magic, version or checksum mismatch
    #[error("Block corrupt: {0}")]
    Corrupt(String),

    #[error("Length mismatch: expected {expected} bytes, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Configuration validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("{what} {index} references unknown {target} {reference}")]
    DanglingReference {
        what: &'static str,
        index: usize,
        target: &'static str,
        reference: String,
    },

    #[error("Duplicate DTC number 0x{0:06X}")]
    DuplicateDtc(u32),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
