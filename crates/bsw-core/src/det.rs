//! Development error tracing (DET) hook
//!
//! Modules report contract violations (invalid handles, calls before
//! initialization, missing buffers) through a [`DetReporter`]. The call
//! itself then becomes a no-op returning its error value.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

/// AUTOSAR module identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModuleId(pub u16);

impl ModuleId {
    /// LdCom - Large Data COM
    pub const LDCOM: ModuleId = ModuleId(49);
    /// Dem - Diagnostic Event Manager
    pub const DEM: ModuleId = ModuleId(54);
    /// Complex device drivers share the vendor-specific id range
    pub const CDD: ModuleId = ModuleId(255);
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ModuleId::LDCOM => f.write_str("LdCom"),
            ModuleId::DEM => f.write_str("Dem"),
            ModuleId::CDD => f.write_str("Cdd"),
            ModuleId(other) => write!(f, "module {}", other),
        }
    }
}

/// One reported development error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetError {
    /// Reporting module
    pub module: ModuleId,
    /// Module instance
    pub instance: u8,
    /// Service (API) id of the failing call
    pub api: u8,
    /// Module-specific error code
    pub error: u8,
}

/// Sink for development errors
pub trait DetReporter: Send + Sync {
    /// Report a development error
    fn report_error(&self, err: DetError);

    /// Report a runtime error (detected in production code paths)
    fn report_runtime_error(&self, err: DetError) {
        self.report_error(err);
    }
}

/// Discards all reports
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDet;

impl DetReporter for NoDet {
    fn report_error(&self, _err: DetError) {}
}

/// Logs every report through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDet;

impl DetReporter for TracingDet {
    fn report_error(&self, err: DetError) {
        error!(
            module = %err.module,
            instance = err.instance,
            api = format!("0x{:02X}", err.api),
            error = format!("0x{:02X}", err.error),
            "Development error"
        );
    }

    fn report_runtime_error(&self, err: DetError) {
        error!(
            module = %err.module,
            instance = err.instance,
            api = format!("0x{:02X}", err.api),
            error = format!("0x{:02X}", err.error),
            "Runtime error"
        );
    }
}

/// Records reports in memory so tests can assert on them
#[derive(Debug, Default)]
pub struct DetRecorder {
    errors: Mutex<Vec<DetError>>,
}

impl DetRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far
    pub fn errors(&self) -> Vec<DetError> {
        self.errors.lock().clone()
    }

    /// The most recent report
    pub fn last(&self) -> Option<DetError> {
        self.errors.lock().last().copied()
    }

    /// Whether `error` was reported by `module` for service `api`
    pub fn contains(&self, module: ModuleId, api: u8, error: u8) -> bool {
        self.errors
            .lock()
            .iter()
            .any(|e| e.module == module && e.api == api && e.error == error)
    }

    pub fn clear(&self) {
        self.errors.lock().clear();
    }
}

impl DetReporter for DetRecorder {
    fn report_error(&self, err: DetError) {
        self.errors.lock().push(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_collects_reports() {
        let det = DetRecorder::new();
        det.report_error(DetError {
            module: ModuleId::LDCOM,
            instance: 0,
            api: 0x05,
            error: 0x05,
        });

        assert!(det.contains(ModuleId::LDCOM, 0x05, 0x05));
        assert!(!det.contains(ModuleId::DEM, 0x05, 0x05));
        assert_eq!(det.errors().len(), 1);

        det.clear();
        assert!(det.last().is_none());
    }

    #[test]
    fn test_module_display() {
        assert_eq!(ModuleId::DEM.to_string(), "Dem");
        assert_eq!(ModuleId(12).to_string(), "module 12");
    }
}
