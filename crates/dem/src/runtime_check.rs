//! Runtime checks
//!
//! Integration errors detected on internal paths (out-of-range indices,
//! counter overflows) never propagate: the unsafe operation is skipped,
//! the failure is logged, counted and forwarded to the DET hook.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bsw_core::{DetError, DetReporter, ModuleId};
use tracing::error;

/// Site of a failed runtime check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeCheck {
    EventIndex,
    EntryIndex,
    MemoryIndex,
    DtcIndex,
    MilGroupIndex,
    IndicatorIndex,
    MilPendingOverflow,
    MilPendingUnderflow,
    IndicatorUnderflow,
    RecordLayout,
    NvBlock,
}

impl RuntimeCheck {
    /// DET error code reported for this site
    pub fn error_code(self) -> u8 {
        match self {
            RuntimeCheck::EventIndex => 0x0A,
            RuntimeCheck::EntryIndex => 0x0B,
            RuntimeCheck::MemoryIndex => 0x0C,
            RuntimeCheck::DtcIndex => 0x0D,
            RuntimeCheck::MilGroupIndex => 0x0E,
            RuntimeCheck::IndicatorIndex => 0x0F,
            RuntimeCheck::MilPendingOverflow => 0x10,
            RuntimeCheck::MilPendingUnderflow => 0x11,
            RuntimeCheck::IndicatorUnderflow => 0x12,
            RuntimeCheck::RecordLayout => 0x13,
            RuntimeCheck::NvBlock => 0x14,
        }
    }
}

/// Service id used for runtime check reports
pub const RUNTIME_CHECK_API: u8 = 0xFE;

/// Shared runtime check sink
#[derive(Clone)]
pub struct RuntimeChecks {
    count: Arc<AtomicU32>,
    det: Arc<dyn DetReporter>,
}

impl std::fmt::Debug for RuntimeChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeChecks")
            .field("count", &self.count())
            .finish()
    }
}

impl RuntimeChecks {
    pub fn new(det: Arc<dyn DetReporter>) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            det,
        }
    }

    /// Record a failed check; `detail` names the offending value
    pub fn failed(&self, check: RuntimeCheck, detail: impl std::fmt::Display) {
        self.count.fetch_add(1, Ordering::Relaxed);
        error!(check = ?check, detail = %detail, "Runtime check failed, operation skipped");
        self.det.report_runtime_error(DetError {
            module: ModuleId::DEM,
            instance: 0,
            api: RUNTIME_CHECK_API,
            error: check.error_code(),
        });
    }

    /// Number of failed checks since construction
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn det(&self) -> &Arc<dyn DetReporter> {
        &self.det
    }
}
