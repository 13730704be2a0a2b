//! dem - Diagnostic Event Manager
//!
//! Tracks diagnostic events reported by monitors, derives their UDS status
//! bytes, stores DTCs with snapshot and extended data in fault memories,
//! ages and heals them, and persists everything through an [`NvStorage`]
//! backend.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Dem                                │
//! │                                                               │
//! │  monitors ──► MonitorState (debounce, report queues)          │
//! │                      │ main_function                          │
//! │                      ▼                                        │
//! │  DemState ── event engine ── dtc storage ── aging             │
//! │     │            │                                            │
//! │     │      StatusStore, FaultMemory, PermanentMemory          │
//! │     │                                                         │
//! │     ├──► outbox ──► Notifier (broadcast + listeners)          │
//! │     └──► DirtyTracker ──► NvStorage (after unlock)            │
//! │                                                               │
//! │  clients ──► filters, readout, clear job                      │
//! └───────────────────────────────────────────────────────────────┘
//! ```

mod aging;
pub mod client;
pub mod config;
pub mod debounce;
pub mod dem;
pub mod dtc;
pub mod error;
pub mod event;
pub mod ids;
pub mod memory;
pub mod monitor;
pub mod notify;
pub mod nv;
pub mod runtime_check;
mod state;
pub mod status;
pub mod store;
pub mod tables;

pub use client::{ClearProgress, DtcFilter, DtcOrigin, DtcSelector};
pub use config::DemConfig;
pub use debounce::MonitorStatus;
pub use dem::{Dem, Phase};
pub use dtc::DtcNumber;
pub use error::{ConfigError, DemError, DemResult, DemReturn, NvError};
pub use ids::{ClientId, ConditionId, CycleId, DtcIndex, EventId, IndicatorId, MemoryId};
pub use memory::{DataProvider, NoDataProvider, StaticDataProvider, TimeSeriesSamples};
pub use notify::{Notification, NotificationListener, RecordingListener};
pub use nv::{FileNvStorage, MemoryNvStorage, NvBlockId, NvStorage, RestoreReport};
pub use status::{status_bit, UdsStatus};
pub use store::IndicatorStatus;
