//! Dem facade
//!
//! [`Dem`] is the handle shared by monitors, diagnostic clients and the
//! scheduler. It owns two locks: the state lock around [`DemState`] (the
//! DiagMonitor critical section) and the monitor lock around report
//! intake. The state lock may be held while taking the monitor lock, never
//! the other way round. Notifications and NV writes happen after the state
//! lock is released.

use std::sync::Arc;

use bsw_core::{DetReporter, TracingDet};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::{ClearProgress, DtcFilter, DtcOrigin};
use crate::config::DemConfig;
use crate::debounce::MonitorStatus;
use crate::error::{DemError, DemResult};
use crate::ids::{ClientId, ConditionId, CycleId, EventId, IndicatorId};
use crate::memory::{DataProvider, TimeSeriesSamples};
use crate::monitor::MonitorState;
use crate::notify::{Notification, NotificationListener, Notifier};
use crate::nv::{write_blocks, NvStorage, RestoreReport};
use crate::runtime_check::RuntimeChecks;
use crate::state::DemState;
use crate::status::UdsStatus;
use crate::store::IndicatorStatus;
use crate::tables::{ConfigLookup, Tables};

/// Notification channel capacity
const NOTIFICATION_CAPACITY: usize = 256;

/// Lifecycle phase of the Dem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninit,
    /// Monitor reports are queued, nothing is processed
    PreInit,
    Init,
    Shutdown,
}

/// Diagnostic Event Manager
pub struct Dem {
    config: Arc<DemConfig>,
    tables: Arc<Tables>,
    state: Mutex<DemState>,
    monitor: Mutex<MonitorState>,
    nv: Arc<dyn NvStorage>,
    notifier: Notifier,
    checks: RuntimeChecks,
    phase: RwLock<Phase>,
}

impl std::fmt::Debug for Dem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dem")
            .field("events", &self.tables.event_count())
            .field("dtcs", &self.tables.dtc_count())
            .field("phase", &*self.phase.read())
            .finish()
    }
}

impl Dem {
    /// Create a Dem reporting development errors through `tracing`
    pub fn new(config: DemConfig, nv: Arc<dyn NvStorage>, provider: Arc<dyn DataProvider>) -> DemResult<Self> {
        Self::with_det(config, nv, provider, Arc::new(TracingDet))
    }

    pub fn with_det(
        config: DemConfig,
        nv: Arc<dyn NvStorage>,
        provider: Arc<dyn DataProvider>,
        det: Arc<dyn DetReporter>,
    ) -> DemResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let tables = Arc::new(Tables::build(&config));
        let checks = RuntimeChecks::new(det);
        let state = DemState::new(Arc::clone(&config), Arc::clone(&tables), provider, checks.clone());
        let monitor = MonitorState::new(&config);
        Ok(Self {
            state: Mutex::new(state),
            monitor: Mutex::new(monitor),
            notifier: Notifier::new(NOTIFICATION_CAPACITY),
            phase: RwLock::new(Phase::Uninit),
            config,
            tables,
            nv,
            checks,
        })
    }

    pub fn config(&self) -> &DemConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    fn require_init(&self) -> DemResult<()> {
        match self.phase() {
            Phase::Init => Ok(()),
            _ => Err(DemError::Uninit),
        }
    }

    /// Run `f` under the state lock, then dispatch its notifications
    fn with_state<R>(&self, f: impl FnOnce(&mut DemState) -> R) -> R {
        let (result, outbox) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, std::mem::take(&mut state.outbox))
        };
        self.notifier.dispatch(outbox);
        result
    }

    /// Like [`Dem::with_state`] with the monitor lock taken inside
    fn with_state_and_monitor<R>(&self, f: impl FnOnce(&mut DemState, &mut MonitorState) -> R) -> R {
        self.with_state(|state| {
            let mut monitor = self.monitor.lock();
            f(state, &mut monitor)
        })
    }

    fn check_event(&self, event: EventId) -> DemResult<()> {
        if self.tables.is_valid_event(event) {
            Ok(())
        } else {
            Err(DemError::InvalidEvent(event.0))
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Accept monitor reports before NV data is available
    pub fn pre_init(&self) -> DemResult<()> {
        let mut phase = self.phase.write();
        if *phase != Phase::Uninit && *phase != Phase::Shutdown {
            return Err(DemError::Rejected(format!("pre_init in phase {:?}", *phase)));
        }
        *self.monitor.lock() = MonitorState::new(&self.config);
        *phase = Phase::PreInit;
        debug!("Dem pre-initialized");
        Ok(())
    }

    /// Restore NV data and start the auto-start operation cycles
    pub fn init(&self) -> DemResult<RestoreReport> {
        if self.phase() == Phase::Uninit {
            self.pre_init()?;
        }
        let mut phase = self.phase.write();
        if *phase != Phase::PreInit {
            return Err(DemError::Rejected(format!("init in phase {:?}", *phase)));
        }
        let (report, outbox) = {
            let mut state = self.state.lock();
            let mut monitor = self.monitor.lock();
            // Results reported during pre-init count for the new cycles
            let early = monitor.drain();
            state.reset();
            let report = state.restore(self.nv.as_ref());
            state.apply_default_availability();
            for event in self.tables.event_ids() {
                let connected = state.store.event(event).map_or(false, |d| !d.internal.disconnected);
                monitor.set_available(event, connected);
            }
            for (i, cycle) in self.config.operation_cycles.iter().enumerate() {
                if cycle.auto_start {
                    state.op_cycle_start(&mut monitor, CycleId(i as u8));
                }
            }
            for (event, result) in early {
                if monitor.is_available(event) {
                    state.process_result(event, result);
                }
            }
            (report, std::mem::take(&mut state.outbox))
        };
        *phase = Phase::Init;
        drop(phase);
        self.notifier.dispatch(outbox);
        info!(
            events = self.tables.event_count(),
            dtcs = self.tables.dtc_count(),
            restored_entries = report.entries,
            "Dem initialized"
        );
        Ok(report)
    }

    /// Write every dirty NV block and stop processing
    pub fn shutdown(&self) -> DemResult<()> {
        let mut phase = self.phase.write();
        if *phase != Phase::Init {
            return Err(DemError::Uninit);
        }
        *phase = Phase::Shutdown;
        drop(phase);

        let writes = self.state.lock().take_nv_writes(None);
        let outcomes = write_blocks(self.nv.as_ref(), writes);
        self.with_state(|state| state.finish_nv_writes(&outcomes));
        let failed = outcomes.into_iter().find_map(|o| o.result.err());
        info!(failed = failed.is_some(), "Dem shut down");
        match failed {
            Some(e) => Err(DemError::Nv(e)),
            None => Ok(()),
        }
    }

    /// Cyclic processing: debounce timers, queued results, time-series
    /// sampling, the clear job and a budget of NV writes
    pub fn main_function(&self) {
        if self.phase() != Phase::Init {
            return;
        }
        let budget = self.config.features.nv_writes_per_cycle;
        let writes = self.with_state_and_monitor(|state, monitor| {
            monitor.tick(&self.config);
            for (event, result) in monitor.drain() {
                state.process_result(event, result);
            }
            state.sample_time_series(|e| monitor.fdc(e));
            state.process_clear_job(monitor);
            state.take_nv_writes(Some(budget))
        });
        if writes.is_empty() {
            return;
        }
        let outcomes = write_blocks(self.nv.as_ref(), writes);
        self.with_state(|state| state.finish_nv_writes(&outcomes));
    }

    // ── Notifications ────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.notifier.add_listener(listener);
    }

    pub fn runtime_check_count(&self) -> u32 {
        self.checks.count()
    }

    // ── Event API ────────────────────────────────────────────────────────────

    /// Report a monitor result; processed by the next main function
    pub fn set_event_status(&self, event: EventId, status: MonitorStatus) -> DemResult<()> {
        match self.phase() {
            Phase::PreInit | Phase::Init => {}
            _ => return Err(DemError::Uninit),
        }
        let result = self.monitor.lock().report(&self.config, &self.tables, event, status);
        if let Err(e) = &result {
            if matches!(e, DemError::QueueOverflow(_) | DemError::InvalidEvent(_)) {
                warn!(event = %event, error = %e, "Report rejected");
            }
        }
        result
    }

    pub fn reset_event_debounce_status(&self, event: EventId) -> DemResult<()> {
        self.require_init()?;
        self.check_event(event)?;
        self.monitor.lock().reset_debounce(event);
        Ok(())
    }

    /// Set the FDC of a monitor-internal debounced event
    pub fn set_fault_detection_counter(&self, event: EventId, fdc: i8) -> DemResult<()> {
        self.require_init()?;
        self.monitor.lock().set_fdc(&self.config, event, fdc)
    }

    pub fn get_fault_detection_counter(&self, event: EventId) -> DemResult<i8> {
        self.require_init()?;
        self.check_event(event)?;
        Ok(self.monitor.lock().fdc(event))
    }

    pub fn set_operation_cycle_state(&self, cycle: CycleId, start: bool) -> DemResult<()> {
        self.require_init()?;
        if cycle.index() >= self.config.operation_cycles.len() {
            return Err(DemError::Rejected(format!("unknown operation cycle {}", cycle.0)));
        }
        self.with_state_and_monitor(|state, monitor| {
            if start {
                state.op_cycle_start(monitor, cycle);
            } else {
                state.op_cycle_end(cycle);
            }
        });
        info!(cycle = cycle.0, start, "Operation cycle state changed");
        Ok(())
    }

    pub fn set_event_available(&self, event: EventId, available: bool) -> DemResult<()> {
        self.require_init()?;
        self.check_event(event)?;
        self.with_state_and_monitor(|state, monitor| state.set_available(monitor, event, available))
    }

    pub fn is_event_available(&self, event: EventId) -> DemResult<bool> {
        self.require_init()?;
        self.check_event(event)?;
        Ok(self.monitor.lock().is_available(event))
    }

    pub fn set_similar_conditions(&self, event: EventId, similar: bool) -> DemResult<()> {
        self.require_init()?;
        self.check_event(event)?;
        self.with_state(|state| state.set_similar_conditions(event, similar));
        Ok(())
    }

    /// The OBD driving cycle qualified: confirmed and WIR bits become visible
    pub fn set_dcy_qualified(&self) -> DemResult<()> {
        self.require_init()?;
        self.with_state(|state| state.qualify_dcy());
        Ok(())
    }

    pub fn set_enable_condition(&self, condition: ConditionId, fulfilled: bool) -> DemResult<()> {
        self.require_init()?;
        self.monitor.lock().set_enable_condition(condition, fulfilled)
    }

    pub fn set_storage_condition(&self, condition: ConditionId, fulfilled: bool) -> DemResult<()> {
        self.require_init()?;
        self.with_state(|state| {
            let slot = state
                .storage_conditions
                .get_mut(condition.index())
                .ok_or_else(|| DemError::Rejected(format!("unknown storage condition {}", condition.0)))?;
            *slot = fulfilled;
            Ok(())
        })
    }

    pub fn disable_dtc_setting(&self) -> DemResult<()> {
        self.require_init()?;
        self.monitor.lock().set_dtc_setting(false);
        info!("DTC setting disabled");
        Ok(())
    }

    pub fn enable_dtc_setting(&self) -> DemResult<()> {
        self.require_init()?;
        self.monitor.lock().set_dtc_setting(true);
        info!("DTC setting enabled");
        Ok(())
    }

    /// Internal UDS status of an event
    pub fn get_event_udsstatus(&self, event: EventId) -> DemResult<UdsStatus> {
        self.require_init()?;
        self.check_event(event)?;
        Ok(self.state.lock().store.status(event))
    }

    /// Status as reported externally: unqualified CDTC/WIR masked
    pub fn get_event_status_external(&self, event: EventId) -> DemResult<UdsStatus> {
        self.require_init()?;
        self.check_event(event)?;
        let state = self.state.lock();
        state
            .store
            .event(event)
            .map(|d| d.external())
            .ok_or(DemError::InvalidEvent(event.0))
    }

    pub fn get_event_failed(&self, event: EventId) -> DemResult<bool> {
        Ok(self.get_event_udsstatus(event)?.test_failed())
    }

    /// Whether the event was tested this operation cycle
    pub fn get_event_tested(&self, event: EventId) -> DemResult<bool> {
        Ok(!self.get_event_udsstatus(event)?.not_completed_this_cycle())
    }

    pub fn get_dtc_of_event(&self, event: EventId) -> DemResult<u32> {
        self.check_event(event)?;
        self.config
            .event(event)
            .and_then(|e| e.dtc)
            .ok_or(DemError::NoSuchElement)
    }

    pub fn get_indicator_status(&self, indicator: IndicatorId) -> DemResult<IndicatorStatus> {
        self.require_init()?;
        self.state
            .lock()
            .store
            .indicator_status(indicator)
            .ok_or_else(|| DemError::Rejected(format!("unknown indicator {}", indicator.0)))
    }

    // ── Client API ───────────────────────────────────────────────────────────

    pub fn set_dtc_filter(&self, client: ClientId, filter: DtcFilter) -> DemResult<()> {
        self.require_init()?;
        self.state.lock().set_dtc_filter(client, filter)
    }

    pub fn get_number_of_filtered_dtc(&self, client: ClientId) -> DemResult<usize> {
        self.require_init()?;
        self.state.lock().number_of_filtered_dtc(client)
    }

    /// Next matching DTC and its status; `NoSuchElement` past the end
    pub fn get_next_filtered_dtc(&self, client: ClientId) -> DemResult<(u32, UdsStatus)> {
        self.require_init()?;
        self.state.lock().next_filtered_dtc(client)
    }

    pub fn get_next_filtered_dtc_and_fdc(&self, client: ClientId) -> DemResult<(u32, i8)> {
        self.require_init()?;
        let mut state = self.state.lock();
        let monitor = self.monitor.lock();
        state.next_filtered_dtc_and_fdc(client, |e| monitor.fdc(e))
    }

    pub fn get_status_of_dtc(&self, number: u32, origin: DtcOrigin) -> DemResult<UdsStatus> {
        self.require_init()?;
        self.state.lock().status_of_dtc(number, origin)
    }

    pub fn get_dtc_status_availability_mask(&self) -> u8 {
        self.config.features.status_availability_mask
    }

    pub fn get_freeze_frame_data_by_dtc(
        &self,
        number: u32,
        origin: DtcOrigin,
        record: u8,
        buf: &mut [u8],
    ) -> DemResult<usize> {
        self.require_init()?;
        self.state.lock().freeze_frame_data(number, origin, record, buf)
    }

    pub fn get_size_of_freeze_frame_by_dtc(&self, number: u32, origin: DtcOrigin, record: u8) -> DemResult<usize> {
        self.require_init()?;
        Ok(self.state.lock().render_freeze_frames(number, origin, record)?.len())
    }

    pub fn get_extended_data_record_by_dtc(
        &self,
        number: u32,
        origin: DtcOrigin,
        record: u8,
        buf: &mut [u8],
    ) -> DemResult<usize> {
        self.require_init()?;
        self.state.lock().extended_data(number, origin, record, buf)
    }

    pub fn get_size_of_extended_data_record_by_dtc(
        &self,
        number: u32,
        origin: DtcOrigin,
        record: u8,
    ) -> DemResult<usize> {
        self.require_init()?;
        Ok(self.state.lock().render_extended(number, origin, record)?.len())
    }

    pub fn get_time_series_samples(&self, number: u32, origin: DtcOrigin) -> DemResult<TimeSeriesSamples> {
        self.require_init()?;
        self.state.lock().time_series_samples(number, origin)
    }

    /// Start or poll a clear request
    ///
    /// `number` is a DTC number, a group address or 0xFFFFFF for all DTCs.
    /// Returns `Pending` until the main function finished the clear and its
    /// NV writes.
    pub fn clear_dtc(&self, client: ClientId, number: u32, origin: DtcOrigin) -> DemResult<ClearProgress> {
        self.require_init()?;
        self.with_state(|state| state.clear_dtc(client, number, origin))
    }

    pub fn disable_dtc_record_update(&self, client: ClientId, number: u32, origin: DtcOrigin) -> DemResult<()> {
        self.require_init()?;
        self.state.lock().disable_record_update(client, number, origin)
    }

    pub fn enable_dtc_record_update(&self, client: ClientId) -> DemResult<()> {
        self.require_init()?;
        self.state.lock().enable_record_update(client)
    }

    pub fn get_event_memory_overflow(&self, origin: DtcOrigin) -> DemResult<bool> {
        self.require_init()?;
        self.state.lock().memory_overflow(origin)
    }

    pub fn get_number_of_event_memory_entries(&self, origin: DtcOrigin) -> DemResult<usize> {
        self.require_init()?;
        self.state.lock().memory_entry_count(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DtcConfig, EventConfig};
    use crate::memory::NoDataProvider;
    use crate::notify::RecordingListener;
    use crate::nv::MemoryNvStorage;

    fn dem() -> (Dem, Arc<MemoryNvStorage>) {
        let mut config = DemConfig::default();
        config.dtcs.push(DtcConfig::new(0x010100));
        config.events.push(EventConfig::new("a", Some(0x010100)));
        config.events.push(EventConfig::new("b", None));
        let nv = Arc::new(MemoryNvStorage::new());
        let dem = Dem::new(config, nv.clone(), Arc::new(NoDataProvider)).unwrap();
        (dem, nv)
    }

    #[test]
    fn test_api_requires_init() {
        let (dem, _) = dem();
        assert!(matches!(
            dem.get_event_udsstatus(EventId(1)),
            Err(DemError::Uninit)
        ));
        assert!(matches!(
            dem.set_event_status(EventId(1), MonitorStatus::Failed),
            Err(DemError::Uninit)
        ));
        dem.pre_init().unwrap();
        // Reports are queued during pre-init and processed by init
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.init().unwrap();
        assert!(dem.get_event_failed(EventId(1)).unwrap());
    }

    #[test]
    fn test_report_processed_by_main_function() {
        let (dem, _) = dem();
        dem.init().unwrap();
        assert!(!dem.get_event_tested(EventId(1)).unwrap());

        let listener = Arc::new(RecordingListener::new());
        dem.add_listener(listener.clone());
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert!(!dem.get_event_failed(EventId(1)).unwrap());

        dem.main_function();
        assert!(dem.get_event_failed(EventId(1)).unwrap());
        assert!(dem.get_event_tested(EventId(1)).unwrap());
        assert_eq!(dem.get_dtc_of_event(EventId(1)).unwrap(), 0x010100);
        assert!(matches!(
            dem.get_dtc_of_event(EventId(2)),
            Err(DemError::NoSuchElement)
        ));
        assert!(listener
            .take()
            .iter()
            .any(|n| matches!(n, Notification::DtcStatusChanged { dtc: 0x010100, .. })));
    }

    #[test]
    fn test_shutdown_persists_and_init_restores() {
        let (dem, nv) = dem();
        dem.init().unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.main_function();
        let status = dem.get_event_udsstatus(EventId(1)).unwrap();
        dem.shutdown().unwrap();
        assert!(matches!(dem.get_event_udsstatus(EventId(1)), Err(DemError::Uninit)));

        let mut config = DemConfig::default();
        config.dtcs.push(DtcConfig::new(0x010100));
        config.events.push(EventConfig::new("a", Some(0x010100)));
        config.events.push(EventConfig::new("b", None));
        let again = Dem::new(config, nv, Arc::new(NoDataProvider)).unwrap();
        let report = again.init().unwrap();
        assert!(report.layout_matched);
        // The auto-start cycle restarts: TFTOC cleared, TNCTOC set
        let restored = again.get_event_udsstatus(EventId(1)).unwrap();
        assert!(restored.confirmed());
        assert_eq!(restored.bits() & 0x0C, status.bits() & 0x0C);
        assert!(restored.not_completed_this_cycle());
        assert_eq!(
            again.get_number_of_event_memory_entries(DtcOrigin::Primary).unwrap(),
            1
        );
    }

    #[test]
    fn test_unknown_cycle_and_condition() {
        let (dem, _) = dem();
        dem.init().unwrap();
        assert!(dem.set_operation_cycle_state(CycleId(9), true).is_err());
        assert!(dem.set_storage_condition(ConditionId(0), true).is_err());
        assert!(dem.set_enable_condition(ConditionId(0), true).is_err());
        assert_eq!(dem.runtime_check_count(), 0);
    }
}
