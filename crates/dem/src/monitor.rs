//! Monitor report intake
//!
//! [`MonitorState`] lives behind its own lock so that monitors can report
//! while the main function holds the state lock only briefly. It owns the
//! debounce state and a bounded FIFO of qualified results per event; the
//! main function drains the queues in first-report order.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::DemConfig;
use crate::debounce::{DebounceState, DebounceStep, MonitorStatus, Qualified, ResultKind};
use crate::error::{DemError, DemResult};
use crate::ids::{ConditionId, EventId};
use crate::tables::{ConfigLookup, Tables};

/// A debounced result waiting for the main function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorResult {
    pub kind: ResultKind,
    /// FDC when the result was qualified
    pub fdc: i8,
}

#[derive(Debug)]
pub(crate) struct MonitorState {
    depth: usize,
    /// Indexed by event id; slot 0 unused
    debounce: Vec<DebounceState>,
    queues: Vec<VecDeque<MonitorResult>>,
    /// Events with queued results, in order of their first queued result
    order: VecDeque<EventId>,
    available: Vec<bool>,
    enable_conditions: Vec<bool>,
    dtc_setting_disabled: bool,
}

impl MonitorState {
    pub fn new(config: &DemConfig) -> Self {
        let slots = config.events.len() + 1;
        let mut available = vec![false; slots];
        for (i, event) in config.events.iter().enumerate() {
            available[i + 1] = event.available_by_default;
        }
        Self {
            depth: config.features.queue_depth.max(1),
            debounce: vec![DebounceState::default(); slots],
            queues: vec![VecDeque::new(); slots],
            order: VecDeque::new(),
            available,
            enable_conditions: config
                .enable_conditions
                .iter()
                .map(|c| c.initially_fulfilled)
                .collect(),
            dtc_setting_disabled: false,
        }
    }

    /// Debounce a monitor report and queue a qualified result
    pub fn report(
        &mut self,
        config: &DemConfig,
        tables: &Tables,
        event: EventId,
        status: MonitorStatus,
    ) -> DemResult<()> {
        let Some(event_cfg) = config.event(event).filter(|_| tables.is_valid_event(event)) else {
            return Err(DemError::InvalidEvent(event.0));
        };
        if !self.available[event.index()] {
            return Err(DemError::EventUnavailable(event.0));
        }
        let conditions_ok = event_cfg
            .enable_conditions
            .iter()
            .all(|c| self.enable_conditions.get(*c as usize).copied().unwrap_or(false));
        if !conditions_ok {
            debug!(event = %event, "Report ignored, enable conditions not fulfilled");
            return Err(DemError::Rejected("enable conditions not fulfilled".into()));
        }
        if self.dtc_setting_disabled && tables.dtc_of(event).is_some() {
            debug!(event = %event, "Report ignored, DTC setting disabled");
            return Err(DemError::Rejected("DTC setting disabled".into()));
        }

        let step = self.debounce[event.index()]
            .report(&event_cfg.debounce, status)
            .map_err(|_| {
                DemError::Rejected(format!("{:?} not supported by the debounce algorithm", status))
            })?;
        self.queue_step(event, step)
    }

    fn queue_step(&mut self, event: EventId, step: DebounceStep) -> DemResult<()> {
        let fdc = self.debounce[event.index()].fdc();
        if step.threshold_reached {
            self.enqueue(event, MonitorResult {
                kind: ResultKind::FdcThreshold,
                fdc,
            })?;
        }
        if let Some(qualified) = step.qualified {
            let kind = match qualified {
                Qualified::Passed => ResultKind::Passed,
                Qualified::Failed => ResultKind::Failed,
            };
            self.enqueue(event, MonitorResult { kind, fdc })?;
        }
        Ok(())
    }

    fn enqueue(&mut self, event: EventId, result: MonitorResult) -> DemResult<()> {
        let queue = &mut self.queues[event.index()];
        if queue.back().map(|r| r.kind) == Some(result.kind) {
            // Same result again: only the newest FDC matters
            if let Some(last) = queue.back_mut() {
                last.fdc = result.fdc;
            }
            return Ok(());
        }
        if queue.len() >= self.depth {
            warn!(event = %event, depth = self.depth, "Report queue overflow");
            return Err(DemError::QueueOverflow(event.0));
        }
        if queue.is_empty() {
            self.order.push_back(event);
        }
        queue.push_back(result);
        Ok(())
    }

    /// Advance time-based debouncing of all events
    pub fn tick(&mut self, config: &DemConfig) {
        for (i, event_cfg) in config.events.iter().enumerate() {
            let event = EventId(i as u16 + 1);
            if !self.available[event.index()] {
                continue;
            }
            let step = self.debounce[event.index()].tick(&event_cfg.debounce);
            if step != DebounceStep::default() {
                if let Err(e) = self.queue_step(event, step) {
                    warn!(event = %event, error = %e, "Time-based result dropped");
                }
            }
        }
    }

    /// Take all queued results, per event FIFO, events in first-report order
    pub fn drain(&mut self) -> Vec<(EventId, MonitorResult)> {
        let mut results = Vec::new();
        while let Some(event) = self.order.pop_front() {
            if let Some(queue) = self.queues.get_mut(event.index()) {
                results.extend(queue.drain(..).map(|r| (event, r)));
            }
        }
        results
    }

    pub fn queued(&self, event: EventId) -> usize {
        self.queues.get(event.index()).map_or(0, VecDeque::len)
    }

    pub fn fdc(&self, event: EventId) -> i8 {
        self.debounce.get(event.index()).map_or(0, DebounceState::fdc)
    }

    pub fn set_fdc(&mut self, config: &DemConfig, event: EventId, fdc: i8) -> DemResult<()> {
        let event_cfg = config.event(event).ok_or(DemError::InvalidEvent(event.0))?;
        let state = self
            .debounce
            .get_mut(event.index())
            .ok_or(DemError::InvalidEvent(event.0))?;
        state
            .set_fdc(&event_cfg.debounce, fdc)
            .map_err(|_| DemError::Rejected("FDC is owned by the debounce algorithm".into()))
    }

    /// Back to FDC 0 and drop queued results
    pub fn reset_debounce(&mut self, event: EventId) {
        if let Some(state) = self.debounce.get_mut(event.index()) {
            state.reset();
        }
        if let Some(queue) = self.queues.get_mut(event.index()) {
            queue.clear();
        }
        self.order.retain(|e| *e != event);
    }

    pub fn set_available(&mut self, event: EventId, available: bool) {
        if let Some(flag) = self.available.get_mut(event.index()) {
            *flag = available;
        }
        if !available {
            self.reset_debounce(event);
        }
    }

    pub fn is_available(&self, event: EventId) -> bool {
        self.available.get(event.index()).copied().unwrap_or(false)
    }

    pub fn set_enable_condition(&mut self, condition: ConditionId, fulfilled: bool) -> DemResult<()> {
        let slot = self
            .enable_conditions
            .get_mut(condition.index())
            .ok_or_else(|| DemError::Rejected(format!("unknown enable condition {}", condition.0)))?;
        *slot = fulfilled;
        Ok(())
    }

    pub fn set_dtc_setting(&mut self, enabled: bool) {
        self.dtc_setting_disabled = !enabled;
    }

    pub fn dtc_setting_enabled(&self) -> bool {
        !self.dtc_setting_disabled
    }
}
