//! Event debouncing
//!
//! Monitors report pre-qualified results (`PreFailed`/`PrePassed`) or
//! qualified results directly. The configured algorithm turns those into
//! qualified `Failed`/`Passed` results and maintains the fault detection
//! counter (FDC, -128..=127).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Monitor report passed to `set_event_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Passed,
    Failed,
    PrePassed,
    PreFailed,
    /// Monitor-internal debouncing reached the storage threshold
    FdcThresholdReached,
}

/// Debounced outcome forwarded to the event status engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    Passed,
    Failed,
    FdcThreshold,
}

/// Qualification state of the debounce algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualified {
    Passed,
    Failed,
}

/// Debounce algorithm of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum DebounceConfig {
    CounterBased(CounterBasedConfig),
    TimeBased(TimeBasedConfig),
    MonitorInternal,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig::CounterBased(CounterBasedConfig::default())
    }
}

impl DebounceConfig {
    pub(crate) fn validate(&self, event_index: usize) -> Result<(), ConfigError> {
        let reason = match self {
            DebounceConfig::CounterBased(c) => {
                if c.failed_threshold <= 0 || c.passed_threshold >= 0 {
                    Some("failed threshold must be > 0 and passed threshold < 0")
                } else if c.increment_step <= 0 || c.decrement_step <= 0 {
                    Some("steps must be positive")
                } else {
                    None
                }
            }
            DebounceConfig::TimeBased(t) => {
                if t.failed_ticks == 0 || t.passed_ticks == 0 {
                    Some("debounce times must be at least one tick")
                } else {
                    None
                }
            }
            DebounceConfig::MonitorInternal => None,
        };
        match reason {
            Some(reason) => Err(ConfigError::InvalidValue {
                field: format!("events[{}].debounce", event_index),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Counter-based debouncing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterBasedConfig {
    #[serde(default = "default_step")]
    pub increment_step: i16,
    #[serde(default = "default_step")]
    pub decrement_step: i16,
    #[serde(default = "default_failed_threshold")]
    pub failed_threshold: i16,
    #[serde(default = "default_passed_threshold")]
    pub passed_threshold: i16,
    /// On PrePassed with a positive counter, jump to `jump_down_value` first
    #[serde(default)]
    pub jump_down: bool,
    #[serde(default)]
    pub jump_down_value: i16,
    /// On PreFailed with a negative counter, jump to `jump_up_value` first
    #[serde(default)]
    pub jump_up: bool,
    #[serde(default)]
    pub jump_up_value: i16,
    /// Counter value at which the FDC threshold is reached
    #[serde(default)]
    pub storage_threshold: Option<i16>,
}

fn default_step() -> i16 {
    32
}

fn default_failed_threshold() -> i16 {
    127
}

fn default_passed_threshold() -> i16 {
    -128
}

impl Default for CounterBasedConfig {
    fn default() -> Self {
        Self {
            increment_step: default_step(),
            decrement_step: default_step(),
            failed_threshold: default_failed_threshold(),
            passed_threshold: default_passed_threshold(),
            jump_down: false,
            jump_down_value: 0,
            jump_up: false,
            jump_up_value: 0,
            storage_threshold: None,
        }
    }
}

/// Time-based debouncing, times in main function ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBasedConfig {
    #[serde(default = "default_ticks")]
    pub failed_ticks: u32,
    #[serde(default = "default_ticks")]
    pub passed_ticks: u32,
    /// Elapsed failing ticks at which the FDC threshold is reached
    #[serde(default)]
    pub storage_ticks: Option<u32>,
}

fn default_ticks() -> u32 {
    10
}

impl Default for TimeBasedConfig {
    fn default() -> Self {
        Self {
            failed_ticks: default_ticks(),
            passed_ticks: default_ticks(),
            storage_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Timer {
    #[default]
    Idle,
    Failing(u32),
    Passing(u32),
}

/// Outcome of one debounce step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebounceStep {
    pub qualified: Option<Qualified>,
    pub threshold_reached: bool,
}

/// Report not supported by the configured algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceRejected;

/// Per-event debounce state
#[derive(Debug, Clone, Default)]
pub struct DebounceState {
    counter: i16,
    timer: Timer,
    fdc: i8,
    qualified: Option<Qualified>,
    threshold_reached: bool,
}

impl DebounceState {
    pub fn fdc(&self) -> i8 {
        self.fdc
    }

    pub fn qualified(&self) -> Option<Qualified> {
        self.qualified
    }

    /// Back to the initial (unqualified, FDC 0) state
    pub fn reset(&mut self) {
        *self = DebounceState::default();
    }

    /// Process a monitor report
    pub fn report(
        &mut self,
        config: &DebounceConfig,
        status: MonitorStatus,
    ) -> Result<DebounceStep, DebounceRejected> {
        match config {
            DebounceConfig::CounterBased(c) => self.report_counter(c, status),
            DebounceConfig::TimeBased(t) => self.report_time(t, status),
            DebounceConfig::MonitorInternal => self.report_internal(status),
        }
    }

    /// Advance time-based debouncing by one main function tick
    pub fn tick(&mut self, config: &DebounceConfig) -> DebounceStep {
        let DebounceConfig::TimeBased(t) = config else {
            return DebounceStep::default();
        };
        let mut step = DebounceStep::default();
        match self.timer {
            Timer::Idle => {}
            Timer::Failing(elapsed) => {
                let elapsed = elapsed.saturating_add(1);
                if let Some(storage) = t.storage_ticks {
                    if elapsed >= storage && !self.threshold_reached {
                        self.threshold_reached = true;
                        step.threshold_reached = true;
                    }
                }
                if elapsed >= t.failed_ticks {
                    self.timer = Timer::Idle;
                    step.qualified = self.qualify(Qualified::Failed);
                } else {
                    self.timer = Timer::Failing(elapsed);
                    self.fdc = scale_positive(elapsed as i64, t.failed_ticks as i64);
                }
            }
            Timer::Passing(elapsed) => {
                let elapsed = elapsed.saturating_add(1);
                if elapsed >= t.passed_ticks {
                    self.timer = Timer::Idle;
                    step.qualified = self.qualify(Qualified::Passed);
                } else {
                    self.timer = Timer::Passing(elapsed);
                    self.fdc = scale_negative(elapsed as i64, t.passed_ticks as i64);
                }
            }
        }
        step
    }

    /// Set the FDC of a monitor-internal debounced event
    pub fn set_fdc(&mut self, config: &DebounceConfig, fdc: i8) -> Result<(), DebounceRejected> {
        match config {
            DebounceConfig::MonitorInternal => {
                self.fdc = fdc;
                Ok(())
            }
            _ => Err(DebounceRejected),
        }
    }

    fn qualify(&mut self, result: Qualified) -> Option<Qualified> {
        self.fdc = match result {
            Qualified::Failed => 127,
            Qualified::Passed => -128,
        };
        if self.qualified == Some(result) {
            return None;
        }
        self.qualified = Some(result);
        Some(result)
    }

    /// Qualified results reported directly are always forwarded
    fn force(&mut self, result: Qualified) -> Option<Qualified> {
        self.qualify(result);
        Some(result)
    }

    fn report_counter(
        &mut self,
        c: &CounterBasedConfig,
        status: MonitorStatus,
    ) -> Result<DebounceStep, DebounceRejected> {
        let mut step = DebounceStep::default();
        match status {
            MonitorStatus::PreFailed => {
                if c.jump_up && self.counter < c.jump_up_value {
                    self.counter = c.jump_up_value;
                }
                self.counter = self
                    .counter
                    .saturating_add(c.increment_step)
                    .min(c.failed_threshold);
            }
            MonitorStatus::PrePassed => {
                if c.jump_down && self.counter > c.jump_down_value {
                    self.counter = c.jump_down_value;
                }
                self.counter = self
                    .counter
                    .saturating_sub(c.decrement_step)
                    .max(c.passed_threshold);
            }
            MonitorStatus::Failed => {
                self.counter = c.failed_threshold;
            }
            MonitorStatus::Passed => {
                self.counter = c.passed_threshold;
            }
            MonitorStatus::FdcThresholdReached => return Err(DebounceRejected),
        }

        if let Some(threshold) = c.storage_threshold {
            if self.counter >= threshold && !self.threshold_reached {
                self.threshold_reached = true;
                step.threshold_reached = true;
            }
        }

        let direct = matches!(status, MonitorStatus::Failed | MonitorStatus::Passed);
        if self.counter >= c.failed_threshold {
            step.qualified = if direct {
                self.force(Qualified::Failed)
            } else {
                self.qualify(Qualified::Failed)
            };
        } else if self.counter <= c.passed_threshold {
            step.qualified = if direct {
                self.force(Qualified::Passed)
            } else {
                self.qualify(Qualified::Passed)
            };
        } else if self.counter >= 0 {
            self.fdc = scale_positive(self.counter as i64, c.failed_threshold as i64);
        } else {
            self.fdc = scale_negative(-(self.counter as i64), -(c.passed_threshold as i64));
        }
        Ok(step)
    }

    fn report_time(
        &mut self,
        t: &TimeBasedConfig,
        status: MonitorStatus,
    ) -> Result<DebounceStep, DebounceRejected> {
        let mut step = DebounceStep::default();
        match status {
            MonitorStatus::PreFailed => {
                if !matches!(self.timer, Timer::Failing(_)) && self.qualified != Some(Qualified::Failed) {
                    self.timer = Timer::Failing(0);
                    self.fdc = 0;
                }
            }
            MonitorStatus::PrePassed => {
                if !matches!(self.timer, Timer::Passing(_)) && self.qualified != Some(Qualified::Passed) {
                    self.timer = Timer::Passing(0);
                    self.fdc = 0;
                }
            }
            MonitorStatus::Failed => {
                self.timer = Timer::Idle;
                if t.storage_ticks.is_some() && !self.threshold_reached {
                    self.threshold_reached = true;
                    step.threshold_reached = true;
                }
                step.qualified = self.force(Qualified::Failed);
            }
            MonitorStatus::Passed => {
                self.timer = Timer::Idle;
                step.qualified = self.force(Qualified::Passed);
            }
            MonitorStatus::FdcThresholdReached => return Err(DebounceRejected),
        }
        Ok(step)
    }

    fn report_internal(&mut self, status: MonitorStatus) -> Result<DebounceStep, DebounceRejected> {
        let mut step = DebounceStep::default();
        match status {
            MonitorStatus::Failed => step.qualified = self.force(Qualified::Failed),
            MonitorStatus::Passed => step.qualified = self.force(Qualified::Passed),
            MonitorStatus::FdcThresholdReached => {
                if !self.threshold_reached {
                    self.threshold_reached = true;
                    step.threshold_reached = true;
                }
            }
            MonitorStatus::PreFailed | MonitorStatus::PrePassed => return Err(DebounceRejected),
        }
        Ok(step)
    }
}

fn scale_positive(value: i64, max: i64) -> i8 {
    (value * 127 / max.max(1)).clamp(0, 127) as i8
}

fn scale_negative(value: i64, max: i64) -> i8 {
    (-(value * 128 / max.max(1))).clamp(-128, 0) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn counter(inc: i16, dec: i16, failed: i16, passed: i16) -> DebounceConfig {
        DebounceConfig::CounterBased(CounterBasedConfig {
            increment_step: inc,
            decrement_step: dec,
            failed_threshold: failed,
            passed_threshold: passed,
            ..CounterBasedConfig::default()
        })
    }

    #[test]
    fn test_counter_qualifies_after_steps() {
        let cfg = counter(10, 10, 30, -30);
        let mut state = DebounceState::default();

        assert_eq!(state.report(&cfg, MonitorStatus::PreFailed).unwrap().qualified, None);
        assert_eq!(state.fdc(), 42);
        assert_eq!(state.report(&cfg, MonitorStatus::PreFailed).unwrap().qualified, None);
        let step = state.report(&cfg, MonitorStatus::PreFailed).unwrap();
        assert_eq!(step.qualified, Some(Qualified::Failed));
        assert_eq!(state.fdc(), 127);

        // Staying at the threshold does not qualify again
        let step = state.report(&cfg, MonitorStatus::PreFailed).unwrap();
        assert_eq!(step.qualified, None);
    }

    #[test]
    fn test_counter_direct_results_always_forwarded() {
        let cfg = counter(10, 10, 30, -30);
        let mut state = DebounceState::default();
        assert_eq!(
            state.report(&cfg, MonitorStatus::Failed).unwrap().qualified,
            Some(Qualified::Failed)
        );
        assert_eq!(
            state.report(&cfg, MonitorStatus::Failed).unwrap().qualified,
            Some(Qualified::Failed)
        );
        assert_eq!(
            state.report(&cfg, MonitorStatus::Passed).unwrap().qualified,
            Some(Qualified::Passed)
        );
        assert_eq!(state.fdc(), -128);
    }

    #[test]
    fn test_counter_jump_down() {
        let cfg = DebounceConfig::CounterBased(CounterBasedConfig {
            increment_step: 10,
            decrement_step: 5,
            failed_threshold: 30,
            passed_threshold: -30,
            jump_down: true,
            jump_down_value: 0,
            ..CounterBasedConfig::default()
        });
        let mut state = DebounceState::default();
        state.report(&cfg, MonitorStatus::PreFailed).unwrap();
        state.report(&cfg, MonitorStatus::PreFailed).unwrap();
        state.report(&cfg, MonitorStatus::PrePassed).unwrap();
        // 20 -> jump to 0 -> -5
        assert_eq!(state.fdc(), -21);
    }

    #[test]
    fn test_counter_storage_threshold() {
        let cfg = DebounceConfig::CounterBased(CounterBasedConfig {
            increment_step: 10,
            failed_threshold: 30,
            storage_threshold: Some(20),
            ..CounterBasedConfig::default()
        });
        let mut state = DebounceState::default();
        assert!(!state.report(&cfg, MonitorStatus::PreFailed).unwrap().threshold_reached);
        assert!(state.report(&cfg, MonitorStatus::PreFailed).unwrap().threshold_reached);
        assert!(!state.report(&cfg, MonitorStatus::PreFailed).unwrap().threshold_reached);
    }

    #[test]
    fn test_time_based_qualifies_on_tick() {
        let cfg = DebounceConfig::TimeBased(TimeBasedConfig {
            failed_ticks: 3,
            passed_ticks: 2,
            storage_ticks: None,
        });
        let mut state = DebounceState::default();
        state.report(&cfg, MonitorStatus::PreFailed).unwrap();
        assert_eq!(state.tick(&cfg).qualified, None);
        assert_eq!(state.tick(&cfg).qualified, None);
        assert_eq!(state.tick(&cfg).qualified, Some(Qualified::Failed));
        assert_eq!(state.tick(&cfg).qualified, None);

        state.report(&cfg, MonitorStatus::PrePassed).unwrap();
        assert_eq!(state.tick(&cfg).qualified, None);
        assert!(state.fdc() < 0);
        assert_eq!(state.tick(&cfg).qualified, Some(Qualified::Passed));
    }

    #[rstest]
    #[case(MonitorStatus::PreFailed)]
    #[case(MonitorStatus::PrePassed)]
    fn test_monitor_internal_rejects_pre_states(#[case] status: MonitorStatus) {
        let mut state = DebounceState::default();
        assert_eq!(
            state.report(&DebounceConfig::MonitorInternal, status),
            Err(DebounceRejected)
        );
    }

    #[test]
    fn test_monitor_internal_fdc() {
        let cfg = DebounceConfig::MonitorInternal;
        let mut state = DebounceState::default();
        state.set_fdc(&cfg, 55).unwrap();
        assert_eq!(state.fdc(), 55);
        assert!(state.set_fdc(&DebounceConfig::default(), 1).is_err());
        assert!(state.report(&cfg, MonitorStatus::FdcThresholdReached).unwrap().threshold_reached);
    }

    #[test]
    fn test_reset() {
        let cfg = counter(10, 10, 30, -30);
        let mut state = DebounceState::default();
        state.report(&cfg, MonitorStatus::Failed).unwrap();
        state.reset();
        assert_eq!(state.fdc(), 0);
        assert_eq!(state.qualified(), None);
    }
}
