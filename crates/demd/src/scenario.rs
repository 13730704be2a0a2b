//! Monitor scenarios replayed by the daemon
//!
//! A scenario is a list of steps, each executed before the main function
//! of its tick:
//!
//! ```toml
//! [[steps]]
//! tick = 10
//! action = "report"
//! event = "coolant_temp_high"
//! status = "failed"
//!
//! [[steps]]
//! tick = 50
//! action = "cycle"
//! cycle = "power"
//! start = true
//!
//! [[steps]]
//! tick = 60
//! action = "clear"
//! dtc = "0xFFFFFF"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use dem::{
    ClearProgress, ClientId, CycleId, Dem, DemConfig, DtcNumber, DtcOrigin, EventId, MonitorStatus,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Client used for clear requests issued by the scenario
const CLIENT: ClientId = ClientId(0);
const ALL_DTCS: u32 = 0xFF_FFFF;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub tick: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Monitor report; `event` is the configured name or the numeric id
    Report { event: String, status: MonitorStatus },
    /// Start (restart) or end an operation cycle, by name or index
    Cycle {
        cycle: String,
        #[serde(default = "default_start")]
        start: bool,
    },
    /// Clear a DTC, a group or (default) everything
    Clear {
        #[serde(default)]
        dtc: Option<String>,
        #[serde(default = "default_origin")]
        origin: DtcOrigin,
    },
    /// Driving cycle qualified
    Qualify,
}

fn default_start() -> bool {
    true
}

fn default_origin() -> DtcOrigin {
    DtcOrigin::Primary
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Report(EventId, MonitorStatus),
    Cycle(CycleId, bool),
    Clear(u32, DtcOrigin),
    Qualify,
}

/// Scenario with names resolved against a configuration
#[derive(Debug)]
pub struct ScenarioPlayer {
    commands: Vec<(u64, Command)>,
    next: usize,
    clearing: Option<(u32, DtcOrigin)>,
    announced: bool,
}

fn resolve_event(config: &DemConfig, name: &str) -> Result<EventId> {
    if let Some(index) = config.events.iter().position(|e| e.name == name) {
        return Ok(EventId(index as u16 + 1));
    }
    match name.parse::<u16>() {
        Ok(id) if id >= 1 && usize::from(id) <= config.events.len() => Ok(EventId(id)),
        _ => bail!("unknown event '{}'", name),
    }
}

fn resolve_cycle(config: &DemConfig, name: &str) -> Result<CycleId> {
    if let Some(index) = config.operation_cycles.iter().position(|c| c.name == name) {
        return Ok(CycleId(index as u8));
    }
    match name.parse::<u8>() {
        Ok(id) if usize::from(id) < config.operation_cycles.len() => Ok(CycleId(id)),
        _ => bail!("unknown operation cycle '{}'", name),
    }
}

fn parse_dtc(dtc: Option<&str>) -> Result<u32> {
    match dtc {
        None => Ok(ALL_DTCS),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(ALL_DTCS),
        Some(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
            let number = u32::from_str_radix(digits, 16).with_context(|| format!("invalid DTC '{}'", s))?;
            if number > ALL_DTCS {
                bail!("DTC '{}' exceeds 24 bits", s);
            }
            Ok(number)
        }
    }
}

impl ScenarioPlayer {
    pub fn new(scenario: &Scenario, config: &DemConfig) -> Result<Self> {
        let mut commands = scenario
            .steps
            .iter()
            .map(|step| -> Result<(u64, Command)> {
                let command = match &step.action {
                    Action::Report { event, status } => Command::Report(resolve_event(config, event)?, *status),
                    Action::Cycle { cycle, start } => Command::Cycle(resolve_cycle(config, cycle)?, *start),
                    Action::Clear { dtc, origin } => Command::Clear(parse_dtc(dtc.as_deref())?, *origin),
                    Action::Qualify => Command::Qualify,
                };
                Ok((step.tick, command))
            })
            .collect::<Result<Vec<_>>>()
            .context("failed to resolve scenario")?;
        commands.sort_by_key(|(tick, _)| *tick);
        if !commands.is_empty() {
            info!(steps = commands.len(), "Scenario loaded");
        }
        Ok(Self {
            commands,
            next: 0,
            clearing: None,
            announced: false,
        })
    }

    /// All steps executed and no clear outstanding
    pub fn finished(&self) -> bool {
        self.next == self.commands.len() && self.clearing.is_none()
    }

    /// Execute the steps due at `tick`
    pub fn run_tick(&mut self, dem: &Dem, tick: u64) {
        if let Some((number, origin)) = self.clearing {
            self.poll_clear(dem, number, origin);
        }
        while let Some(&(at, command)) = self.commands.get(self.next) {
            if at > tick {
                break;
            }
            self.next += 1;
            self.execute(dem, tick, command);
        }
        if !self.announced && !self.commands.is_empty() && self.finished() {
            self.announced = true;
            info!(tick, "Scenario finished");
        }
    }

    fn execute(&mut self, dem: &Dem, tick: u64, command: Command) {
        debug!(tick, ?command, "Scenario step");
        let result = match command {
            Command::Report(event, status) => dem.set_event_status(event, status),
            Command::Cycle(cycle, start) => dem.set_operation_cycle_state(cycle, start),
            Command::Qualify => dem.set_dcy_qualified(),
            Command::Clear(number, origin) => {
                if self.clearing.is_some() {
                    warn!(tick, "Clear still running, step skipped");
                    return;
                }
                self.poll_clear(dem, number, origin);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(tick, ?command, error = %e, "Scenario step rejected");
        }
    }

    fn poll_clear(&mut self, dem: &Dem, number: u32, origin: DtcOrigin) {
        self.clearing = match dem.clear_dtc(CLIENT, number, origin) {
            Ok(ClearProgress::Pending) => Some((number, origin)),
            Ok(ClearProgress::Completed) => {
                info!(dtc = %DtcNumber(number), %origin, "Scenario clear completed");
                None
            }
            Err(e) => {
                warn!(dtc = %DtcNumber(number), error = %e, "Scenario clear failed");
                None
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dem::config::{DtcConfig, EventConfig};
    use dem::{MemoryNvStorage, NoDataProvider};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const SAMPLE: &str = r#"
[[steps]]
tick = 3
action = "clear"

[[steps]]
tick = 0
action = "report"
event = "coolant"
status = "failed"

[[steps]]
tick = 1
action = "cycle"
cycle = "power"

[[steps]]
tick = 2
action = "qualify"
"#;

    fn config() -> DemConfig {
        let mut config = DemConfig::default();
        config.dtcs.push(DtcConfig::new(0x010100));
        config.events.push(EventConfig::new("coolant", Some(0x010100)));
        config.events.push(EventConfig::new("voltage", None));
        config
    }

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_toml_str(SAMPLE).unwrap();
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(
            scenario.steps[0].action,
            Action::Clear {
                dtc: None,
                origin: DtcOrigin::Primary
            }
        );
        assert_eq!(
            scenario.steps[1].action,
            Action::Report {
                event: "coolant".to_string(),
                status: MonitorStatus::Failed
            }
        );
        assert_eq!(
            scenario.steps[2].action,
            Action::Cycle {
                cycle: "power".to_string(),
                start: true
            }
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Scenario::load(&path).unwrap().steps.len(), 4);

        let missing = Scenario::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.to_string().starts_with("failed to read scenario"));
    }

    #[test]
    fn test_shipped_samples_resolve() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config = DemConfig::load(dir.join("demd.toml")).unwrap();
        let scenario = Scenario::load(dir.join("scenario.toml")).unwrap();
        let player = ScenarioPlayer::new(&scenario, &config).unwrap();
        assert!(!player.finished());
    }

    #[test]
    fn test_resolve_names_and_ids() {
        let config = config();
        assert_eq!(resolve_event(&config, "voltage").unwrap(), EventId(2));
        assert_eq!(resolve_event(&config, "1").unwrap(), EventId(1));
        assert!(resolve_event(&config, "3").is_err());
        assert!(resolve_event(&config, "oil").is_err());
        assert_eq!(resolve_cycle(&config, "power").unwrap(), CycleId(0));
        assert!(resolve_cycle(&config, "ignition").is_err());
    }

    #[test]
    fn test_parse_dtc() {
        assert_eq!(parse_dtc(None).unwrap(), ALL_DTCS);
        assert_eq!(parse_dtc(Some("all")).unwrap(), ALL_DTCS);
        assert_eq!(parse_dtc(Some("0x010100")).unwrap(), 0x010100);
        assert_eq!(parse_dtc(Some("C12345")).unwrap(), 0xC12345);
        assert!(parse_dtc(Some("0x1000000")).is_err());
        assert!(parse_dtc(Some("zz")).is_err());
    }

    #[test]
    fn test_unknown_event_rejected() {
        let scenario = Scenario::from_toml_str(
            r#"
[[steps]]
tick = 0
action = "report"
event = "oil"
status = "failed"
"#,
        )
        .unwrap();
        assert!(ScenarioPlayer::new(&scenario, &config()).is_err());
    }

    #[test]
    fn test_replay_against_dem() {
        let config = config();
        let scenario = Scenario::from_toml_str(SAMPLE).unwrap();
        let mut player = ScenarioPlayer::new(&scenario, &config).unwrap();
        let dem = Dem::new(config, Arc::new(MemoryNvStorage::new()), Arc::new(NoDataProvider)).unwrap();
        dem.init().unwrap();

        player.run_tick(&dem, 0);
        dem.main_function();
        assert!(dem.get_event_failed(EventId(1)).unwrap());

        for tick in 1..20 {
            player.run_tick(&dem, tick);
            dem.main_function();
        }
        assert!(player.finished());
        assert!(!dem.get_event_failed(EventId(1)).unwrap());
        assert_eq!(dem.get_number_of_event_memory_entries(DtcOrigin::Primary).unwrap(), 0);
    }
}
