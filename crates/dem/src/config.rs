//! Dem configuration
//!
//! Fully data-driven configuration of events, DTCs, fault memories and
//! feature switches. Loaded from TOML, YAML or JSON; DTC numbers and DIDs
//! accept hex strings ("0x010100") or plain integers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::debounce::DebounceConfig;
use crate::dtc::DtcNumber;
use crate::error::ConfigError;
use crate::memory::data::DataElement;

/// Maximum number of snapshot or extended records per DTC
pub const MAX_RECORDS_PER_DTC: usize = 32;

/// Complete Dem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemConfig {
    /// Behavior switches
    #[serde(default)]
    pub features: Features,

    /// Fault memory capacities
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Operation cycles, referenced by index from events
    #[serde(default = "default_operation_cycles")]
    pub operation_cycles: Vec<OperationCycleConfig>,

    /// Warning indicators (MIL, lamps)
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,

    /// MIL groups sharing trip and pending accounting
    #[serde(default)]
    pub mil_groups: Vec<MilGroupConfig>,

    #[serde(default)]
    pub enable_conditions: Vec<ConditionConfig>,

    #[serde(default)]
    pub storage_conditions: Vec<ConditionConfig>,

    /// DTC table
    #[serde(default)]
    pub dtcs: Vec<DtcConfig>,

    /// Event table; event id N is entry N-1
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

fn default_operation_cycles() -> Vec<OperationCycleConfig> {
    vec![OperationCycleConfig {
        name: "power".to_string(),
        kind: CycleKind::Power,
        auto_start: true,
    }]
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            features: Features::default(),
            memory: MemoryConfig::default(),
            operation_cycles: default_operation_cycles(),
            indicators: Vec::new(),
            mil_groups: Vec::new(),
            enable_conditions: Vec::new(),
            storage_conditions: Vec::new(),
            dtcs: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl DemConfig {
    /// Load configuration from a file, the format is chosen by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Number of configured events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Check all cross references and capacities
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.features.queue_depth == 0 {
            return Err(invalid("features.queue_depth", "must be at least 1"));
        }
        if self.features.nv_writes_per_cycle == 0 {
            return Err(invalid("features.nv_writes_per_cycle", "must be at least 1"));
        }
        if self.events.len() >= u16::MAX as usize {
            return Err(invalid("events", "too many events"));
        }
        if self.operation_cycles.is_empty() {
            return Err(invalid("operation_cycles", "at least one cycle required"));
        }
        if self.memory.primary_size == 0 {
            return Err(invalid("memory.primary_size", "must be at least 1"));
        }

        let mut numbers = std::collections::HashSet::new();
        for (index, dtc) in self.dtcs.iter().enumerate() {
            if dtc.number > DtcNumber::MAX || dtc.number == crate::dtc::dtc_group::ALL {
                return Err(invalid(
                    &format!("dtcs[{}].number", index),
                    "not a valid 24-bit DTC",
                ));
            }
            if !numbers.insert(dtc.number) {
                return Err(ConfigError::DuplicateDtc(dtc.number));
            }
            match dtc.destination {
                MemoryDestination::Primary => {}
                MemoryDestination::Mirror if self.memory.mirror_size > 0 => {}
                MemoryDestination::User(n) if (n as usize) < self.memory.user_sizes.len() => {}
                other => {
                    return Err(ConfigError::DanglingReference {
                        what: "dtc",
                        index,
                        target: "memory",
                        reference: format!("{:?}", other),
                    })
                }
            }
            if dtc.snapshot_records.len() > MAX_RECORDS_PER_DTC
                || dtc.extended_records.len() > MAX_RECORDS_PER_DTC
            {
                return Err(invalid(
                    &format!("dtcs[{}]", index),
                    "too many data records",
                ));
            }
            let mut record_numbers = std::collections::HashSet::new();
            for record in &dtc.snapshot_records {
                if record.number == 0x00 || record.number == 0xFF {
                    return Err(invalid(
                        &format!("dtcs[{}].snapshot_records", index),
                        "record number 0x00 and 0xFF are reserved",
                    ));
                }
                if !record_numbers.insert(record.number) {
                    return Err(invalid(
                        &format!("dtcs[{}].snapshot_records", index),
                        "duplicate record number",
                    ));
                }
            }
            record_numbers.clear();
            for record in &dtc.extended_records {
                if record.number == 0x00 || record.number >= 0xF0 {
                    return Err(invalid(
                        &format!("dtcs[{}].extended_records", index),
                        "record number out of range 0x01..0xEF",
                    ));
                }
                if !record_numbers.insert(record.number) {
                    return Err(invalid(
                        &format!("dtcs[{}].extended_records", index),
                        "duplicate record number",
                    ));
                }
            }
        }

        for (index, event) in self.events.iter().enumerate() {
            if let Some(number) = event.dtc {
                if !numbers.contains(&number) {
                    return Err(dangling("event", index, "dtc", DtcNumber(number).to_string()));
                }
            }
            if event.operation_cycle as usize >= self.operation_cycles.len() {
                return Err(dangling(
                    "event",
                    index,
                    "operation cycle",
                    event.operation_cycle.to_string(),
                ));
            }
            if let Some(indicator) = event.indicator {
                if indicator as usize >= self.indicators.len() {
                    return Err(dangling("event", index, "indicator", indicator.to_string()));
                }
            }
            if let Some(group) = event.mil_group {
                if group as usize >= self.mil_groups.len() {
                    return Err(dangling("event", index, "mil group", group.to_string()));
                }
            }
            for condition in &event.enable_conditions {
                if *condition as usize >= self.enable_conditions.len() {
                    return Err(dangling(
                        "event",
                        index,
                        "enable condition",
                        condition.to_string(),
                    ));
                }
            }
            for condition in &event.storage_conditions {
                if *condition as usize >= self.storage_conditions.len() {
                    return Err(dangling(
                        "event",
                        index,
                        "storage condition",
                        condition.to_string(),
                    ));
                }
            }
            if event.priority == 0 {
                return Err(invalid(
                    &format!("events[{}].priority", index),
                    "priority 1 is the highest, 0 is not allowed",
                ));
            }
            event.debounce.validate(index)?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn dangling(what: &'static str, index: usize, target: &'static str, reference: String) -> ConfigError {
    ConfigError::DanglingReference {
        what,
        index,
        target,
        reference,
    }
}

// =============================================================================
// Feature switches
// =============================================================================

/// How the status of a DTC with several events is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combination {
    /// Group status persisted and updated on every member change; one shared entry
    #[default]
    OnStorage,
    /// Group status folded from member statuses on every read
    OnRetrieval,
}

/// Eviction strategy when a fault memory is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementStrategy {
    /// Only aged entries may be replaced
    None,
    /// Aged entries, then lower-priority entries
    #[default]
    Priority,
    /// Like `Priority`, additionally passive entries of equal priority
    Full,
}

/// When an event first requires a fault memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTrigger {
    #[default]
    TestFailed,
    Pending,
    Confirmed,
}

/// Status byte written by a clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAfterClear {
    /// 0x00
    #[default]
    AllClear,
    /// 0x50 (TNCSLC | TNCTOC)
    NotCompleted,
}

/// Behavior switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub combination: Combination,

    #[serde(default)]
    pub displacement: DisplacementStrategy,

    #[serde(default)]
    pub storage_trigger: StorageTrigger,

    /// Re-raise storage effects while a failed event still has no entry
    #[serde(default)]
    pub retry_storage: bool,

    /// Set TFSLC only once the event owns a fault memory entry
    #[serde(default)]
    pub tfslc_stored_only: bool,

    /// Start aging on a passed result instead of at cycle end
    #[serde(default)]
    pub aging_start_on_passed: bool,

    /// Aging starts only after the warning indicator has healed
    #[serde(default = "default_true")]
    pub aging_requires_healing: bool,

    /// Keep the fault memory entry of an aged event
    #[serde(default)]
    pub aging_retain_memory_entry: bool,

    /// Clear TF at operation cycle start
    #[serde(default)]
    pub reset_tf_on_cycle_start: bool,

    /// Move an entry to the newest chronology position on each new occurrence
    #[serde(default)]
    pub chronology_refresh_on_occurrence: bool,

    /// Mask CDTC/WIR of OBD DTCs until the driving cycle is qualified
    #[serde(default)]
    pub dcy_qualification: bool,

    #[serde(default)]
    pub status_after_clear: StatusAfterClear,

    /// Depth of the per-event report queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// NV blocks committed per main function
    #[serde(default = "default_nv_writes")]
    pub nv_writes_per_cycle: usize,

    /// Status bits supported by this ECU
    #[serde(
        default = "default_availability_mask",
        deserialize_with = "deserialize_hex_u8"
    )]
    pub status_availability_mask: u8,
}

fn default_true() -> bool {
    true
}

fn default_queue_depth() -> usize {
    4
}

fn default_nv_writes() -> usize {
    4
}

fn default_availability_mask() -> u8 {
    0xFF
}

impl Default for Features {
    fn default() -> Self {
        Self {
            combination: Combination::default(),
            displacement: DisplacementStrategy::default(),
            storage_trigger: StorageTrigger::default(),
            retry_storage: false,
            tfslc_stored_only: false,
            aging_start_on_passed: false,
            aging_requires_healing: true,
            aging_retain_memory_entry: false,
            reset_tf_on_cycle_start: false,
            chronology_refresh_on_occurrence: false,
            dcy_qualification: false,
            status_after_clear: StatusAfterClear::default(),
            queue_depth: default_queue_depth(),
            nv_writes_per_cycle: default_nv_writes(),
            status_availability_mask: default_availability_mask(),
        }
    }
}

// =============================================================================
// Memories and cycles
// =============================================================================

/// Fault memory capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_primary_size")]
    pub primary_size: u16,

    #[serde(default)]
    pub mirror_size: u16,

    /// One entry per user-defined memory
    #[serde(default)]
    pub user_sizes: Vec<u16>,

    /// OBD permanent memory slots
    #[serde(default)]
    pub permanent_size: u16,

    /// Time-series memory slots
    #[serde(default)]
    pub time_series_size: u16,

    /// Samples kept before the failure
    #[serde(default)]
    pub past_samples: u8,

    /// Samples recorded after the failure
    #[serde(default)]
    pub future_samples: u8,
}

fn default_primary_size() -> u16 {
    8
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            primary_size: default_primary_size(),
            mirror_size: 0,
            user_sizes: Vec::new(),
            permanent_size: 0,
            time_series_size: 0,
            past_samples: 0,
            future_samples: 0,
        }
    }
}

/// Fault memory a DTC is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDestination {
    #[default]
    Primary,
    Mirror,
    User(u8),
}

/// Operation cycle type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    #[default]
    Power,
    Ignition,
    ObdDcy,
    Warmup,
}

/// Operation cycle definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCycleConfig {
    pub name: String,

    #[serde(default)]
    pub kind: CycleKind,

    /// Start the cycle during init
    #[serde(default)]
    pub auto_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilGroupConfig {
    pub name: String,
}

/// Enable or storage condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub initially_fulfilled: bool,
}

// =============================================================================
// DTC Definitions
// =============================================================================

/// When a data record is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTrigger {
    TestFailed,
    TestFailedThisCycle,
    Pending,
    #[default]
    Confirmed,
    FdcThreshold,
}

/// One DID inside a snapshot record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidConfig {
    #[serde(deserialize_with = "deserialize_hex_u16")]
    pub did: u16,

    pub elements: Vec<DataElement>,
}

impl DidConfig {
    pub fn size(&self) -> usize {
        self.elements.iter().map(DataElement::size).sum()
    }
}

/// Snapshot (freeze frame) record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecordConfig {
    #[serde(deserialize_with = "deserialize_hex_u8")]
    pub number: u8,

    #[serde(default)]
    pub trigger: RecordTrigger,

    /// Overwrite on later triggers
    #[serde(default)]
    pub update: bool,

    pub dids: Vec<DidConfig>,
}

impl SnapshotRecordConfig {
    pub fn size(&self) -> usize {
        self.dids.iter().map(DidConfig::size).sum()
    }
}

/// Extended data record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedRecordConfig {
    #[serde(deserialize_with = "deserialize_hex_u8")]
    pub number: u8,

    #[serde(default)]
    pub trigger: RecordTrigger,

    #[serde(default)]
    pub update: bool,

    pub elements: Vec<DataElement>,
}

impl ExtendedRecordConfig {
    pub fn size(&self) -> usize {
        self.elements.iter().map(DataElement::size).sum()
    }
}

/// DTC definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtcConfig {
    /// 24-bit UDS DTC - hex string "0x010100" or integer
    #[serde(deserialize_with = "deserialize_dtc_number")]
    pub number: u32,

    #[serde(default, deserialize_with = "deserialize_hex_u8")]
    pub severity: u8,

    #[serde(default)]
    pub functional_unit: u8,

    #[serde(default)]
    pub destination: MemoryDestination,

    /// Subject to DCY qualification and permanent memory
    #[serde(default)]
    pub obd_relevant: bool,

    #[serde(default)]
    pub snapshot_records: Vec<SnapshotRecordConfig>,

    #[serde(default)]
    pub extended_records: Vec<ExtendedRecordConfig>,

    /// DIDs sampled into the time-series memory (empty = disabled)
    #[serde(default)]
    pub time_series: Vec<DidConfig>,

    #[serde(default = "default_true")]
    pub clear_allowed: bool,

    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Event Definitions
// =============================================================================

/// Event definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,

    /// DTC number of the DTC this event reports to
    #[serde(default, deserialize_with = "deserialize_optional_dtc_number")]
    pub dtc: Option<u32>,

    #[serde(default)]
    pub operation_cycle: u8,

    /// Failed cycles needed for confirmation (0 = first failure confirms)
    #[serde(default)]
    pub trip_target: u8,

    /// Passed cycles needed to clear WIR (0 = first passed result)
    #[serde(default)]
    pub healing_target: u8,

    /// Passed cycles needed to age the entry out (0 = immediate)
    #[serde(default = "default_aging_target")]
    pub aging_target: u8,

    #[serde(default = "default_true")]
    pub aging_allowed: bool,

    /// 1 is the highest priority
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub indicator: Option<u8>,

    #[serde(default)]
    pub mil_group: Option<u16>,

    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default = "default_true")]
    pub available_by_default: bool,

    /// Ignore results while the event is failed and confirmed
    #[serde(default)]
    pub latch_test_failed: bool,

    #[serde(default)]
    pub requires_similar_conditions: bool,

    #[serde(default)]
    pub enable_conditions: Vec<u8>,

    #[serde(default)]
    pub storage_conditions: Vec<u8>,
}

fn default_aging_target() -> u8 {
    40
}

fn default_priority() -> u8 {
    1
}

impl EventConfig {
    /// Minimal event definition with defaults for everything but the DTC
    pub fn new(name: impl Into<String>, dtc: Option<u32>) -> Self {
        Self {
            name: name.into(),
            dtc,
            operation_cycle: 0,
            trip_target: 0,
            healing_target: 0,
            aging_target: default_aging_target(),
            aging_allowed: true,
            priority: default_priority(),
            indicator: None,
            mil_group: None,
            debounce: DebounceConfig::default(),
            available_by_default: true,
            latch_test_failed: false,
            requires_similar_conditions: false,
            enable_conditions: Vec::new(),
            storage_conditions: Vec::new(),
        }
    }
}

impl DtcConfig {
    /// DTC in primary memory without data records
    pub fn new(number: u32) -> Self {
        Self {
            number,
            severity: 0,
            functional_unit: 0,
            destination: MemoryDestination::Primary,
            obd_relevant: false,
            snapshot_records: Vec::new(),
            extended_records: Vec::new(),
            time_series: Vec::new(),
            clear_allowed: true,
            description: None,
        }
    }
}

// =============================================================================
// Hex Parsing Helpers
// =============================================================================

fn strip_hex_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse hex string to bytes (supports "DEADBEEF" or "0xDEADBEEF")
pub(crate) fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let s = strip_hex_prefix(s);
    if s.is_empty() {
        return Some(Vec::new());
    }
    hex::decode(s).ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Hex(String),
    Int(u64),
}

fn hex_or_int<E: serde::de::Error>(value: HexOrInt, max: u64) -> Result<u64, E> {
    let n = match value {
        HexOrInt::Int(n) => n,
        HexOrInt::Hex(s) => u64::from_str_radix(strip_hex_prefix(&s), 16)
            .map_err(|e| E::custom(format!("invalid hex value '{}': {}", s, e)))?,
    };
    if n > max {
        return Err(E::custom(format!("value 0x{:X} exceeds 0x{:X}", n, max)));
    }
    Ok(n)
}

/// Deserialize a hex u8 (supports "0x09" or 9)
pub(crate) fn deserialize_hex_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = hex_or_int(HexOrInt::deserialize(deserializer)?, u8::MAX as u64)?;
    Ok(n as u8)
}

/// Deserialize a hex u16 (supports "0xF190" or 61840)
pub(crate) fn deserialize_hex_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = hex_or_int(HexOrInt::deserialize(deserializer)?, u16::MAX as u64)?;
    Ok(n as u16)
}

/// Deserialize a 24-bit DTC number (supports "0x010100", "010100" or 65792)
fn deserialize_dtc_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = hex_or_int(HexOrInt::deserialize(deserializer)?, 0xFFFFFF)?;
    Ok(n as u32)
}

fn deserialize_optional_dtc_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<HexOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) => Ok(Some(hex_or_int(value, 0xFFFFFF)? as u32)),
    }
}

/// Deserialize hex bytes (supports "0A0B" or [10, 11])
pub(crate) fn deserialize_hex_bytes_vec<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexBytes {
        Hex(String),
        Array(Vec<u8>),
    }

    match HexBytes::deserialize(deserializer)? {
        HexBytes::Array(arr) => Ok(arr),
        HexBytes::Hex(s) => parse_hex_bytes(&s).ok_or_else(|| D::Error::custom("Invalid hex string")),
    }
}
