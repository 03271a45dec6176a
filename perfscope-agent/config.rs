use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use perfscope_raw::{ConfigLayout, CounterWidth};

use crate::counters::device::DeviceClass;
use crate::counters::event::{Event, DEFAULT_DEVICE};
use crate::counters::events::{cycle_leader, reserved_set_events};
use crate::counters::interconnect::{CmnEventConfig, NodeType};
use crate::error::{PerfscopeError, Result};
use crate::metrics::types::{DEVICE_KEY, SUM_KEY, THREAD_KEY};

pub const SYSFS_DEVICES: &str = "/sys/devices";

/// Keys of a result entry that no event series may shadow.
pub const RESERVED_EVENT_NAMES: [&str; 3] = [SUM_KEY, THREAD_KEY, DEVICE_KEY];

/// Boolean option that may also be written as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn enabled(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

fn flag_or(flag: Option<Flag>, default: bool) -> bool {
    flag.map_or(default, Flag::enabled)
}

/// Engine configuration document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerfConfig {
    /// Reserved counter set 0-3; takes priority over `event`.
    #[serde(default)]
    pub set: Option<i64>,
    #[serde(default)]
    pub inherit: Option<Flag>,
    /// Raw entries, deserialized one at a time so a bad entry only skips itself.
    #[serde(default)]
    pub event: Vec<Value>,
    #[serde(default)]
    pub allthread: Option<Flag>,
}

/// One entry of the `event` list
#[derive(Debug, Clone, Deserialize)]
pub struct EventEntry {
    pub name: String,
    pub config: u64,
    #[serde(rename = "type")]
    pub type_: Option<u32>,
    pub device: Option<String>,
    #[serde(rename = "excludeUser")]
    pub exclude_user: Option<Flag>,
    #[serde(rename = "excludeKernel")]
    pub exclude_kernel: Option<Flag>,
    #[serde(rename = "counterLen64bit")]
    pub counter_len_64bit: Option<Flag>,
    #[serde(rename = "booker-ci")]
    pub booker_ci: Option<Flag>,
    #[serde(rename = "CSPMU")]
    pub cspmu: Option<Flag>,
    pub nodetype: Option<String>,
    pub bynodeid: Option<Flag>,
    #[serde(default)]
    pub nodeid: Vec<u64>,
}

impl EventEntry {
    pub fn width(&self) -> CounterWidth {
        if flag_or(self.counter_len_64bit, false) {
            CounterWidth::Bits64
        } else {
            CounterWidth::Bits32
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref().filter(|d| !d.is_empty())
    }

    fn to_event(&self, inherit: bool) -> Event {
        let mut event = Event::new(self.name.clone(), self.type_.unwrap_or(0), self.config);
        event.exclude_user = flag_or(self.exclude_user, false);
        event.exclude_kernel = flag_or(self.exclude_kernel, false);
        event.width = self.width();
        event.inherited = inherit;
        event.booker_ci = flag_or(self.booker_ci, false);
        event.cspmu = flag_or(self.cspmu, false);
        event
    }

    /// Interconnect events for this entry: one per node id with `bynodeid`,
    /// otherwise a single event addressed by node type only.
    fn interconnect_events(&self, base: Event) -> Vec<Event> {
        let node_type = NodeType::resolve(self.nodetype.as_deref().unwrap_or(" "));
        let describe = |name: String, node_id: Option<u64>| {
            let layout = CmnEventConfig::new(node_type, self.config, node_id);
            if let Err(reason) = layout.validate() {
                tracing::warn!("Interconnect event {} ({:?}): {}", name, self.nodetype, reason);
            }
            let mut event = base.clone();
            event.name = name;
            event.config = layout.to_config();
            event
        };

        if flag_or(self.bynodeid, false) {
            self.nodeid
                .iter()
                .map(|&node_id| describe(format!("{}_node{}", self.name, node_id), Some(node_id)))
                .collect()
        } else {
            vec![describe(self.name.clone(), None)]
        }
    }
}

/// Append `event` to `group` unless an event of the same name is already there.
fn push_unique(group: &mut Vec<Event>, event: Event) {
    if group.iter().any(|e| e.name == event.name) {
        tracing::warn!("Duplicate perf event {} skipped", event.name);
        return;
    }
    group.push(event);
}

/// Resolves PMU device names to perf event types through sysfs
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    root: PathBuf,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(SYSFS_DEVICES)
    }
}

impl DeviceRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `<root>/<device>/type`
    pub fn resolve_type(&self, device: &str) -> Result<u32> {
        let path = self.root.join(device).join("type");
        let content = fs::read_to_string(&path).map_err(|e| PerfscopeError::DeviceError {
            device: device.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let type_ = content
            .trim()
            .parse::<u32>()
            .map_err(|e| PerfscopeError::DeviceError {
                device: device.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;
        tracing::debug!("Read event type {} from {}", type_, path.display());
        Ok(type_)
    }
}

/// Events grouped by the bindings that will open them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPlan {
    /// Thread-bound groups keyed by device key ([`DEFAULT_DEVICE`] or a PMU name).
    pub device_events: BTreeMap<String, Vec<Event>>,
    pub booker_events: Vec<Event>,
    /// Device-wide groups keyed by CSPMU device name.
    pub cspmu_events: BTreeMap<String, Vec<Event>>,
    pub all_thread: bool,
    pub inherit: bool,
}

impl EventPlan {
    pub fn is_empty(&self) -> bool {
        self.device_events.is_empty() && self.booker_events.is_empty() && self.cspmu_events.is_empty()
    }

    /// Events a binding of `class` opens.
    pub fn events_for(&self, class: &DeviceClass) -> &[Event] {
        let events = match class {
            DeviceClass::Single => self.device_events.get(DEFAULT_DEVICE),
            DeviceClass::MultiPmu(device) => self.device_events.get(device),
            DeviceClass::Cspmu(device) => self.cspmu_events.get(device),
            DeviceClass::Interconnect => Some(&self.booker_events),
        };
        events.map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PerfConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| PerfscopeError::ConfigError(format!("invalid perf configuration: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(&value)
    }

    pub fn inherit(&self) -> bool {
        flag_or(self.inherit, true)
    }

    /// Background threads are instrumented by default unless per-API mode is on.
    pub fn all_thread(&self, enable_perapi: bool) -> bool {
        flag_or(self.allthread, !enable_perapi)
    }

    /// Parse the configured events into an [`EventPlan`].
    ///
    /// Entries that are malformed, reuse a name within their group or a
    /// reserved result key, reference an unresolvable device, or (in per-API
    /// mode) disagree with the PMU counter width `pmu_bits` are skipped with a
    /// warning.
    pub fn build_plan(
        &self,
        registry: &DeviceRegistry,
        enable_perapi: bool,
        pmu_bits: Option<u32>,
    ) -> EventPlan {
        let inherit = self.inherit();
        let mut plan = EventPlan {
            all_thread: self.all_thread(enable_perapi),
            inherit,
            ..Default::default()
        };

        if let Some(set) = self.set {
            if let Some(events) = reserved_set_events(set, inherit) {
                tracing::info!("Using reserved CPU counter set {}", set);
                plan.device_events.insert(DEFAULT_DEVICE.to_string(), events);
                return plan;
            }
        }

        let mut leader_placed = false;
        for (index, raw) in self.event.iter().enumerate() {
            let entry: EventEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping perf event #{}: {}", index, e);
                    continue;
                }
            };
            if RESERVED_EVENT_NAMES.contains(&entry.name.as_str()) {
                tracing::warn!("Perf event name {} is reserved, skipped", entry.name);
                continue;
            }
            if entry.type_.is_none() && entry.device.is_none() {
                tracing::warn!(
                    "Perf event {} specifies neither type nor device, skipped",
                    entry.name
                );
                continue;
            }

            let width = entry.width();
            if enable_perapi {
                if let Some(bits) = pmu_bits {
                    if width.bits() != bits {
                        tracing::warn!(
                            "Perf event {} is {} bit but the PMU counts {} bit, skipped",
                            entry.name,
                            width.bits(),
                            bits
                        );
                        continue;
                    }
                }
            }

            let mut event = entry.to_event(inherit);
            if let Some(device) = entry.device() {
                event.type_ = match registry.resolve_type(device) {
                    Ok(type_) => type_,
                    Err(e) => {
                        tracing::warn!("Perf event {} skipped: {}", entry.name, e);
                        continue;
                    }
                };
                event.device = device.to_string();
                if event.cspmu {
                    event.name = format!("{}_{}", device, entry.name);
                    push_unique(plan.cspmu_events.entry(device.to_string()).or_default(), event);
                } else {
                    push_unique(plan.device_events.entry(device.to_string()).or_default(), event);
                }
            } else if event.booker_ci {
                for event in entry.interconnect_events(event) {
                    push_unique(&mut plan.booker_events, event);
                }
            } else {
                let group = plan
                    .device_events
                    .entry(DEFAULT_DEVICE.to_string())
                    .or_default();
                if !leader_placed {
                    group.push(cycle_leader(width, inherit));
                    leader_placed = true;
                }
                push_unique(group, event);
            }
        }

        tracing::debug!(
            "Perf plan: {} device groups, {} interconnect events, {} CSPMU devices",
            plan.device_events.len(),
            plan.booker_events.len(),
            plan.cspmu_events.len()
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::binding::PerThreadBinding;
    use crate::counters::device::ThreadRole;
    use crate::counters::group::Snapshot;
    use perfscope_raw::PERF_TYPE_RAW;
    use serde_json::json;

    fn plan_of(value: Value) -> EventPlan {
        PerfConfig::from_value(&value)
            .unwrap()
            .build_plan(&DeviceRegistry::new("/nonexistent"), false, None)
    }

    fn names(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_flags_accept_bool_or_int() {
        let config = PerfConfig::from_value(&json!({"inherit": 0, "allthread": true})).unwrap();
        assert!(!config.inherit());
        assert!(config.all_thread(true));

        let config = PerfConfig::from_value(&json!({})).unwrap();
        assert!(config.inherit());
        assert!(config.all_thread(false));
        assert!(!config.all_thread(true));
    }

    #[test]
    fn test_reserved_set_takes_priority() {
        let plan = plan_of(json!({
            "set": 1,
            "inherit": false,
            "event": [{"name": "Ignored", "type": 4, "config": 17}]
        }));
        let events = &plan.device_events[DEFAULT_DEVICE];
        assert_eq!(events[0].name, "CPUCycleCount");
        assert_eq!(events.len(), 7);
        assert!(events.iter().all(|e| !e.inherited));
        assert!(!names(events).contains(&"Ignored"));
    }

    #[test]
    fn test_out_of_range_set_falls_back_to_events() {
        let plan = plan_of(json!({
            "set": 7,
            "event": [{"name": "CPUInstructionRetired", "type": 4, "config": 8}]
        }));
        assert_eq!(
            names(&plan.device_events[DEFAULT_DEVICE]),
            vec!["CPUCycleCount", "CPUInstructionRetired"]
        );
    }

    #[test]
    fn test_leader_width_follows_first_event() {
        let plan = plan_of(json!({
            "event": [
                {"name": "A", "type": 4, "config": 1, "counterLen64bit": 1},
                {"name": "B", "type": 4, "config": 2, "excludeKernel": true}
            ]
        }));
        let events = &plan.device_events[DEFAULT_DEVICE];
        assert_eq!(names(events), vec!["CPUCycleCount", "A", "B"]);
        assert_eq!(events[0].width, CounterWidth::Bits64);
        assert!(events[2].exclude_kernel);
        assert!(!events[2].exclude_user);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let plan = plan_of(json!({
            "event": [
                {"name": "NoConfig", "type": 4},
                {"config": 3, "type": 4},
                {"name": "NoType", "config": 3},
                {"name": "BadConfig", "type": 4, "config": "x"},
                {"name": "Good", "type": 4, "config": 3}
            ]
        }));
        assert_eq!(
            names(&plan.device_events[DEFAULT_DEVICE]),
            vec!["CPUCycleCount", "Good"]
        );
    }

    #[test]
    fn test_booker_expands_per_node_id() {
        let plan = plan_of(json!({
            "event": [{
                "name": "X", "type": 14, "config": 3, "booker-ci": 1,
                "nodetype": "HNF", "bynodeid": true, "nodeid": [5, 9]
            }]
        }));
        assert!(plan.device_events.is_empty());
        let events = &plan.booker_events;
        assert_eq!(names(events), vec!["X_node5", "X_node9"]);
        assert_eq!(events[0].config, CmnEventConfig::new(NodeType::Hnf, 3, Some(5)).to_config());
        assert_eq!(events[1].config, CmnEventConfig::new(NodeType::Hnf, 3, Some(9)).to_config());
        let diff = events[0].config ^ events[1].config;
        assert_eq!(diff & !(0xFFFFu64 << 32), 0);
        assert_eq!(events[0].type_, 14);
    }

    #[test]
    fn test_duplicate_and_reserved_names_are_skipped() {
        let plan = plan_of(json!({
            "event": [
                {"name": "A", "type": 4, "config": 1},
                {"name": "A", "type": 4, "config": 2},
                {"name": "CPUCycleCount", "type": 0, "config": 0},
                {"name": "SUM", "type": 4, "config": 3},
                {"name": "CCthread", "type": 4, "config": 4},
                {"name": "device", "type": 4, "config": 5},
                {"name": "B", "type": 4, "config": 6}
            ]
        }));
        let events = &plan.device_events[DEFAULT_DEVICE];
        assert_eq!(names(events), vec!["CPUCycleCount", "A", "B"]);
        assert_eq!(events[1].config, 1);

        // Every series of the resulting binding grows by one per read
        let mut binding = PerThreadBinding::new(Some(1), "patrace-1", ThreadRole::Replay, DeviceClass::Single);
        binding.set_event_names(events.iter().map(|e| e.name.clone()).collect());
        binding.update_data(&Snapshot::from_values(&[100, 7, 9]));
        assert_eq!(binding.results().len(), 3);
        assert!(binding.results().values().all(|series| series.len() == 1));
    }

    #[test]
    fn test_duplicate_node_ids_expand_once() {
        let plan = plan_of(json!({
            "event": [
                {"name": "X", "type": 14, "config": 3, "booker-ci": 1, "nodetype": "HNF", "bynodeid": 1, "nodeid": [5, 5, 9]},
                {"name": "X_node9", "type": 14, "config": 4, "booker-ci": 1, "nodetype": "HNF"}
            ]
        }));
        assert_eq!(names(&plan.booker_events), vec!["X_node5", "X_node9"]);
    }

    #[test]
    fn test_booker_without_node_id() {
        let plan = plan_of(json!({
            "event": [{"name": "Y", "type": 14, "config": 0x42, "booker-ci": true, "nodetype": "XP"}]
        }));
        assert_eq!(names(&plan.booker_events), vec!["Y"]);
        assert_eq!(plan.booker_events[0].config, 0x0042_0006);
    }

    #[test]
    fn test_device_events_resolve_through_registry() {
        let root = tempfile::tempdir().unwrap();
        for (device, type_) in [("armv8_cortex_a55", "8\n"), ("arm_cspmu_0", "11\n"), ("arm_cspmu_1", "12\n")] {
            fs::create_dir_all(root.path().join(device)).unwrap();
            fs::write(root.path().join(device).join("type"), type_).unwrap();
        }

        let config = PerfConfig::from_value(&json!({
            "event": [
                {"name": "LittleCycles", "device": "armv8_cortex_a55", "config": 17},
                {"name": "Missing", "device": "armv8_nope", "config": 17},
                {"name": "Reads", "device": "arm_cspmu_0", "config": 1, "CSPMU": 1},
                {"name": "Reads", "device": "arm_cspmu_1", "config": 1, "CSPMU": 1}
            ]
        }))
        .unwrap();
        let plan = config.build_plan(&DeviceRegistry::new(root.path()), false, None);

        let little = &plan.device_events["armv8_cortex_a55"];
        assert_eq!(little.len(), 1);
        assert_eq!(little[0].type_, 8);
        assert!(!plan.device_events.contains_key(DEFAULT_DEVICE));
        assert!(!plan.device_events.contains_key("armv8_nope"));

        assert_eq!(plan.cspmu_events.len(), 2);
        assert_eq!(plan.cspmu_events["arm_cspmu_0"][0].name, "arm_cspmu_0_Reads");
        assert_eq!(plan.cspmu_events["arm_cspmu_1"][0].type_, 12);
        assert_eq!(
            plan.events_for(&DeviceClass::Cspmu("arm_cspmu_1".into()))[0].name,
            "arm_cspmu_1_Reads"
        );
    }

    #[test]
    fn test_perapi_width_mismatch_is_skipped() {
        let config = PerfConfig::from_value(&json!({
            "event": [
                {"name": "Wide", "type": PERF_TYPE_RAW, "config": 17, "counterLen64bit": 1},
                {"name": "Narrow", "type": PERF_TYPE_RAW, "config": 8}
            ]
        }))
        .unwrap();
        let registry = DeviceRegistry::default();

        let plan = config.build_plan(&registry, true, Some(32));
        assert_eq!(
            names(&plan.device_events[DEFAULT_DEVICE]),
            vec!["CPUCycleCount", "Narrow"]
        );
        assert!(!plan.all_thread);

        let plan = config.build_plan(&registry, false, Some(32));
        assert_eq!(plan.device_events[DEFAULT_DEVICE].len(), 3);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        fs::write(&path, r#"{"set": 0, "allthread": 0}"#).unwrap();
        let config = PerfConfig::from_file(&path).unwrap();
        assert_eq!(config.set, Some(0));
        assert!(!config.all_thread(false));

        assert!(PerfConfig::from_value(&json!({"event": 3})).is_err());
    }
}
