// Counter engine: owns every binding and drives the collector lifecycle
// All entry points take &self so workers can issue scope calls while a
// controlling thread collects.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};

use perfscope_raw::arch::CounterPause;
use perfscope_raw::CounterWidth;

use crate::common::thread::{current_pid, TASK_DIR};
use crate::common::PMU_COUNTER_BITS;
use crate::config::{DeviceRegistry, EventPlan, PerfConfig};
use crate::counters::binding::{route_scope, PerThreadBinding};
use crate::counters::device::{DeviceClass, ScopeMask, ThreadRole};
use crate::counters::discovery;
use crate::error::{PerfscopeError, Result};
use crate::metrics::export::{csv_file_name, write_json, write_series_csv};
use crate::metrics::types::{Aggregate, DEVICE_KEY, THREAD_KEY};

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Uniform lifecycle shared by every collector a driver manages
///
/// Lifecycle calls report success as `bool`; failures are logged.
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn available(&self) -> bool;
    fn init(&self) -> bool;
    fn deinit(&self) -> bool;
    fn start(&self) -> bool;
    fn stop(&self) -> bool;
    fn collect(&self, now: i64) -> bool;
    fn clear(&self);
    fn postprocess(&self, timing: &[i64]) -> bool;
    fn summarize(&self);
    fn results(&self) -> Value;

    fn collect_scope_start(&self, _scope_id: u16, _mask: ScopeMask, _tid: i32) -> bool {
        false
    }

    fn collect_scope_stop(&self, _scope_id: u16, _mask: ScopeMask, _tid: i32) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

struct Lifecycle {
    state: EngineState,
    plan: EventPlan,
}

/// A binding plus the immutable routing data needed to skip it without locking
struct BindingSlot {
    role: ThreadRole,
    bound_tid: Option<i32>,
    binding: Mutex<PerThreadBinding>,
}

impl BindingSlot {
    fn new(binding: PerThreadBinding) -> Self {
        Self {
            role: binding.role(),
            bound_tid: binding.bound_tid(),
            binding: Mutex::new(binding),
        }
    }

    fn route(&self, mask: ScopeMask, tid: i32) -> Option<bool> {
        route_scope(self.role, self.bound_tid, mask, tid)
    }
}

pub struct PerfCollector {
    name: String,
    config: Value,
    enable_perapi: bool,
    registry: DeviceRegistry,
    task_dir: PathBuf,
    lifecycle: Mutex<Lifecycle>,
    collecting: AtomicBool,
    summarized: AtomicBool,
    /// Counter width used by direct scope reads, in bits.
    scope_width: AtomicU32,
    /// Ordered replay, background, interconnect, CSPMU.
    bindings: RwLock<Vec<BindingSlot>>,
    result: Mutex<Value>,
}

impl PerfCollector {
    pub fn new(config: Value, name: impl Into<String>, enable_perapi: bool) -> Self {
        Self {
            name: name.into(),
            config,
            enable_perapi,
            registry: DeviceRegistry::default(),
            task_dir: PathBuf::from(TASK_DIR),
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Uninitialized,
                plan: EventPlan::default(),
            }),
            collecting: AtomicBool::new(false),
            summarized: AtomicBool::new(false),
            scope_width: AtomicU32::new(CounterWidth::Bits32.bits()),
            bindings: RwLock::new(Vec::new()),
            result: Mutex::new(Value::Null),
        }
    }

    /// Resolve device types under `registry` instead of `/sys/devices`.
    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Discover threads under `task_dir` instead of `/proc/self/task`.
    pub fn with_task_dir(mut self, task_dir: impl Into<PathBuf>) -> Self {
        self.task_dir = task_dir.into();
        self
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.lock().state
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub fn is_summarized(&self) -> bool {
        self.summarized.load(Ordering::Acquire)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Run `f` over every binding in start order.
    pub fn visit_bindings<F: FnMut(&PerThreadBinding)>(&self, mut f: F) {
        for slot in self.bindings.read().iter() {
            f(&slot.binding.lock());
        }
    }

    fn scope_width(&self) -> CounterWidth {
        CounterWidth::from_bits(self.scope_width.load(Ordering::Relaxed)).unwrap_or_default()
    }

    fn try_init(&self) -> Result<(EventPlan, Vec<BindingSlot>)> {
        let config = PerfConfig::from_value(&self.config)?;
        let pmu_bits = if self.enable_perapi {
            *PMU_COUNTER_BITS
        } else {
            None
        };
        if let Some(bits) = pmu_bits {
            tracing::debug!("PMU counters are {} bit", bits);
            self.scope_width.store(bits, Ordering::Relaxed);
        }

        let plan = config.build_plan(&self.registry, self.enable_perapi, pmu_bits);
        if plan.is_empty() {
            tracing::warn!("No perf events configured for {}", self.name);
        }

        let specs = discovery::discover(&plan, &self.task_dir)?;
        let mut slots = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut binding = spec.into_binding();
            let events = plan.events_for(binding.class());
            binding.init(events, self.enable_perapi).map_err(|e| {
                tracing::error!(
                    "Failed to open counters for {} ({}): {}",
                    binding.name(),
                    binding.device(),
                    e
                );
                e
            })?;
            slots.push(BindingSlot::new(binding));
        }
        Ok((plan, slots))
    }

    fn thread_entry(binding: &PerThreadBinding) -> Map<String, Value> {
        let mut entry = Map::new();
        entry.insert(THREAD_KEY.to_string(), json!(binding.name()));
        if let DeviceClass::MultiPmu(device) | DeviceClass::Cspmu(device) = binding.class() {
            entry.insert(DEVICE_KEY.to_string(), json!(device));
        }
        binding.postprocess(&mut entry);
        entry
    }

    fn clock_entry(binding: &PerThreadBinding) -> Value {
        let device = binding.device();
        let sec: Vec<i64> = binding.clocks().iter().map(|c| c.sec).collect();
        let nsec: Vec<i64> = binding.clocks().iter().map(|c| c.nsec).collect();
        let mut entry = Map::new();
        entry.insert(format!("{device}_sec"), json!(sec));
        entry.insert(format!("{device}_nsec"), json!(nsec));
        Value::Object(entry)
    }

    fn aggregate_entry(aggregate: Aggregate) -> Map<String, Value> {
        let mut entry = Map::new();
        entry.insert(THREAD_KEY.to_string(), json!(aggregate.name()));
        entry
    }

    /// Build the result document from every binding.
    ///
    /// Replay, CSPMU and interconnect bindings merge into `replayMainThreads`;
    /// with background threads enabled, background bindings merge into
    /// `backgroundThreads` and, together with the replay aggregate, into
    /// `allThreads`.
    fn build_result(&self, all_thread: bool) -> Value {
        let bindings = self.bindings.read();
        let mut thread_data = Vec::new();
        let mut replay = Self::aggregate_entry(Aggregate::ReplayMainThreads);

        for role in [ThreadRole::Replay, ThreadRole::Cspmu, ThreadRole::Interconnect] {
            for slot in bindings.iter().filter(|s| s.role == role) {
                let binding = slot.binding.lock();
                thread_data.push(Value::Object(Self::thread_entry(&binding)));
                binding.postprocess(&mut replay);
                if role == ThreadRole::Cspmu {
                    thread_data.push(Self::clock_entry(&binding));
                }
            }
        }

        let mut all = replay.clone();
        thread_data.push(Value::Object(replay));

        if all_thread {
            let mut background = Self::aggregate_entry(Aggregate::BackgroundThreads);
            all.insert(THREAD_KEY.to_string(), json!(Aggregate::AllThreads.name()));
            for slot in bindings.iter().filter(|s| s.role == ThreadRole::Background) {
                let binding = slot.binding.lock();
                thread_data.push(Value::Object(Self::thread_entry(&binding)));
                binding.postprocess(&mut background);
                binding.postprocess(&mut all);
            }
            thread_data.push(Value::Object(background));
            thread_data.push(Value::Object(all));
        }

        let mut result = Map::new();
        if self.is_summarized() {
            result.insert("summarized".to_string(), json!(true));
        }
        result.insert("thread_data".to_string(), Value::Array(thread_data));
        Value::Object(result)
    }

    /// Write the last postprocessed result document.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(path, &self.results())
    }

    /// Write one CSV per binding into `dir` and return the written paths.
    ///
    /// Device-wide bindings are named after the process id; bindings on a
    /// non-default device get the device name appended.
    pub fn write_csv(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let pid = current_pid();
        let mut written = Vec::new();
        for slot in self.bindings.read().iter() {
            let binding = slot.binding.lock();
            let id = binding.tid().unwrap_or(pid);
            let file_name = match binding.class() {
                DeviceClass::Single => csv_file_name(binding.name(), id),
                class => csv_file_name(
                    &format!("{}-{}", binding.name(), class.device_label()),
                    id,
                ),
            };
            let path = dir.join(file_name);
            tracing::debug!("Writing perf result to {}", path.display());
            write_series_csv(&path, binding.results())?;
            written.push(path);
        }
        Ok(written)
    }

    fn scope_call<F>(&self, scope_id: u16, mask: ScopeMask, tid: i32, op: &str, mut f: F) -> bool
    where
        F: FnMut(&mut PerThreadBinding, CounterWidth, bool) -> Result<()>,
    {
        if !self.is_collecting() {
            return false;
        }

        let width = self.scope_width();
        let _pause = CounterPause::new(self.enable_perapi);
        let bindings = self.bindings.read();
        let mut ok = true;
        for slot in bindings.iter() {
            let Some(is_calling_thread) = slot.route(mask, tid) else {
                continue;
            };
            let mut binding = slot.binding.lock();
            if let Err(e) = f(&mut binding, width, is_calling_thread) {
                tracing::warn!(
                    "{}({}) on {} [{}] failed: {}",
                    op,
                    scope_id,
                    binding.name(),
                    binding.device(),
                    e
                );
                ok = false;
            }
        }
        ok
    }
}

impl Collector for PerfCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        Path::new(PARANOID_PATH).exists()
    }

    fn init(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EngineState::Uninitialized {
            tracing::warn!("Perf collector {} is already initialized", self.name);
            return false;
        }

        match self.try_init() {
            Ok((plan, slots)) => {
                tracing::info!(
                    "Perf collector {} initialized with {} bindings",
                    self.name,
                    slots.len()
                );
                *self.bindings.write() = slots;
                lifecycle.plan = plan;
                lifecycle.state = EngineState::Initialized;
                true
            }
            Err(e) => {
                tracing::error!("Failed to initialize perf collector {}: {}", self.name, e);
                false
            }
        }
    }

    fn deinit(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        self.collecting.store(false, Ordering::Release);

        let mut bindings = self.bindings.write();
        for slot in bindings.iter() {
            slot.binding.lock().deinit();
        }
        bindings.clear();
        drop(bindings);

        lifecycle.plan = EventPlan::default();
        lifecycle.state = EngineState::Uninitialized;
        self.summarized.store(false, Ordering::Release);
        *self.result.lock() = Value::Null;
        true
    }

    fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            EngineState::Started => return true,
            EngineState::Uninitialized => {
                tracing::warn!("Perf collector {} started before init", self.name);
                return false;
            }
            EngineState::Initialized | EngineState::Stopped => {}
        }

        let bindings = self.bindings.read();
        for (index, slot) in bindings.iter().enumerate() {
            let mut binding = slot.binding.lock();
            match binding.start() {
                Ok(()) => {}
                Err(PerfscopeError::HardwareAccess(value)) => {
                    tracing::error!(
                        "EL0 access to PMU is required, set the access bits in PMUSERENR_EL0 (current 0x{:08x})",
                        value
                    );
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!("Failed to start counters for {}: {}", binding.name(), e);
                    drop(binding);
                    // Groups enabled so far must not keep counting
                    for started in &bindings[..index] {
                        let mut binding = started.binding.lock();
                        if let Err(e) = binding.stop() {
                            tracing::warn!("Failed to stop counters for {}: {}", binding.name(), e);
                        }
                    }
                    return false;
                }
            }
        }
        drop(bindings);

        lifecycle.state = EngineState::Started;
        self.collecting.store(true, Ordering::Release);
        tracing::info!("Perf collector {} started", self.name);
        true
    }

    fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EngineState::Started {
            return true;
        }

        tracing::debug!("Stopping perf collection");
        self.collecting.store(false, Ordering::Release);
        for slot in self.bindings.read().iter() {
            let mut binding = slot.binding.lock();
            if let Err(e) = binding.stop() {
                tracing::warn!("Failed to stop counters for {}: {}", binding.name(), e);
            }
        }
        lifecycle.state = EngineState::Stopped;
        true
    }

    fn collect(&self, now: i64) -> bool {
        if !self.is_collecting() {
            return false;
        }

        let mut ok = true;
        for slot in self.bindings.read().iter() {
            let mut binding = slot.binding.lock();
            if let Err(e) = binding.collect(now) {
                tracing::error!("Failed to read counters for {}: {}", binding.name(), e);
                ok = false;
            }
        }
        ok
    }

    fn clear(&self) {
        if self.is_collecting() {
            return;
        }
        for slot in self.bindings.read().iter() {
            slot.binding.lock().clear();
        }
        self.summarized.store(false, Ordering::Release);
        *self.result.lock() = Value::Null;
    }

    fn postprocess(&self, _timing: &[i64]) -> bool {
        let all_thread = self.lifecycle.lock().plan.all_thread;
        let result = self.build_result(all_thread);
        *self.result.lock() = result;
        true
    }

    fn summarize(&self) {
        self.summarized.store(true, Ordering::Release);
        for slot in self.bindings.read().iter() {
            slot.binding.lock().summarize();
        }
    }

    fn results(&self) -> Value {
        self.result.lock().clone()
    }

    fn collect_scope_start(&self, scope_id: u16, mask: ScopeMask, tid: i32) -> bool {
        self.scope_call(scope_id, mask, tid, "collect_scope_start", |binding, width, _| {
            binding.scope_start(scope_id, mask, width)
        })
    }

    fn collect_scope_stop(&self, scope_id: u16, mask: ScopeMask, tid: i32) -> bool {
        self.scope_call(
            scope_id,
            mask,
            tid,
            "collect_scope_stop",
            |binding, width, is_calling_thread| {
                binding.scope_stop(scope_id, mask, width, is_calling_thread)
            },
        )
    }
}

impl Drop for PerfCollector {
    fn drop(&mut self) {
        if self.state() != EngineState::Uninitialized {
            self.deinit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::current_tid;
    use crate::counters::events::reserved_set_events;
    use crate::counters::CounterGroup;
    use std::sync::Arc;

    /// Whether the reserved set 0 group can be opened on this machine.
    fn perf_available() -> bool {
        let events = reserved_set_events(0, false).unwrap();
        let mut group = CounterGroup::new();
        match group.init(&events, Some(0), None) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("perf counters unavailable, skipping: {e}");
                false
            }
        }
    }

    /// Fake task dir listing the calling thread under a replay name.
    fn replay_task_dir(name: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let task = dir.path().join(current_tid().to_string());
        std::fs::create_dir_all(&task).unwrap();
        std::fs::write(task.join("comm"), format!("{name}\n")).unwrap();
        dir
    }

    fn set_collector(set: i64, task_dir: &Path) -> PerfCollector {
        PerfCollector::new(json!({"set": set, "inherit": 0}), "perf", false).with_task_dir(task_dir)
    }

    fn thread_entries(result: &Value) -> Vec<Value> {
        result["thread_data"].as_array().cloned().unwrap_or_default()
    }

    fn entry<'a>(entries: &'a [Value], name: &str) -> &'a Value {
        entries
            .iter()
            .find(|e| e[THREAD_KEY] == json!(name))
            .unwrap()
    }

    #[test]
    fn test_lifecycle_without_threads() {
        let dir = tempfile::tempdir().unwrap();
        let collector = set_collector(0, dir.path());

        assert!(!collector.start());
        assert!(!collector.collect(0));
        assert!(collector.init());
        assert!(!collector.init());
        assert_eq!(collector.binding_count(), 0);

        assert!(collector.start());
        assert!(collector.start());
        assert!(collector.collect(1));
        assert!(collector.stop());
        assert!(collector.stop());
        assert!(!collector.collect(2));
        assert!(!collector.collect_scope_start(1, ScopeMask::REPLAY_THREADS, current_tid()));

        assert!(collector.postprocess(&[]));
        let entries = thread_entries(&collector.results());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0][THREAD_KEY], json!("replayMainThreads"));
        assert_eq!(entries[2][THREAD_KEY], json!("allThreads"));

        assert!(collector.deinit());
        assert_eq!(collector.state(), EngineState::Uninitialized);
        assert_eq!(collector.results(), Value::Null);
    }

    #[test]
    fn test_invalid_config_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let collector =
            PerfCollector::new(json!({"event": "nope"}), "perf", false).with_task_dir(dir.path());
        assert!(!collector.init());
        assert_eq!(collector.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_unopenable_event_fails_init() {
        let dir = replay_task_dir("patrace-1");
        let collector = PerfCollector::new(
            json!({"event": [{"name": "Bogus", "type": 0x7fff_0000u32, "config": 1}]}),
            "perf",
            false,
        )
        .with_task_dir(dir.path());
        assert!(!collector.init());
        assert_eq!(collector.state(), EngineState::Uninitialized);
        assert_eq!(collector.binding_count(), 0);
        assert!(!collector.start());
    }

    #[test]
    fn test_cspmu_rounds_carry_clock_samples() {
        let rounds = 3;
        let mut entries = Vec::new();
        for device in ["arm_cspmu_0", "arm_cspmu_1"] {
            let mut binding = PerThreadBinding::new(
                None,
                "app",
                ThreadRole::Cspmu,
                DeviceClass::Cspmu(device.to_string()),
            );
            binding.set_event_names(vec![format!("{device}_Reads")]);
            for now in 0..rounds {
                // Never opened: each read fails but still fills the round
                assert!(binding.collect(now).is_err());
            }
            assert_eq!(binding.clocks().len(), rounds as usize);
            entries.push((device, PerfCollector::thread_entry(&binding), PerfCollector::clock_entry(&binding)));
        }

        for (device, counters, clocks) in &entries {
            assert_eq!(counters[DEVICE_KEY], json!(device));
            let reads = counters[&format!("{device}_Reads")].as_array().unwrap();
            assert_eq!(reads.len(), rounds as usize);
            let sec = clocks[format!("{device}_sec")].as_array().unwrap();
            let nsec = clocks[format!("{device}_nsec")].as_array().unwrap();
            assert_eq!(sec.len(), rounds as usize);
            assert_eq!(nsec.len(), rounds as usize);
            assert!(nsec.iter().all(|n| (0..1_000_000_000).contains(&n.as_i64().unwrap())));
        }
    }

    #[test]
    fn test_failed_start_disables_started_groups() {
        let tid = current_tid();
        let mut opened = PerThreadBinding::new(Some(tid), "patrace-1", ThreadRole::Replay, DeviceClass::Single);
        let events = reserved_set_events(0, false).unwrap();
        if let Err(e) = opened.init(&events, false) {
            eprintln!("perf counters unavailable, skipping: {e}");
            return;
        }
        let never_opened = PerThreadBinding::new(Some(tid), "patrace-2", ThreadRole::Replay, DeviceClass::Single);

        let dir = tempfile::tempdir().unwrap();
        let collector = set_collector(0, dir.path());
        *collector.bindings.write() = vec![BindingSlot::new(opened), BindingSlot::new(never_opened)];
        collector.lifecycle.lock().state = EngineState::Initialized;

        assert!(!collector.start());
        assert_eq!(collector.state(), EngineState::Initialized);
        assert!(!collector.is_collecting());

        let bindings = collector.bindings.read();
        let mut first = bindings[0].binding.lock();
        first.collect(0).unwrap();
        let mut acc = 0u64;
        for i in 0..100_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(std::hint::black_box(i));
        }
        std::hint::black_box(acc);
        first.collect(1).unwrap();
        assert_eq!(first.results()["CPUCycleCount"].values()[1], 0);
    }

    #[test]
    fn test_reserved_set_series_after_collect() {
        if !perf_available() {
            return;
        }
        let dir = replay_task_dir("patrace-1");
        let collector = set_collector(0, dir.path());
        assert!(collector.init());
        assert_eq!(collector.binding_count(), 1);
        assert!(collector.start());
        assert!(collector.collect(0));
        assert!(collector.stop());

        collector.visit_bindings(|binding| {
            let names: Vec<&str> = binding.results().keys().map(|k| k.as_str()).collect();
            assert_eq!(
                names,
                vec![
                    "CPUBranchMispredictions",
                    "CPUCacheMisses",
                    "CPUCacheReferences",
                    "CPUCycleCount",
                    "CPUInstructionRetired",
                ]
            );
            for series in binding.results().values() {
                assert_eq!(series.len(), 1);
                assert!(series.values()[0] >= 0);
            }
        });
        assert!(collector.deinit());
    }

    #[test]
    fn test_scope_accounting_and_mismatch() {
        if !perf_available() {
            return;
        }
        let dir = replay_task_dir("patrace-1");
        let collector = set_collector(0, dir.path());
        assert!(collector.init());
        assert!(collector.start());

        let tid = current_tid();
        let mask = ScopeMask::REPLAY_THREADS;
        let rounds = 4;
        for _ in 0..rounds {
            assert!(collector.collect_scope_start(1, mask, tid));
            let mut acc = 0u64;
            for i in 0..50_000u64 {
                acc = acc.wrapping_add(std::hint::black_box(i));
            }
            std::hint::black_box(acc);
            assert!(collector.collect_scope_stop(1, mask, tid));
        }

        assert!(collector.collect_scope_start(1, mask, tid));
        assert!(!collector.collect_scope_stop(2, mask, tid));
        assert!(!collector.collect_scope_stop(1, ScopeMask::ALL_THREADS, tid));
        assert!(collector.collect_scope_stop(1, mask, tid));

        // Other threads' scope calls do not reach this binding
        assert!(collector.collect_scope_start(3, mask, tid + 100_000));

        collector.visit_bindings(|binding| {
            assert_eq!(binding.scope().num_calls(1), rounds + 1);
            assert_eq!(binding.scope().num_with_perf(1), rounds + 1);
            assert_eq!(binding.scope().num_calls(2), 0);
        });

        assert!(collector.stop());
        collector.visit_bindings(|binding| {
            let calls = &binding.results()["CCthread:ScopeNumCalls"];
            assert_eq!(calls.values()[1], rounds + 1);
            assert!(binding.results()["CPUCycleCount:ScopeSum"].values()[1] > 0);
        });
        assert!(collector.deinit());
    }

    #[test]
    fn test_postprocess_merges_threads() {
        if !perf_available() {
            return;
        }
        let dir = replay_task_dir("patrace-7");
        let collector = Arc::new(set_collector(0, dir.path()));
        assert!(collector.init());
        assert!(collector.start());
        for now in 0..3 {
            assert!(collector.collect(now));
        }
        assert!(collector.stop());
        collector.summarize();
        assert!(collector.postprocess(&[]));

        let result = collector.results();
        assert_eq!(result["summarized"], json!(true));
        let entries = thread_entries(&result);
        let own = entry(&entries, "patrace-7");
        let replay = entry(&entries, "replayMainThreads");
        assert!(own.get(DEVICE_KEY).is_none());
        assert_eq!(own["CPUCycleCount"].as_array().unwrap().len(), 1);
        assert_eq!(own["CPUCycleCount"], replay["CPUCycleCount"]);
        assert_eq!(replay["SUM"]["CPUCycleCount"], own["SUM"]["CPUCycleCount"]);

        let out = tempfile::tempdir().unwrap();
        let written = collector.write_csv(out.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("patrace-7"));
        collector.write_json(&out.path().join("perf.json")).unwrap();
    }
}
