// Per-thread binding: one counter group, its result series and scope sums

use serde_json::{json, Map, Value};

use perfscope_raw::CounterWidth;

use crate::common::ClockSample;
use crate::counters::device::{DeviceClass, ScopeMask, ThreadRole};
use crate::counters::event::Event;
use crate::counters::group::{CounterGroup, Snapshot};
use crate::error::{PerfscopeError, Result};
use crate::metrics::series::{ResultSeries, SeriesMap};
use crate::metrics::types::SUM_KEY;

/// Scope ids at or beyond the last slot share it as an overflow bucket.
pub const MAX_SCOPE_SLOTS: usize = 1024;
pub const OVERFLOW_SLOT: usize = MAX_SCOPE_SLOTS - 1;

pub const SCOPE_SUM_SUFFIX: &str = ":ScopeSum";
pub const SCOPE_NUM_CALLS: &str = "CCthread:ScopeNumCalls";
pub const SCOPE_NUM_WITH_PERF: &str = "CCthread:ScopeNumWithPerf";

/// Counter deltas attributed to scope ids
///
/// One array per counter plus two call counters, all indexed by scope id and
/// grown on demand up to [`MAX_SCOPE_SLOTS`].
#[derive(Debug, Clone, Default)]
pub struct ScopeAccumulator {
    sums: Vec<Vec<i64>>,
    /// Invocations whose summed delta was positive.
    num_calls: Vec<i64>,
    /// Of those, invocations bracketed by this binding's own thread.
    num_with_perf: Vec<i64>,
    overflow_logged: bool,
}

fn grow(slots: &mut Vec<i64>, slot: usize) {
    if slots.len() <= slot {
        slots.resize(slot + 1, 0);
    }
}

impl ScopeAccumulator {
    pub fn new(counters: usize) -> Self {
        Self {
            sums: vec![Vec::new(); counters],
            ..Default::default()
        }
    }

    pub fn slot(scope_id: u16) -> usize {
        (scope_id as usize).min(OVERFLOW_SLOT)
    }

    pub fn record(
        &mut self,
        scope_id: u16,
        is_calling_thread: bool,
        start: &Snapshot,
        stop: &Snapshot,
    ) {
        let slot = Self::slot(scope_id);
        if scope_id as usize > OVERFLOW_SLOT && !self.overflow_logged {
            tracing::warn!(
                "Scope id {} exceeds {}, accumulating into the overflow slot",
                scope_id,
                OVERFLOW_SLOT
            );
            self.overflow_logged = true;
        }

        let mut total = 0i64;
        for (index, sums) in self.sums.iter_mut().enumerate() {
            let delta = stop.value(index).wrapping_sub(start.value(index));
            grow(sums, slot);
            sums[slot] = sums[slot].wrapping_add(delta);
            total = total.wrapping_add(delta);
        }

        grow(&mut self.num_calls, slot);
        grow(&mut self.num_with_perf, slot);
        if total > 0 {
            self.num_calls[slot] += 1;
            if is_calling_thread {
                self.num_with_perf[slot] += 1;
            }
        }
    }

    pub fn sum(&self, counter: usize, scope_id: u16) -> i64 {
        self.sums
            .get(counter)
            .and_then(|sums| sums.get(Self::slot(scope_id)))
            .copied()
            .unwrap_or(0)
    }

    pub fn num_calls(&self, scope_id: u16) -> i64 {
        self.num_calls.get(Self::slot(scope_id)).copied().unwrap_or(0)
    }

    pub fn num_with_perf(&self, scope_id: u16) -> i64 {
        self.num_with_perf
            .get(Self::slot(scope_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_calls.is_empty() && self.sums.iter().all(Vec::is_empty)
    }

    /// Append the accumulated arrays to `results` and start over.
    pub fn flush_into(&mut self, names: &[String], results: &mut SeriesMap) {
        fn append(results: &mut SeriesMap, name: String, values: Vec<i64>) {
            if values.is_empty() {
                return;
            }
            let series = results.entry(name).or_insert_with(ResultSeries::new);
            for value in values {
                series.push(value);
            }
        }

        for (name, sums) in names.iter().zip(self.sums.iter_mut()) {
            append(
                results,
                format!("{name}{SCOPE_SUM_SUFFIX}"),
                std::mem::take(sums),
            );
        }
        append(
            results,
            SCOPE_NUM_CALLS.to_string(),
            std::mem::take(&mut self.num_calls),
        );
        append(
            results,
            SCOPE_NUM_WITH_PERF.to_string(),
            std::mem::take(&mut self.num_with_perf),
        );
    }
}

/// Route a scope call for `mask` issued by `tid` to a binding of `role`.
///
/// Returns `Some(is_calling_thread)` when the binding takes part. Thread-bound
/// bindings only take calls issued by their own thread.
pub fn route_scope(role: ThreadRole, bound_tid: Option<i32>, mask: ScopeMask, tid: i32) -> Option<bool> {
    if !mask.intersects(role.scope_bit()) {
        return None;
    }
    match bound_tid {
        Some(own) => (own == tid).then_some(true),
        None => Some(false),
    }
}

/// One counter group bound to one thread (or to a whole device)
pub struct PerThreadBinding {
    /// `None` for device-wide groups.
    tid: Option<i32>,
    name: String,
    role: ThreadRole,
    class: DeviceClass,
    event_names: Vec<String>,
    group: CounterGroup,
    results: SeriesMap,
    scope: ScopeAccumulator,
    scope_mask: Option<ScopeMask>,
    clocks: Vec<ClockSample>,
}

impl PerThreadBinding {
    pub fn new(tid: Option<i32>, name: impl Into<String>, role: ThreadRole, class: DeviceClass) -> Self {
        Self {
            tid,
            name: name.into(),
            role,
            class,
            event_names: Vec::new(),
            group: CounterGroup::new(),
            results: SeriesMap::new(),
            scope: ScopeAccumulator::default(),
            scope_mask: None,
            clocks: Vec::new(),
        }
    }

    pub fn tid(&self) -> Option<i32> {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ThreadRole {
        self.role
    }

    pub fn class(&self) -> &DeviceClass {
        &self.class
    }

    pub fn device(&self) -> &str {
        self.class.device_label()
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    #[cfg(test)]
    pub(crate) fn set_event_names(&mut self, names: Vec<String>) {
        self.scope = ScopeAccumulator::new(names.len());
        self.event_names = names;
    }

    pub fn results(&self) -> &SeriesMap {
        &self.results
    }

    pub fn scope(&self) -> &ScopeAccumulator {
        &self.scope
    }

    pub fn clocks(&self) -> &[ClockSample] {
        &self.clocks
    }

    pub fn counter_count(&self) -> usize {
        self.group.len()
    }

    /// Open the group for `events`.
    ///
    /// Thread-bound classes follow the thread on any CPU; device-wide
    /// classes count on CPU 0 for every thread.
    pub fn init(&mut self, events: &[Event], enable_perapi: bool) -> Result<()> {
        self.event_names = events.iter().map(|e| e.name.clone()).collect();
        self.scope = ScopeAccumulator::new(events.len());
        self.group
            .set_enable_perapi(enable_perapi && self.role == ThreadRole::Replay);

        let (tid, cpu) = if self.class.is_thread_bound() {
            (self.tid, None)
        } else {
            (None, Some(0))
        };
        self.group.init(events, tid, cpu)
    }

    pub fn start(&mut self) -> Result<()> {
        self.group.start()
    }

    /// Disable the group and flush scope sums into the result series.
    pub fn stop(&mut self) -> Result<()> {
        let stopped = self.group.stop();
        self.scope_mask = None;
        self.scope.flush_into(&self.event_names, &mut self.results);
        stopped
    }

    /// Read and reset the group, appending one entry to every series.
    ///
    /// A failed read appends zeros so all series stay the same length.
    pub fn collect(&mut self, now: i64) -> Result<()> {
        let outcome = self.group.collect(now);
        let snap = match &outcome {
            Ok(snap) => *snap,
            Err(_) => Snapshot::zeroed(self.event_names.len()),
        };
        self.update_data(&snap);

        if matches!(self.class, DeviceClass::Cspmu(_)) {
            let sample = ClockSample::now().unwrap_or_else(|e| {
                tracing::warn!("Failed to sample CLOCK_MONOTONIC_RAW: {}", e);
                ClockSample::default()
            });
            self.clocks.push(sample);
        }

        outcome.map(|_| ())
    }

    pub fn update_data(&mut self, snap: &Snapshot) {
        for (index, name) in self.event_names.iter().enumerate() {
            self.results
                .entry(name.clone())
                .or_default()
                .push(snap.value(index));
        }
    }

    /// Whether a scope call for `mask` from thread `tid` reaches this binding.
    pub fn scope_route(&self, mask: ScopeMask, tid: i32) -> Option<bool> {
        route_scope(self.role, self.bound_tid(), mask, tid)
    }

    /// Thread this binding's group follows, `None` for device-wide groups.
    pub fn bound_tid(&self) -> Option<i32> {
        if self.class.is_thread_bound() {
            self.tid
        } else {
            None
        }
    }

    pub fn scope_start(&mut self, scope_id: u16, mask: ScopeMask, width: CounterWidth) -> Result<()> {
        self.group.collect_scope(scope_id, false, width)?;
        self.scope_mask = Some(mask);
        Ok(())
    }

    pub fn scope_stop(
        &mut self,
        scope_id: u16,
        mask: ScopeMask,
        width: CounterWidth,
        is_calling_thread: bool,
    ) -> Result<()> {
        if let Some(open_mask) = self.scope_mask {
            if open_mask != mask {
                return Err(PerfscopeError::ScopeError(format!(
                    "stop of scope {scope_id} with mask {:#x} does not match start mask {:#x}",
                    mask.bits(),
                    open_mask.bits()
                )));
            }
        }

        let start = self.group.last_snap();
        let stop = self.group.collect_scope(scope_id, true, width)?;
        self.scope_mask = None;
        self.update_data_scope(scope_id, is_calling_thread, &start, &stop);
        Ok(())
    }

    pub fn update_data_scope(
        &mut self,
        scope_id: u16,
        is_calling_thread: bool,
        start: &Snapshot,
        stop: &Snapshot,
    ) {
        self.scope.record(scope_id, is_calling_thread, start, stop);
    }

    /// Merge every series into `value`, summing element-wise with series of
    /// the same name already present, and record running totals under `SUM`.
    pub fn postprocess(&self, value: &mut Map<String, Value>) {
        for (name, series) in &self.results {
            let existing: Vec<i64> = value
                .get(name)
                .and_then(Value::as_array)
                .map(|values| values.iter().map(|v| v.as_i64().unwrap_or(0)).collect())
                .unwrap_or_default();

            let len = series.len().max(existing.len());
            let mut merged = Vec::with_capacity(len);
            let mut total = 0i64;
            for index in 0..len {
                let own = series.values().get(index).copied().unwrap_or(0);
                let other = existing.get(index).copied().unwrap_or(0);
                let sum = own.wrapping_add(other);
                merged.push(sum);
                total = total.wrapping_add(sum);
            }

            value.insert(name.clone(), json!(merged));
            let sums = value
                .entry(SUM_KEY)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(sums) = sums {
                sums.insert(name.clone(), json!(total));
            }
        }
    }

    pub fn summarize(&mut self) {
        for series in self.results.values_mut() {
            series.summarize();
        }
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.clocks.clear();
    }

    pub fn deinit(&mut self) {
        self.group.deinit();
        self.scope = ScopeAccumulator::default();
        self.scope_mask = None;
        self.clear();
    }
}
