// Thread discovery: decide which bindings an event plan needs

use std::path::Path;

use crate::common::thread::{self, ThreadInfo};
use crate::config::EventPlan;
use crate::counters::binding::PerThreadBinding;
use crate::counters::device::{DeviceClass, ThreadRole};
use crate::error::Result;

/// Threads running the instrumented workload.
pub const REPLAY_PREFIX: &str = "patrace-";

/// Graphics driver and compositor threads.
pub const BACKGROUND_PREFIXES: [&str; 2] = ["mali-", "ANGLE-"];

pub fn is_replay_thread(name: &str) -> bool {
    name.starts_with(REPLAY_PREFIX)
}

pub fn is_background_thread(name: &str) -> bool {
    BACKGROUND_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// A binding to be created, before its group is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub tid: Option<i32>,
    pub name: String,
    pub role: ThreadRole,
    pub class: DeviceClass,
}

impl BindingSpec {
    pub fn into_binding(self) -> PerThreadBinding {
        PerThreadBinding::new(self.tid, self.name, self.role, self.class)
    }
}

/// Bindings for `plan` given the live `threads` of a process named `process_name`.
///
/// CSPMU devices only count system-wide, so configured CSPMU events replace
/// thread discovery with one device-wide binding per device. Otherwise every
/// replay thread (and, with `all_thread`, every background thread) gets one
/// binding per device key, followed by a single interconnect binding when
/// interconnect events are configured.
pub fn plan_bindings(plan: &EventPlan, threads: &[ThreadInfo], process_name: &str) -> Vec<BindingSpec> {
    if !plan.cspmu_events.is_empty() {
        return plan
            .cspmu_events
            .keys()
            .map(|device| BindingSpec {
                tid: None,
                name: process_name.to_string(),
                role: ThreadRole::Cspmu,
                class: DeviceClass::Cspmu(device.clone()),
            })
            .collect();
    }

    let mut replay = Vec::new();
    let mut background = Vec::new();
    for thread in threads {
        let role = if is_replay_thread(&thread.name) {
            ThreadRole::Replay
        } else if plan.all_thread && is_background_thread(&thread.name) {
            ThreadRole::Background
        } else {
            continue;
        };
        let target = if role == ThreadRole::Replay {
            &mut replay
        } else {
            &mut background
        };
        for device in plan.device_events.keys() {
            target.push(BindingSpec {
                tid: Some(thread.tid),
                name: thread.name.clone(),
                role,
                class: DeviceClass::for_device_key(device),
            });
        }
    }

    let mut specs = replay;
    specs.append(&mut background);
    if !plan.booker_events.is_empty() {
        specs.push(BindingSpec {
            tid: None,
            name: process_name.to_string(),
            role: ThreadRole::Interconnect,
            class: DeviceClass::Interconnect,
        });
    }
    specs
}

/// Scan `task_dir` and plan the bindings for the current process.
pub fn discover(plan: &EventPlan, task_dir: &Path) -> Result<Vec<BindingSpec>> {
    let process_name = thread::process_name();
    let threads = if plan.cspmu_events.is_empty() {
        thread::list_threads(task_dir)?
    } else {
        Vec::new()
    };

    let specs = plan_bindings(plan, &threads, &process_name);
    tracing::debug!(
        "Discovered {} bindings from {} threads",
        specs.len(),
        threads.len()
    );
    Ok(specs)
}
