// Reserved counter sets
//
// Sets 1-3 use Armv8 PMUv3 common event numbers and only open on Arm cores;
// set 0 uses generalized hardware events and works everywhere.

use perfscope_raw::{
    CounterWidth, PERF_COUNT_HW_BRANCH_MISSES, PERF_COUNT_HW_CACHE_MISSES,
    PERF_COUNT_HW_CACHE_REFERENCES, PERF_COUNT_HW_CPU_CYCLES, PERF_COUNT_HW_INSTRUCTIONS,
    PERF_TYPE_HARDWARE, PERF_TYPE_RAW,
};

use crate::counters::event::Event;

#[derive(Debug, Clone, Copy)]
pub struct SetEvent {
    pub name: &'static str,
    pub type_: u32,
    pub config: u64,
}

const fn hw(name: &'static str, config: u64) -> SetEvent {
    SetEvent {
        name,
        type_: PERF_TYPE_HARDWARE,
        config,
    }
}

const fn raw(name: &'static str, config: u64) -> SetEvent {
    SetEvent {
        name,
        type_: PERF_TYPE_RAW,
        config,
    }
}

/// Name of the implicit cycle-count leader.
pub const CYCLE_LEADER: &str = "CPUCycleCount";

pub const SET_0: &[SetEvent] = &[
    hw("CPUInstructionRetired", PERF_COUNT_HW_INSTRUCTIONS),
    hw("CPUCacheReferences", PERF_COUNT_HW_CACHE_REFERENCES),
    hw("CPUCacheMisses", PERF_COUNT_HW_CACHE_MISSES),
    hw("CPUBranchMispredictions", PERF_COUNT_HW_BRANCH_MISSES),
];

pub const SET_1: &[SetEvent] = &[
    raw("CPUInstructionRetired", 0x08),
    raw("CPUL1CacheAccesses", 0x04),
    raw("CPUL2CacheAccesses", 0x16),
    raw("CPULASESpec", 0x74),
    raw("CPUVFPSpec", 0x75),
    raw("CPUCryptoSpec", 0x77),
];

pub const SET_2: &[SetEvent] = &[
    raw("CPUL3CacheAccesses", 0x2B),
    raw("CPUBusAccessRead", 0x60),
    raw("CPUBusAccessWrite", 0x61),
    raw("CPUMemoryAccessRead", 0x66),
    raw("CPUMemoryAccessWrite", 0x67),
];

pub const SET_3: &[SetEvent] = &[
    raw("CPUBusAccesses", 0x19),
    raw("CPUL2CacheRead", 0x50),
    raw("CPUL2CacheWrite", 0x51),
    raw("CPUMemoryAccessRead", 0x66),
    raw("CPUMemoryAccessWrite", 0x67),
];

/// Events of reserved set `set`, or `None` outside 0-3.
pub fn reserved_set(set: i64) -> Option<&'static [SetEvent]> {
    match set {
        0 => Some(SET_0),
        1 => Some(SET_1),
        2 => Some(SET_2),
        3 => Some(SET_3),
        _ => None,
    }
}

/// The cycle counter that leads every default-device group.
pub fn cycle_leader(width: CounterWidth, inherited: bool) -> Event {
    let mut leader = Event::new(CYCLE_LEADER, PERF_TYPE_HARDWARE, PERF_COUNT_HW_CPU_CYCLES);
    leader.width = width;
    leader.inherited = inherited;
    leader
}

/// Leader followed by the events of reserved set `set`.
pub fn reserved_set_events(set: i64, inherited: bool) -> Option<Vec<Event>> {
    let table = reserved_set(set)?;
    let mut events = vec![cycle_leader(CounterWidth::Bits32, inherited)];
    events.extend(table.iter().map(|e| {
        let mut event = Event::new(e.name, e.type_, e.config);
        event.inherited = inherited;
        event
    }));
    Some(events)
}
