use once_cell::sync::Lazy;

pub mod clock;
pub mod thread;

pub use clock::ClockSample;
pub use thread::{current_tid, ThreadInfo};

/// Width of the PMU event counters, read once from the control register.
///
/// Reading the register needs user-space PMU access, so only touch this in
/// per-API mode.
pub static PMU_COUNTER_BITS: Lazy<Option<u32>> = Lazy::new(perfscope_raw::arch::pmu_counter_bits);
