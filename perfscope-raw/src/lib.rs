//! # perfscope-raw
//!
//! Low-level access to the Linux perf_event subsystem and to the PMU
//! registers that user space may touch directly.
//!
//! This crate keeps every `unsafe` syscall and every architecture-specific
//! register read in one place, so the engine built on top of it stays
//! platform independent:
//!
//! - [`sys`] opens perf_event counters as read groups over owned file
//!   descriptors and drives the group ioctls (reset/enable/disable/read).
//! - [`arch`] is the platform capability layer: direct cycle counter reads,
//!   the EL0 access check and the counter-enable pause guard. Only this
//!   module is `cfg(target_arch)` dependent.
//! - [`register`] provides [`ConfigLayout`] for typed, bit-packed
//!   configuration words.
//!
//! ## Usage
//!
//! ```ignore
//! use perfscope_raw::sys::{self, CounterAttr};
//!
//! let attr = CounterAttr::hardware(perfscope_raw::PERF_COUNT_HW_CPU_CYCLES);
//! let leader = sys::open_counter(&attr, 0, -1, None)?;
//! sys::reset_group(leader.as_fd())?;
//! sys::enable_group(leader.as_fd())?;
//! ```

pub mod arch;
pub mod register;
pub mod sys;

pub use arch::{CounterPause, UserAccess};
pub use register::ConfigLayout;
pub use sys::{CounterAttr, Result, SysError};

use perf_event_open_sys::bindings;

/// Width of a hardware event counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CounterWidth {
    #[default]
    Bits32,
    Bits64,
}

impl CounterWidth {
    pub fn bits(&self) -> u32 {
        match self {
            CounterWidth::Bits32 => 32,
            CounterWidth::Bits64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(CounterWidth::Bits32),
            64 => Some(CounterWidth::Bits64),
            _ => None,
        }
    }
}

// Counter families
pub const PERF_TYPE_HARDWARE: u32 = bindings::PERF_TYPE_HARDWARE;
pub const PERF_TYPE_RAW: u32 = bindings::PERF_TYPE_RAW;

// Generalized hardware events (PERF_TYPE_HARDWARE configs)
pub const PERF_COUNT_HW_CPU_CYCLES: u64 = bindings::PERF_COUNT_HW_CPU_CYCLES as u64;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = bindings::PERF_COUNT_HW_INSTRUCTIONS as u64;
pub const PERF_COUNT_HW_CACHE_REFERENCES: u64 = bindings::PERF_COUNT_HW_CACHE_REFERENCES as u64;
pub const PERF_COUNT_HW_CACHE_MISSES: u64 = bindings::PERF_COUNT_HW_CACHE_MISSES as u64;
pub const PERF_COUNT_HW_BRANCH_MISSES: u64 = bindings::PERF_COUNT_HW_BRANCH_MISSES as u64;
