//! Platform capability layer
//!
//! Direct PMU register access that bypasses the perf_event syscalls. The
//! engine only talks to this module through five entry points:
//!
//! - [`read_cycle_counter`] - read the dedicated cycle register in place of a
//!   full group read
//! - [`check_user_access`] - verify user-space (EL0) access to the PMU
//! - [`pmu_counter_bits`] - native counter width reported by the PMU
//! - [`CounterPause`] - save, clear and restore the counter enable bits
//! - [`direct_access_supported`] - whether any of the above do real work
//!
//! ## Supported Architectures
//!
//! - **aarch64** - `PMCCNTR_EL0` / `PMEVCNTR2_EL0`, `PMUSERENR_EL0`, `PMCR_EL0`
//! - **arm** - the CP15 equivalents
//! - everything else falls back to the syscall path
//!
//! Reading these registers from user space traps unless the kernel enabled
//! EL0 access, so callers only reach them in per-API mode after
//! [`check_user_access`] succeeded.

use crate::CounterWidth;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use aarch64 as imp;

#[cfg(target_arch = "arm")]
mod arm;
#[cfg(target_arch = "arm")]
use arm as imp;

#[cfg(not(any(target_arch = "aarch64", target_arch = "arm")))]
mod generic;
#[cfg(not(any(target_arch = "aarch64", target_arch = "arm")))]
use generic as imp;

// PMUSERENR_EL0 bits that must all be set for direct counter access
pub const PMUSERENR_EN: u64 = 1 << 0;
pub const PMUSERENR_CR: u64 = 1 << 2;
pub const PMUSERENR_ER: u64 = 1 << 3;
pub const PMUSERENR_REQUIRED: u64 = PMUSERENR_EN | PMUSERENR_CR | PMUSERENR_ER;

// PMCR_EL0.LC: cycle counter overflows at 64 bits
pub const PMCR_LC: u64 = 1 << 7;

/// Result of probing user-space PMU access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAccess {
    Granted,
    /// Access register value with at least one required bit clear.
    Denied(u64),
    /// No direct register access on this architecture.
    Unsupported,
}

impl UserAccess {
    pub fn from_register(value: u64) -> Self {
        if value & PMUSERENR_REQUIRED == PMUSERENR_REQUIRED {
            UserAccess::Granted
        } else {
            UserAccess::Denied(value)
        }
    }
}

/// Whether this build can read PMU registers directly.
pub const fn direct_access_supported() -> bool {
    imp::SUPPORTED
}

/// Read the cycle register matching `width` without a syscall.
///
/// Returns `None` when the platform has no direct path.
#[inline]
pub fn read_cycle_counter(width: CounterWidth) -> Option<u64> {
    imp::read_cycle_counter(width)
}

/// Probe the user-space access register.
pub fn check_user_access() -> UserAccess {
    match imp::user_access_register() {
        Some(value) => UserAccess::from_register(value),
        None => UserAccess::Unsupported,
    }
}

/// Native PMU counter width, if the platform exposes it.
pub fn pmu_counter_bits() -> Option<u32> {
    imp::control_register().map(|pmcr| if pmcr & PMCR_LC != 0 { 64 } else { 32 })
}

/// Disables the enabled PMU counters for its lifetime
///
/// On creation the current enable mask is saved and cleared; on drop it is
/// written back, so a pause is always symmetric.
pub struct CounterPause {
    saved: Option<u64>,
}

impl CounterPause {
    /// Pause counting when `active`; an inactive guard does nothing.
    pub fn new(active: bool) -> Self {
        let saved = if active { imp::pause_counters() } else { None };
        Self { saved }
    }
}

impl Drop for CounterPause {
    fn drop(&mut self) {
        if let Some(mask) = self.saved.take() {
            imp::resume_counters(mask);
        }
    }
}
