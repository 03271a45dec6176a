use crate::CounterWidth;

pub(super) const SUPPORTED: bool = false;

#[inline]
pub(super) fn read_cycle_counter(_width: CounterWidth) -> Option<u64> {
    None
}

pub(super) fn user_access_register() -> Option<u64> {
    None
}

pub(super) fn control_register() -> Option<u64> {
    None
}

pub(super) fn pause_counters() -> Option<u64> {
    None
}

pub(super) fn resume_counters(_mask: u64) {}
