use std::arch::asm;

use crate::CounterWidth;

pub(super) const SUPPORTED: bool = true;

#[inline]
pub(super) fn read_cycle_counter(_width: CounterWidth) -> Option<u64> {
    let lo: u32;
    let hi: u32;
    unsafe {
        asm!("mrrc p15, 0, {}, {}, c9", out(reg) lo, out(reg) hi, options(nomem, nostack));
    }
    Some((u64::from(hi) << 32) | u64::from(lo))
}

pub(super) fn user_access_register() -> Option<u64> {
    let value: u32;
    unsafe { asm!("mrc p15, 0, {}, c9, c14, 0", out(reg) value, options(nomem, nostack)) };
    Some(u64::from(value))
}

pub(super) fn control_register() -> Option<u64> {
    let value: u32;
    unsafe { asm!("mrc p15, 0, {}, c9, c12, 0", out(reg) value, options(nomem, nostack)) };
    Some(u64::from(value))
}

pub(super) fn pause_counters() -> Option<u64> {
    let enabled: u32;
    unsafe {
        asm!("mrc p15, 0, {}, c9, c12, 1", out(reg) enabled, options(nomem, nostack));
        asm!("mcr p15, 0, {}, c9, c12, 2", "isb", in(reg) enabled, options(nostack));
    }
    Some(u64::from(enabled))
}

pub(super) fn resume_counters(mask: u64) {
    let mask = mask as u32;
    unsafe { asm!("mcr p15, 0, {}, c9, c12, 1", "isb", in(reg) mask, options(nostack)) };
}
