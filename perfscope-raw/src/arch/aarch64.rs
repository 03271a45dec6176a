use std::arch::asm;

use crate::CounterWidth;

pub(super) const SUPPORTED: bool = true;

#[inline]
pub(super) fn read_cycle_counter(width: CounterWidth) -> Option<u64> {
    let value: u64;
    // 32-bit PMUs count cycles in PMCCNTR_EL0; with 64-bit event counters
    // the cycle event is chained into event counter 2.
    unsafe {
        match width {
            CounterWidth::Bits32 => {
                asm!("mrs {}, PMCCNTR_EL0", out(reg) value, options(nomem, nostack))
            }
            CounterWidth::Bits64 => {
                asm!("mrs {}, PMEVCNTR2_EL0", out(reg) value, options(nomem, nostack))
            }
        }
    }
    Some(value)
}

pub(super) fn user_access_register() -> Option<u64> {
    let value: u64;
    unsafe { asm!("mrs {}, PMUSERENR_EL0", out(reg) value, options(nomem, nostack)) };
    Some(value)
}

pub(super) fn control_register() -> Option<u64> {
    let value: u64;
    unsafe { asm!("mrs {}, PMCR_EL0", out(reg) value, options(nomem, nostack)) };
    Some(value)
}

pub(super) fn pause_counters() -> Option<u64> {
    let enabled: u64;
    unsafe {
        asm!("mrs {}, PMCNTENSET_EL0", out(reg) enabled, options(nomem, nostack));
        asm!("msr PMCNTENCLR_EL0, {}", "isb", in(reg) enabled, options(nostack));
    }
    Some(enabled)
}

pub(super) fn resume_counters(mask: u64) {
    unsafe { asm!("msr PMCNTENSET_EL0, {}", "isb", in(reg) mask, options(nostack)) };
}
