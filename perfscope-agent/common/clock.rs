use nix::time::{clock_gettime, ClockId};

use crate::error::Result;

/// One `CLOCK_MONOTONIC_RAW` reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockSample {
    pub sec: i64,
    pub nsec: i64,
}

impl ClockSample {
    pub fn now() -> Result<Self> {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC_RAW)?;
        Ok(Self {
            sec: ts.tv_sec() as i64,
            nsec: ts.tv_nsec() as i64,
        })
    }

    pub fn as_nanos(&self) -> i128 {
        self.sec as i128 * 1_000_000_000 + self.nsec as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_samples_do_not_go_backwards() {
        let first = ClockSample::now().unwrap();
        let second = ClockSample::now().unwrap();
        assert!(second.as_nanos() >= first.as_nanos());
        assert!((0..1_000_000_000).contains(&first.nsec));
    }
}
