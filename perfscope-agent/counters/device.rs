// Device classes and scope routing

use bitflags::bitflags;

use crate::counters::event::DEFAULT_DEVICE;

/// Which counter family a binding's group is opened against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Default CPU PMU, no device discrimination.
    Single,
    /// One per distinct per-cluster PMU device.
    MultiPmu(String),
    /// Device-wide coherent subsystem PMU, never bound to a thread.
    Cspmu(String),
    /// Coherent interconnect ("booker") node counters.
    Interconnect,
}

impl DeviceClass {
    /// Class of a per-thread event group keyed by `device`.
    pub fn for_device_key(device: &str) -> Self {
        if device == DEFAULT_DEVICE {
            DeviceClass::Single
        } else {
            DeviceClass::MultiPmu(device.to_string())
        }
    }

    pub fn device_label(&self) -> &str {
        match self {
            DeviceClass::Single => DEFAULT_DEVICE,
            DeviceClass::MultiPmu(device) | DeviceClass::Cspmu(device) => device,
            DeviceClass::Interconnect => "booker-ci",
        }
    }

    pub fn is_thread_bound(&self) -> bool {
        matches!(self, DeviceClass::Single | DeviceClass::MultiPmu(_))
    }
}

/// Why a binding exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThreadRole {
    /// Thread running the instrumented workload.
    Replay,
    /// Graphics driver or compositor thread.
    Background,
    /// Interconnect group for the whole process.
    Interconnect,
    /// Device-wide CSPMU group.
    Cspmu,
}

bitflags! {
    /// Selects the bindings a scope start/stop pair is routed to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScopeMask: u32 {
        const REPLAY_THREADS = 1 << 0;
        const BACKGROUND_THREADS = 1 << 1;
        const INTERCONNECT = 1 << 2;
        const CSPMU = 1 << 3;
        const ALL_THREADS = Self::REPLAY_THREADS.bits() | Self::BACKGROUND_THREADS.bits();
    }
}

impl ThreadRole {
    pub fn scope_bit(&self) -> ScopeMask {
        match self {
            ThreadRole::Replay => ScopeMask::REPLAY_THREADS,
            ThreadRole::Background => ScopeMask::BACKGROUND_THREADS,
            ThreadRole::Interconnect => ScopeMask::INTERCONNECT,
            ThreadRole::Cspmu => ScopeMask::CSPMU,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_classification() {
        assert_eq!(DeviceClass::for_device_key("single"), DeviceClass::Single);
        assert_eq!(
            DeviceClass::for_device_key("armv8_pmuv3_0"),
            DeviceClass::MultiPmu("armv8_pmuv3_0".to_string())
        );
        assert!(DeviceClass::Single.is_thread_bound());
        assert!(!DeviceClass::Cspmu("nvidia_cspmu_0".into()).is_thread_bound());
    }

    #[test]
    fn test_all_threads_covers_replay_and_background() {
        assert!(ScopeMask::ALL_THREADS.intersects(ThreadRole::Replay.scope_bit()));
        assert!(ScopeMask::ALL_THREADS.intersects(ThreadRole::Background.scope_bit()));
        assert!(!ScopeMask::ALL_THREADS.intersects(ThreadRole::Cspmu.scope_bit()));
    }
}
