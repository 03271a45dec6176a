// Requested hardware counters

use perfscope_raw::{CounterAttr, CounterWidth};

/// Device key of events counted on the default CPU PMU.
pub const DEFAULT_DEVICE: &str = "single";

/// One requested hardware counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Unique within its counter group; also the result series name.
    pub name: String,
    pub type_: u32,
    /// Raw hardware code or packed interconnect descriptor.
    pub config: u64,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub width: CounterWidth,
    pub inherited: bool,
    /// Device key: [`DEFAULT_DEVICE`] or a PMU name under the sysfs device registry.
    pub device: String,
    pub booker_ci: bool,
    pub cspmu: bool,
}

impl Event {
    pub fn new(name: impl Into<String>, type_: u32, config: u64) -> Self {
        Self {
            name: name.into(),
            type_,
            config,
            exclude_user: false,
            exclude_kernel: false,
            width: CounterWidth::Bits32,
            inherited: true,
            device: DEFAULT_DEVICE.to_string(),
            booker_ci: false,
            cspmu: false,
        }
    }

    pub fn is_default_device(&self) -> bool {
        self.device == DEFAULT_DEVICE
    }

    /// perf_event attributes used to open this event.
    pub fn attr(&self) -> CounterAttr {
        CounterAttr {
            type_: self.type_,
            config: self.config,
            counter_64bit: self.width == CounterWidth::Bits64,
            inherit: self.inherited,
            exclude_user: self.exclude_user,
            exclude_kernel: self.exclude_kernel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_follows_event_flags() {
        let mut event = Event::new("CPUCyclesUser", perfscope_raw::PERF_TYPE_RAW, 0x11);
        event.exclude_kernel = true;
        event.width = CounterWidth::Bits64;
        event.inherited = false;

        let attr = event.attr();
        assert_eq!(attr.type_, perfscope_raw::PERF_TYPE_RAW);
        assert_eq!(attr.config, 0x11);
        assert!(attr.counter_64bit);
        assert!(attr.exclude_kernel);
        assert!(!attr.exclude_user);
        assert!(!attr.inherit);
    }
}
