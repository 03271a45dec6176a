// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prom;

pub use config::{DeviceRegistry, EventPlan, PerfConfig};
pub use counters::{DeviceClass, Event, ScopeMask, ThreadRole};
pub use error::{PerfscopeError, Result};
pub use orchestrator::{Collector, EngineState, PerfCollector};
pub use prom::PerfMetricExporter;
