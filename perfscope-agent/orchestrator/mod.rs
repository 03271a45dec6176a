pub mod collector;

pub use collector::{Collector, EngineState, PerfCollector};
