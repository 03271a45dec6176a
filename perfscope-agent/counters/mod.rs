pub mod binding;
pub mod device;
pub mod discovery;
pub mod event;
pub mod events;
pub mod group;
pub mod interconnect;

pub use binding::{PerThreadBinding, ScopeAccumulator};
pub use device::{DeviceClass, ScopeMask, ThreadRole};
pub use event::{Event, DEFAULT_DEVICE};
pub use group::{CounterGroup, Snapshot};
pub use interconnect::{CmnEventConfig, NodeType};
