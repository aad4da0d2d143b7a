//! Health monitoring
//!
//! `classifier` holds the debounce rules; `monitor` runs the concurrent
//! probe cycle and commits its results.

mod classifier;
mod monitor;

pub use classifier::{classify, DebounceRules};
pub use monitor::{HealthChange, HealthMonitor, MonitorCycle};
