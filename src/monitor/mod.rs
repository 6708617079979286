//! Per-interface subtree monitoring: snapshots, diffs and the monitor task.

mod interface_monitor;
mod snapshot;
pub use interface_monitor::*;
pub use snapshot::*;
