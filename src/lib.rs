//! Broker-less remote endpoint discovery over a hierarchical coordination
//! tree.
//!
//! Consumers register interest (interface names plus an optional property
//! filter) with an [`InterestManager`]. The manager keeps exactly one
//! [`InterfaceMonitor`] per interface somebody is interested in; each monitor
//! mirrors its subtree of the coordination tree and reports endpoints
//! appearing, vanishing and changing. The manager fans these out to the
//! matching consumers' [`EndpointListener`]s.
//!
//! ```text
//! host ──► ConsumerTracker ──► InterestManager ──► InterfaceMonitor ──► CoordinationClient
//!                                     │                    │
//!           EndpointListener ◄── fan-out ◄──── appeared / vanished / modified
//! ```

pub mod config;
pub mod constants;
pub mod coordination;
pub mod endpoint;
mod errors;
pub mod interest;
pub mod metrics;
pub mod monitor;
pub mod tracker;

pub use self::config::*;
pub use coordination::CoordinationClient;
pub use coordination::MemoryCoordinationClient;
pub use endpoint::EndpointDescription;
pub use endpoint::PropertyValue;
pub use errors::*;
pub use interest::*;
pub use monitor::InterfaceMonitor;
pub use tracker::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
