//! Consumer interest: scopes, listeners and the reconciliation engine that
//! maps them onto interface monitors.

mod builder;
mod filter;
mod listener;
mod manager;
mod scope;
pub use builder::*;
pub use filter::*;
pub use listener::*;
pub use manager::*;
pub use scope::*;

#[cfg(test)]
mod filter_test;
