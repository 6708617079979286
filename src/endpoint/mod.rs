//! Endpoint data model: descriptions of discovered endpoints and the closed
//! set of property value kinds they carry.

mod description;
mod property;
pub use description::*;
pub use property::*;
