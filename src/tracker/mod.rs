//! Bridge between the hosting framework's consumer lifecycle and the
//! interest manager.

mod consumer_tracker;
pub use consumer_tracker::*;
