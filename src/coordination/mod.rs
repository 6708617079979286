//! Coordination tree access.
//!
//! The discovery engine only needs three primitives from the coordination
//! service: a persistent children watch, a children listing and a node read.
//! [`CoordinationClient`] captures them; connection management, session
//! re-establishment and retries stay inside the implementation.
//!
//! [`MemoryCoordinationClient`] is an in-process tree implementing the same
//! contract, used by the test suites and by embedded single-process setups.

mod memory;
mod path;
pub use memory::*;
pub use path::*;


use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::Result;

/// Identifier of a registered children watch
pub type WatchId = u64;

/// Raw change notification delivered for a watched path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A child was created or deleted; carries the current child names
    ChildrenChanged(Vec<String>),
    /// The payload of the named child changed
    DataChanged(String),
    /// The client session was lost. The watch is gone and must be
    /// re-established.
    SessionExpired,
}

/// A registered children watch and its notification stream.
///
/// The stream ending (`recv()` returning `None`) means the watch was dropped
/// by the client and has the same meaning as [`ChangeEvent::SessionExpired`].
#[derive(Debug)]
pub struct ChildWatch {
    pub id: WatchId,
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Contract consumed from the physical coordination-service client.
///
/// # Thread Safety Requirements
///
/// Implementations are shared between every interface monitor and are called
/// concurrently from their tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Registers a persistent watch on `path`. The returned stream fires on
    /// any child creation or deletion under `path` and on payload changes of
    /// its direct children. The path does not need to exist yet.
    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<ChildWatch>;

    /// Names (not paths) of the direct children of `path`.
    /// Fails with `CoordinationError::NoNode` when `path` does not exist.
    async fn list_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>>;

    /// Payload of the node at `path`, `None` if the node does not exist.
    async fn read_node(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>>;

    /// Releases a watch. Unknown ids are ignored.
    async fn unwatch(
        &self,
        watch_id: WatchId,
    );
}
