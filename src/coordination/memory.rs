//! In-process coordination tree.
//!
//! Nodes live in an ordered map keyed by absolute path; watchers are grouped
//! by watched path in a `DashMap`, the same layout as a key watch registry.
//! Notifications are pushed with `try_send`: when a watcher's buffer is full
//! it already holds a pending notification, and every notification makes the
//! monitor re-read the whole subtree, so nothing is lost by dropping.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;

use super::child_path;
use super::node_name;
use super::parent_path;
use super::validate_path;
use super::ChangeEvent;
use super::ChildWatch;
use super::CoordinationClient;
use super::WatchId;
use crate::CoordinationError;
use crate::DiscoveryConfig;
use crate::Result;

#[derive(Debug)]
struct Watcher {
    id: WatchId,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Debug)]
struct MemoryTree {
    /// Absolute path -> payload
    nodes: RwLock<BTreeMap<String, Bytes>>,

    /// Watchers grouped by watched path
    watchers: DashMap<String, Vec<Watcher>>,

    /// Watch id -> watched path, for unwatch
    watch_paths: DashMap<WatchId, String>,

    next_id: AtomicU64,

    buffer_size: usize,
}

/// In-memory [`CoordinationClient`] with tree mutation helpers.
///
/// Cloning is cheap and clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemoryCoordinationClient {
    inner: Arc<MemoryTree>,
}

impl Default for MemoryCoordinationClient {
    fn default() -> Self {
        Self::new(128)
    }
}

impl MemoryCoordinationClient {
    /// `buffer_size` bounds each watcher's pending notifications.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(MemoryTree {
                nodes: RwLock::new(BTreeMap::new()),
                watchers: DashMap::new(),
                watch_paths: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Client sized from the discovery configuration.
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.watch_buffer_size)
    }

    /// Creates a node, creating missing ancestors with empty payloads.
    pub fn create_node(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        validate_path(path)?;
        let mut created = Vec::new();
        {
            let mut nodes = self.inner.nodes.write();
            if nodes.contains_key(path) {
                return Err(CoordinationError::NodeExists(path.to_string()).into());
            }

            let mut ancestor = parent_path(path);
            while let Some(p) = ancestor {
                if p == "/" || nodes.contains_key(p) {
                    break;
                }
                nodes.insert(p.to_string(), Bytes::new());
                created.push(p.to_string());
                ancestor = parent_path(p);
            }

            created.reverse();
            nodes.insert(path.to_string(), data.into());
            created.push(path.to_string());
        }

        // Outermost ancestor first, so watchers observe creation top-down
        for p in created.iter() {
            if let Some(parent) = parent_path(p) {
                self.notify_children_changed(parent);
            }
        }
        trace!(path, "node created");
        Ok(())
    }

    /// Replaces the payload of an existing node.
    pub fn set_data(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        validate_path(path)?;
        {
            let mut nodes = self.inner.nodes.write();
            match nodes.get_mut(path) {
                Some(existing) => *existing = data.into(),
                None => return Err(CoordinationError::NoNode(path.to_string()).into()),
            }
        }

        if let Some(parent) = parent_path(path) {
            self.notify(parent, ChangeEvent::DataChanged(node_name(path).to_string()));
        }
        trace!(path, "node data set");
        Ok(())
    }

    /// Deletes a node and everything below it.
    pub fn delete_node(
        &self,
        path: &str,
    ) -> Result<()> {
        validate_path(path)?;
        {
            let mut nodes = self.inner.nodes.write();
            if nodes.remove(path).is_none() {
                return Err(CoordinationError::NoNode(path.to_string()).into());
            }
            let prefix = child_path(path, "");
            nodes.retain(|k, _| !k.starts_with(&prefix));
        }

        if let Some(parent) = parent_path(path) {
            self.notify_children_changed(parent);
        }
        trace!(path, "node deleted");
        Ok(())
    }

    pub fn exists(
        &self,
        path: &str,
    ) -> bool {
        self.inner.nodes.read().contains_key(path)
    }

    /// Simulates session loss: every watcher receives
    /// [`ChangeEvent::SessionExpired`] and all watches are dropped.
    pub fn expire_session(&self) {
        let paths: Vec<String> = self.inner.watchers.iter().map(|e| e.key().clone()).collect();
        for path in paths {
            if let Some((_, watchers)) = self.inner.watchers.remove(&path) {
                for w in watchers {
                    let _ = w.sender.try_send(ChangeEvent::SessionExpired);
                    self.inner.watch_paths.remove(&w.id);
                }
            }
        }
        debug!("coordination session expired, all watches dropped");
    }

    /// Number of active watches on `path`.
    pub fn watch_count(
        &self,
        path: &str,
    ) -> usize {
        self.inner.watchers.get(path).map(|w| w.len()).unwrap_or(0)
    }

    /// Number of active watches on any path.
    pub fn total_watch_count(&self) -> usize {
        self.inner.watch_paths.len()
    }

    fn children_of(
        nodes: &BTreeMap<String, Bytes>,
        path: &str,
    ) -> Vec<String> {
        let prefix = child_path(path, "");
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn notify_children_changed(
        &self,
        path: &str,
    ) {
        if !self.inner.watchers.contains_key(path) {
            return;
        }
        let children = Self::children_of(&self.inner.nodes.read(), path);
        self.notify(path, ChangeEvent::ChildrenChanged(children));
    }

    fn notify(
        &self,
        path: &str,
        event: ChangeEvent,
    ) {
        if let Some(mut watchers) = self.inner.watchers.get_mut(path) {
            // Drop watchers whose receiver is gone
            watchers.retain(|w| {
                let open = !w.sender.is_closed();
                if !open {
                    self.inner.watch_paths.remove(&w.id);
                }
                open
            });
            for w in watchers.iter() {
                let _ = w.sender.try_send(event.clone());
            }
            trace!(path, ?event, watchers = watchers.len(), "change dispatched");
        }
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinationClient {
    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<ChildWatch> {
        validate_path(path)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, events) = mpsc::channel(self.inner.buffer_size);

        self.inner
            .watchers
            .entry(path.to_string())
            .or_default()
            .push(Watcher { id, sender });
        self.inner.watch_paths.insert(id, path.to_string());

        trace!(watch_id = id, path, "children watch registered");
        Ok(ChildWatch { id, events })
    }

    async fn list_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        validate_path(path)?;
        let nodes = self.inner.nodes.read();
        if path != "/" && !nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()).into());
        }
        Ok(Self::children_of(&nodes, path))
    }

    async fn read_node(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>> {
        validate_path(path)?;
        Ok(self.inner.nodes.read().get(path).cloned())
    }

    async fn unwatch(
        &self,
        watch_id: WatchId,
    ) {
        if let Some((_, path)) = self.inner.watch_paths.remove(&watch_id) {
            self.inner.watchers.remove_if_mut(&path, |_path, watchers| {
                watchers.retain(|w| w.id != watch_id);
                watchers.is_empty()
            });
            trace!(watch_id, path = %path, "children watch released");
        }
    }
}
