//! Helpers shared by the unit tests: logger setup, tree publishing helpers
//! and a listener that records what it is told.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::constants::DEFAULT_ROOT_PATH;
use crate::constants::ENDPOINT_ID;
use crate::coordination::child_path;
use crate::coordination::interface_path;
use crate::coordination::MemoryCoordinationClient;
use crate::endpoint::EndpointDescription;
use crate::interest::EndpointEvent;
use crate::interest::EndpointListener;
use crate::Result;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Lets spawned tasks drain their queues; used before asserting that
/// nothing (more) happened.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn endpoint(
    interface: &str,
    id: &str,
) -> EndpointDescription {
    EndpointDescription::new(interface).with_property(ENDPOINT_ID, id)
}

/// Path of `node` under the default root for `interface`.
pub fn node_path(
    interface: &str,
    node: &str,
) -> String {
    child_path(&interface_path(DEFAULT_ROOT_PATH, interface), node)
}

/// Publishes `description` under its first interface.
pub fn publish(
    client: &MemoryCoordinationClient,
    node: &str,
    description: &EndpointDescription,
) {
    let interface = description.provided_interfaces().iter().next().expect("at least one interface");
    let payload = description.to_bytes().expect("encode endpoint");
    client.create_node(&node_path(interface, node), payload).expect("publish endpoint");
}

pub fn republish(
    client: &MemoryCoordinationClient,
    node: &str,
    description: &EndpointDescription,
) {
    let interface = description.provided_interfaces().iter().next().expect("at least one interface");
    let payload = description.to_bytes().expect("encode endpoint");
    client.set_data(&node_path(interface, node), payload).expect("republish endpoint");
}

pub fn unpublish(
    client: &MemoryCoordinationClient,
    interface: &str,
    node: &str,
) {
    client.delete_node(&node_path(interface, node)).expect("unpublish endpoint");
}

/// Listener recording every notification in arrival order
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<EndpointEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EndpointEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub async fn wait_for(
        &self,
        count: usize,
    ) -> Vec<EndpointEvent> {
        assert!(
            wait_until(|| self.len() >= count).await,
            "expected {} notifications, got {:?}",
            count,
            self.events()
        );
        self.events()
    }
}

#[async_trait]
impl EndpointListener for RecordingListener {
    async fn endpoint_added(
        &self,
        endpoint: Arc<EndpointDescription>,
    ) -> Result<()> {
        self.events.lock().push(EndpointEvent::Added(endpoint));
        Ok(())
    }

    async fn endpoint_removed(
        &self,
        endpoint: Arc<EndpointDescription>,
    ) -> Result<()> {
        self.events.lock().push(EndpointEvent::Removed(endpoint));
        Ok(())
    }

    async fn endpoint_modified(
        &self,
        old: Arc<EndpointDescription>,
        new: Arc<EndpointDescription>,
    ) -> Result<()> {
        self.events.lock().push(EndpointEvent::Modified { old, new });
        Ok(())
    }
}
