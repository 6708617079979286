#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use endpoint_discovery::constants::ENDPOINT_ID;
use endpoint_discovery::coordination::child_path;
use endpoint_discovery::coordination::interface_path;
use endpoint_discovery::EndpointDescription;
use endpoint_discovery::EndpointEvent;
use endpoint_discovery::EndpointListener;
use endpoint_discovery::MemoryCoordinationClient;
use endpoint_discovery::Result;
use parking_lot::Mutex;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

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

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn endpoint(
    interface: &str,
    id: &str,
) -> EndpointDescription {
    EndpointDescription::new(interface).with_property(ENDPOINT_ID, id)
}

/// Publishing side of the tree, bound to one root path.
pub struct Publisher {
    pub client: MemoryCoordinationClient,
    pub root: String,
}

impl Publisher {
    pub fn new(
        client: &MemoryCoordinationClient,
        root: &str,
    ) -> Self {
        Self {
            client: client.clone(),
            root: root.to_string(),
        }
    }

    fn path(
        &self,
        interface: &str,
        node: &str,
    ) -> String {
        child_path(&interface_path(&self.root, interface), node)
    }

    fn interface_of(description: &EndpointDescription) -> String {
        description.provided_interfaces().iter().next().cloned().expect("interface")
    }

    pub fn publish(
        &self,
        node: &str,
        description: &EndpointDescription,
    ) {
        let path = self.path(&Self::interface_of(description), node);
        self.client
            .create_node(&path, description.to_bytes().unwrap())
            .unwrap();
    }

    pub fn republish(
        &self,
        node: &str,
        description: &EndpointDescription,
    ) {
        let path = self.path(&Self::interface_of(description), node);
        self.client.set_data(&path, description.to_bytes().unwrap()).unwrap();
    }

    pub fn unpublish(
        &self,
        interface: &str,
        node: &str,
    ) {
        self.client.delete_node(&self.path(interface, node)).unwrap();
    }
}

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
