//! Assembles an [`InterestManager`].
//!
//! ## Example
//! ```ignore
//! let client = Arc::new(MemoryCoordinationClient::default());
//! let manager = InterestManager::builder(client)
//!     .settings(DiscoverySettings::new()?)
//!     .own_consumer(ConsumerId(0))
//!     .build()?;
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use super::ConsumerId;
use super::InterestManager;
use crate::coordination::CoordinationClient;
use crate::metrics::register_custom_metrics;
use crate::DiscoverySettings;
use crate::Error;
use crate::Result;

pub struct InterestManagerBuilder {
    client: Arc<dyn CoordinationClient>,
    settings: DiscoverySettings,
    own_consumer: Option<ConsumerId>,
    runtime: Option<Handle>,
}

impl InterestManagerBuilder {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self {
            client,
            settings: DiscoverySettings::default(),
            own_consumer: None,
            runtime: None,
        }
    }

    pub fn settings(
        mut self,
        settings: DiscoverySettings,
    ) -> Self {
        self.settings = settings;
        self
    }

    /// Consumer id of the discovery component itself; its interest is
    /// never registered.
    pub fn own_consumer(
        mut self,
        consumer: ConsumerId,
    ) -> Self {
        self.own_consumer = Some(consumer);
        self
    }

    /// Runtime for monitor and delivery tasks. Defaults to the runtime the
    /// builder is called from.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<InterestManager> {
        let settings = self.settings.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| Error::Fatal(format!("interest manager needs a tokio runtime: {e}")))?,
        };
        register_custom_metrics();

        info!(
            root_path = %settings.discovery.root_path,
            own_consumer = ?self.own_consumer,
            "interest manager started"
        );
        Ok(InterestManager::new(self.client, settings, self.own_consumer, runtime))
    }
}
