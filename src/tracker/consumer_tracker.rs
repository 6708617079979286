use std::sync::Arc;

use tracing::debug;
use tracing::info;

use crate::constants::DISCOVERY_ZOOKEEPER_ID;
use crate::endpoint::Properties;
use crate::endpoint::PropertyValue;
use crate::interest::ConsumerId;
use crate::interest::EndpointListener;
use crate::interest::InterestManager;
use crate::interest::InterestScope;

/// A consumer as announced by the hosting framework.
#[derive(Clone)]
pub struct ConsumerRegistration {
    pub consumer: ConsumerId,
    /// Registration properties, used to recognise discovery's own consumer
    pub properties: Properties,
    pub scope: InterestScope,
    pub listener: Arc<dyn EndpointListener>,
}

impl std::fmt::Debug for ConsumerRegistration {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConsumerRegistration")
            .field("consumer", &self.consumer)
            .field("properties", &self.properties)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ConsumerRegistration {
    /// Whether the consumer is flagged as belonging to discovery itself.
    pub fn is_own(&self) -> bool {
        match self.properties.get(DISCOVERY_ZOOKEEPER_ID) {
            Some(PropertyValue::Boolean(flag)) => *flag,
            Some(PropertyValue::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Consumer lifecycle events
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Appeared(ConsumerRegistration),
    /// Registration properties changed, typically widening or narrowing the
    /// consumer's scope
    Updated(ConsumerRegistration),
    Disappeared(ConsumerId),
}

/// Translates consumer lifecycle events into interest changes. Never fails
/// back into the host.
#[derive(Debug, Clone)]
pub struct ConsumerTracker {
    manager: InterestManager,
}

impl ConsumerTracker {
    pub fn new(manager: InterestManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &InterestManager {
        &self.manager
    }

    pub fn handle(
        &self,
        event: ConsumerEvent,
    ) {
        match event {
            // add_interest on a known consumer is an update, so both
            // announcements converge on the latest scope
            ConsumerEvent::Appeared(registration) | ConsumerEvent::Updated(registration) => {
                self.register(registration)
            }
            ConsumerEvent::Disappeared(consumer) => {
                info!(%consumer, "removing consumer interest");
                self.manager.remove_interest(consumer);
            }
        }
    }

    fn register(
        &self,
        registration: ConsumerRegistration,
    ) {
        if registration.is_own() {
            debug!(consumer = %registration.consumer, "skipping discovery's own consumer");
            return;
        }

        info!(
            consumer = %registration.consumer,
            interfaces = ?registration.scope.interfaces,
            "updating consumer interest"
        );
        debug!(consumer = %registration.consumer, properties = ?registration.properties, "consumer properties");
        self.manager
            .add_interest(registration.consumer, registration.scope, registration.listener);
    }
}
