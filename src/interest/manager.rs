//! Interest-to-watch reconciliation.
//!
//! The manager keeps one [`InterfaceMonitor`] per interface that at least one
//! consumer is interested in, and fans each monitor's events out to the
//! consumers whose scope covers it.
//!
//! # Locking
//!
//! Two levels: each monitor's critical section (diff and dispatch, or replay)
//! and the manager's table lock. The order is always monitor, then tables.
//! The table lock is never held across an `.await`, a coordination call, a
//! monitor start/stop or a listener call.
//!
//! # Exactly-once between replay and live events
//!
//! A consumer only receives live events for an interface once it has been
//! *primed* for it. Priming replays the monitor's snapshot and marks the
//! consumer primed inside the monitor's critical section, so every endpoint
//! is reported either by the replay or by a later diff, never both.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ConsumerId;
use super::Delivery;
use super::EndpointEvent;
use super::EndpointListener;
use super::InterestManagerBuilder;
use super::InterestScope;
use crate::coordination::CoordinationClient;
use crate::metrics::ACTIVE_MONITORS;
use crate::monitor::InterfaceMonitor;
use crate::monitor::MonitorEvent;
use crate::monitor::MonitorSink;
use crate::monitor::Snapshot;
use crate::DiscoverySettings;

struct InterestEntry {
    scope: InterestScope,
    /// Interfaces whose snapshot has been replayed to this consumer
    primed: HashSet<String>,
    delivery: Delivery,
}

struct MonitorSlot {
    monitor: Arc<InterfaceMonitor>,
    ref_count: usize,
}

#[derive(Default)]
struct Tables {
    entries: HashMap<ConsumerId, InterestEntry>,
    monitors: HashMap<String, MonitorSlot>,
    shut_down: bool,
}

pub(crate) struct ManagerInner {
    client: Arc<dyn CoordinationClient>,
    settings: DiscoverySettings,
    own_consumer: Option<ConsumerId>,
    runtime: Handle,
    this: Weak<ManagerInner>,
    tables: Mutex<Tables>,
}

/// Reconciliation engine between consumer interest and coordination watches.
///
/// Cloning is cheap; clones share the same state. Dropping the last clone
/// cancels every monitor, which then releases its watch in the background;
/// [`InterestManager::shutdown`] waits for the watches to be released.
#[derive(Clone)]
pub struct InterestManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for InterestManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let tables = self.inner.tables.lock();
        f.debug_struct("InterestManager")
            .field("consumers", &tables.entries.len())
            .field("monitors", &tables.monitors.len())
            .field("shut_down", &tables.shut_down)
            .finish()
    }
}

impl InterestManager {
    pub fn builder(client: Arc<dyn CoordinationClient>) -> InterestManagerBuilder {
        InterestManagerBuilder::new(client)
    }

    pub(crate) fn new(
        client: Arc<dyn CoordinationClient>,
        settings: DiscoverySettings,
        own_consumer: Option<ConsumerId>,
        runtime: Handle,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| ManagerInner {
            client,
            settings,
            own_consumer,
            runtime,
            this: this.clone(),
            tables: Mutex::new(Tables::default()),
        });
        Self { inner }
    }

    /// Registers `consumer`'s interest. A consumer that is already registered
    /// is treated as [`Self::update_interest`] and keeps its listener.
    ///
    /// Endpoints already known for the scope's interfaces are replayed as
    /// `endpoint_added` when the filter matches.
    pub fn add_interest(
        &self,
        consumer: ConsumerId,
        scope: InterestScope,
        listener: Arc<dyn EndpointListener>,
    ) {
        if self.inner.own_consumer == Some(consumer) {
            debug!(%consumer, "ignoring interest registered by the discovery component itself");
            return;
        }

        let started = {
            let mut tables = self.inner.tables.lock();
            if tables.shut_down {
                warn!(%consumer, "interest manager is shut down, ignoring add_interest");
                return;
            }
            if tables.entries.contains_key(&consumer) {
                drop(tables);
                debug!(%consumer, "consumer already registered, updating its interest");
                self.update_interest(consumer, scope);
                return;
            }

            let delivery = Delivery::spawn(&self.inner.runtime, consumer, listener);
            tables.entries.insert(
                consumer,
                InterestEntry {
                    scope: scope.clone(),
                    primed: HashSet::new(),
                    delivery,
                },
            );
            scope
                .interfaces
                .iter()
                .filter_map(|interface| self.inner.acquire(&mut tables, interface))
                .collect::<Vec<_>>()
        };
        debug!(%consumer, interfaces = ?scope.interfaces, filtered = scope.filter.is_some(), "interest added");

        self.inner.start_monitors(started);
        for interface in &scope.interfaces {
            self.inner.prime(consumer, interface);
        }
    }

    /// Replaces the scope of a registered consumer. Unknown consumers are
    /// ignored.
    ///
    /// Interfaces leaving the scope are released, new ones are acquired and
    /// replayed. For interfaces kept in the scope only the filter is swapped:
    /// endpoints already reported are neither replayed nor retracted.
    pub fn update_interest(
        &self,
        consumer: ConsumerId,
        scope: InterestScope,
    ) {
        let (stopped, started, added) = {
            let mut tables = self.inner.tables.lock();
            let Some(entry) = tables.entries.get_mut(&consumer) else {
                debug!(%consumer, "update_interest for unknown consumer ignored");
                return;
            };

            let removed: Vec<String> = entry.scope.interfaces.difference(&scope.interfaces).cloned().collect();
            let added: Vec<String> = scope.interfaces.difference(&entry.scope.interfaces).cloned().collect();
            for interface in &removed {
                entry.primed.remove(interface);
            }
            entry.scope = scope;

            let stopped: Vec<_> = removed
                .iter()
                .filter_map(|interface| self.inner.release(&mut tables, interface))
                .collect();
            let started: Vec<_> = added
                .iter()
                .filter_map(|interface| self.inner.acquire(&mut tables, interface))
                .collect();
            (stopped, started, added)
        };
        debug!(%consumer, added = ?added, retired = stopped.len(), "interest updated");

        self.inner.stop_monitors(stopped);
        self.inner.start_monitors(started);
        for interface in &added {
            self.inner.prime(consumer, interface);
        }
    }

    /// Drops `consumer`'s interest. No notification reaches the consumer's
    /// listener after this returns, apart from one already executing.
    /// Idempotent.
    pub fn remove_interest(
        &self,
        consumer: ConsumerId,
    ) {
        let stopped = {
            let mut tables = self.inner.tables.lock();
            let Some(entry) = tables.entries.remove(&consumer) else {
                trace!(%consumer, "remove_interest for unknown consumer ignored");
                return;
            };
            entry.delivery.close();
            entry
                .scope
                .interfaces
                .iter()
                .filter_map(|interface| self.inner.release(&mut tables, interface))
                .collect::<Vec<_>>()
        };
        debug!(%consumer, retired = stopped.len(), "interest removed");

        self.inner.stop_monitors(stopped);
    }

    /// Stops every monitor and consumer delivery and waits for the watches
    /// to be released. Later registrations are ignored.
    pub async fn shutdown(&self) {
        let (monitors, entries) = {
            let mut tables = self.inner.tables.lock();
            tables.shut_down = true;
            let monitors: Vec<_> = tables.monitors.drain().map(|(_, slot)| slot.monitor).collect();
            let entries: Vec<_> = tables.entries.drain().map(|(_, entry)| entry).collect();
            (monitors, entries)
        };

        for entry in &entries {
            entry.delivery.close();
        }
        ACTIVE_MONITORS.sub(monitors.len() as i64);
        for monitor in &monitors {
            monitor.stop();
        }
        for monitor in &monitors {
            monitor.join().await;
        }
        info!(
            consumers = entries.len(),
            monitors = monitors.len(),
            "interest manager shut down"
        );
    }

    /// Interfaces currently monitored, sorted.
    pub fn monitored_interfaces(&self) -> Vec<String> {
        let mut interfaces: Vec<String> = self.inner.tables.lock().monitors.keys().cloned().collect();
        interfaces.sort();
        interfaces
    }

    /// Number of consumers interested in `interface`.
    pub fn ref_count(
        &self,
        interface: &str,
    ) -> usize {
        self.inner
            .tables
            .lock()
            .monitors
            .get(interface)
            .map(|slot| slot.ref_count)
            .unwrap_or(0)
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.tables.lock().entries.len()
    }

    pub fn scope_of(
        &self,
        consumer: ConsumerId,
    ) -> Option<InterestScope> {
        self.inner.tables.lock().entries.get(&consumer).map(|e| e.scope.clone())
    }

    /// Current snapshot of the monitor for `interface`, if monitored.
    pub fn snapshot(
        &self,
        interface: &str,
    ) -> Option<Arc<Snapshot>> {
        let monitor = self.inner.tables.lock().monitors.get(interface).map(|s| s.monitor.clone())?;
        Some(monitor.snapshot())
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.inner.settings
    }
}

impl ManagerInner {
    /// Takes a reference on `interface`'s monitor, creating it on 0 -> 1.
    /// A created monitor is returned so it can be started outside the lock.
    fn acquire(
        &self,
        tables: &mut Tables,
        interface: &str,
    ) -> Option<Arc<InterfaceMonitor>> {
        if let Some(slot) = tables.monitors.get_mut(interface) {
            slot.ref_count += 1;
            trace!(interface, ref_count = slot.ref_count, "monitor reference taken");
            return None;
        }

        let sink: Weak<dyn MonitorSink> = self.this.clone();
        let monitor = InterfaceMonitor::new(
            interface,
            &self.settings.discovery.root_path,
            self.client.clone(),
            sink,
            self.settings.retry.rebootstrap,
        );
        tables.monitors.insert(
            interface.to_string(),
            MonitorSlot {
                monitor: monitor.clone(),
                ref_count: 1,
            },
        );
        ACTIVE_MONITORS.inc();
        Some(monitor)
    }

    /// Drops a reference on `interface`'s monitor. A monitor reaching zero
    /// is removed and returned so it can be stopped outside the lock.
    fn release(
        &self,
        tables: &mut Tables,
        interface: &str,
    ) -> Option<Arc<InterfaceMonitor>> {
        let slot = tables.monitors.get_mut(interface)?;
        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            trace!(interface, ref_count = slot.ref_count, "monitor reference dropped");
            return None;
        }
        let slot = tables.monitors.remove(interface)?;
        ACTIVE_MONITORS.dec();
        Some(slot.monitor)
    }

    fn start_monitors(
        &self,
        monitors: Vec<Arc<InterfaceMonitor>>,
    ) {
        for monitor in monitors {
            monitor.start(&self.runtime);
        }
    }

    fn stop_monitors(
        &self,
        monitors: Vec<Arc<InterfaceMonitor>>,
    ) {
        for monitor in monitors {
            monitor.stop();
        }
    }

    /// Replays `interface`'s snapshot to `consumer` and marks it primed.
    fn prime(
        &self,
        consumer: ConsumerId,
        interface: &str,
    ) {
        let Some(monitor) = self.tables.lock().monitors.get(interface).map(|s| s.monitor.clone()) else {
            return;
        };
        let monitor_id = monitor.id();

        let replayed = monitor.with_snapshot(|snapshot| {
            let mut tables = self.tables.lock();
            if tables.monitors.get(interface).map(|s| s.monitor.id()) != Some(monitor_id) {
                return 0;
            }
            let Some(entry) = tables.entries.get_mut(&consumer) else {
                return 0;
            };
            if !entry.scope.interfaces.contains(interface) || !entry.primed.insert(interface.to_string()) {
                return 0;
            }

            let mut replayed = 0;
            for endpoint in snapshot.values() {
                if entry.scope.matches(endpoint) {
                    entry.delivery.send(EndpointEvent::Added(endpoint.clone()));
                    replayed += 1;
                }
            }
            replayed
        });

        match replayed {
            Some(replayed) => debug!(%consumer, interface, replayed, "snapshot replayed"),
            None => trace!(%consumer, interface, "monitor stopped before replay"),
        }
    }
}

/// Per-consumer view of one monitor event.
pub(super) fn translate(
    scope: &InterestScope,
    event: &MonitorEvent,
) -> Option<EndpointEvent> {
    match event {
        MonitorEvent::Appeared(endpoint) => scope.matches(endpoint).then(|| EndpointEvent::Added(endpoint.clone())),
        MonitorEvent::Vanished(endpoint) => scope.matches(endpoint).then(|| EndpointEvent::Removed(endpoint.clone())),
        MonitorEvent::Modified { old, new } => match (scope.matches(old), scope.matches(new)) {
            (true, true) => Some(EndpointEvent::Modified {
                old: old.clone(),
                new: new.clone(),
            }),
            (false, true) => Some(EndpointEvent::Added(new.clone())),
            (true, false) => Some(EndpointEvent::Removed(old.clone())),
            (false, false) => None,
        },
    }
}

impl MonitorSink for ManagerInner {
    fn dispatch(
        &self,
        interface: &str,
        monitor_id: u64,
        events: &[MonitorEvent],
    ) {
        let tables = self.tables.lock();
        match tables.monitors.get(interface) {
            Some(slot) if slot.monitor.id() == monitor_id => {}
            _ => {
                trace!(interface, monitor_id, "events from a retired monitor dropped");
                return;
            }
        }

        for (consumer, entry) in tables.entries.iter() {
            if !entry.primed.contains(interface) {
                continue;
            }
            for event in events {
                if let Some(notification) = translate(&entry.scope, event) {
                    trace!(%consumer, interface, kind = notification.kind(), "notification queued");
                    entry.delivery.send(notification);
                }
            }
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let tables = self.tables.get_mut();
        if tables.monitors.is_empty() {
            return;
        }
        ACTIVE_MONITORS.sub(tables.monitors.len() as i64);
        // The last reference may be released by a monitor task mid-dispatch,
        // so only cancel here and leave the monitor's lock alone
        for (_, slot) in tables.monitors.drain() {
            slot.monitor.abandon();
        }
        debug!("interest manager dropped, monitors cancelled");
    }
}

