use std::collections::BTreeMap;
use std::sync::Arc;

use crate::endpoint::EndpointDescription;

/// Last known state of one interface subtree: child node name -> description
pub type Snapshot = BTreeMap<String, Arc<EndpointDescription>>;

/// Typed change produced by an interface monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Appeared(Arc<EndpointDescription>),
    Vanished(Arc<EndpointDescription>),
    Modified {
        old: Arc<EndpointDescription>,
        new: Arc<EndpointDescription>,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Appeared(_) => "appeared",
            MonitorEvent::Vanished(_) => "vanished",
            MonitorEvent::Modified { .. } => "modified",
        }
    }
}

/// Events turning `old` into `new`, matched by node name.
///
/// Vanished nodes come first, then appeared and modified ones in node order.
/// Nodes whose description is unchanged produce nothing.
pub fn diff(
    old: &Snapshot,
    new: &Snapshot,
) -> Vec<MonitorEvent> {
    let mut events: Vec<MonitorEvent> = old
        .iter()
        .filter(|(name, _)| !new.contains_key(*name))
        .map(|(_, d)| MonitorEvent::Vanished(d.clone()))
        .collect();

    for (name, current) in new {
        match old.get(name) {
            None => events.push(MonitorEvent::Appeared(current.clone())),
            Some(previous) if previous != current => events.push(MonitorEvent::Modified {
                old: previous.clone(),
                new: current.clone(),
            }),
            Some(_) => {}
        }
    }
    events
}

/// Every entry of `snapshot` as vanished, used when the snapshot is invalidated.
pub fn vanish_all(snapshot: &Snapshot) -> Vec<MonitorEvent> {
    snapshot.values().map(|d| MonitorEvent::Vanished(d.clone())).collect()
}
