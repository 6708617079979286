//! Consumer notification sinks and their delivery queues.
//!
//! Each consumer gets an unbounded queue drained by its own task, so the
//! reconciliation engine only ever enqueues: a slow or failing listener
//! cannot stall discovery for anybody else, and per-consumer order is the
//! order in which events were enqueued.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
#[cfg(test)]
use mockall::automock;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::endpoint::EndpointDescription;
use crate::metrics::NOTIFICATIONS_DELIVERED;
use crate::metrics::NOTIFICATION_FAILURES;
use crate::Result;

/// Opaque handle of an interested consumer, assigned by the hosting framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub u64);

impl fmt::Display for ConsumerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Notification sink of one consumer.
///
/// Errors and panics are logged and swallowed; they never affect other
/// consumers or the discovery state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointListener: Send + Sync + 'static {
    async fn endpoint_added(
        &self,
        endpoint: Arc<EndpointDescription>,
    ) -> Result<()>;

    async fn endpoint_removed(
        &self,
        endpoint: Arc<EndpointDescription>,
    ) -> Result<()>;

    async fn endpoint_modified(
        &self,
        old: Arc<EndpointDescription>,
        new: Arc<EndpointDescription>,
    ) -> Result<()>;
}

/// Notification as queued for one consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    Added(Arc<EndpointDescription>),
    Removed(Arc<EndpointDescription>),
    Modified {
        old: Arc<EndpointDescription>,
        new: Arc<EndpointDescription>,
    },
}

impl EndpointEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointEvent::Added(_) => "added",
            EndpointEvent::Removed(_) => "removed",
            EndpointEvent::Modified { .. } => "modified",
        }
    }
}

/// Delivery queue of one consumer. Closing it (or dropping it) guarantees no
/// further listener call starts.
pub(crate) struct Delivery {
    consumer: ConsumerId,
    sender: mpsc::UnboundedSender<EndpointEvent>,
    cancel: CancellationToken,
}

impl Delivery {
    pub(crate) fn spawn(
        runtime: &Handle,
        consumer: ConsumerId,
        listener: Arc<dyn EndpointListener>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<EndpointEvent>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => {
                            if token.is_cancelled() {
                                break;
                            }
                            deliver(consumer, listener.as_ref(), event).await;
                        }
                        None => break,
                    },
                }
            }
            trace!(%consumer, "delivery task stopped");
        });

        Self {
            consumer,
            sender,
            cancel,
        }
    }

    pub(crate) fn send(
        &self,
        event: EndpointEvent,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.sender.send(event).is_err() {
            warn!(consumer = %self.consumer, "delivery task gone, notification dropped");
        }
    }

    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn deliver(
    consumer: ConsumerId,
    listener: &dyn EndpointListener,
    event: EndpointEvent,
) {
    let kind = event.kind();
    let call = async move {
        match event {
            EndpointEvent::Added(endpoint) => listener.endpoint_added(endpoint).await,
            EndpointEvent::Removed(endpoint) => listener.endpoint_removed(endpoint).await,
            EndpointEvent::Modified { old, new } => listener.endpoint_modified(old, new).await,
        }
    };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => {
            NOTIFICATIONS_DELIVERED.with_label_values(&[kind]).inc();
            trace!(%consumer, kind, "notification delivered");
        }
        Ok(Err(e)) => {
            NOTIFICATION_FAILURES.inc();
            warn!(%consumer, kind, error = %e, "endpoint listener failed");
        }
        Err(_) => {
            NOTIFICATION_FAILURES.inc();
            error!(%consumer, kind, "endpoint listener panicked");
        }
    }
}
