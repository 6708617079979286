//! Live mirror of one interface subtree.
//!
//! A monitor owns one children watch. A single task consumes the watch's
//! change stream, re-reads the subtree and applies the diff against the last
//! snapshot. Applying a diff (swap snapshot, dispatch events) happens inside
//! the monitor's critical section, which is also where late consumers get
//! their replay, so a consumer observes each change exactly once.
//!
//! ```text
//! watch_children() ──► events ──► read subtree ──► lock ─► diff ─► swap ─► sink.dispatch()
//!        ▲                                            │
//!        └── SessionExpired / read failure ◄──────────┘ (vanish all, back off on failure, re-bootstrap)
//! ```

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::diff;
use super::vanish_all;
use super::MonitorEvent;
use super::Snapshot;
use crate::coordination::child_path;
use crate::coordination::interface_path;
use crate::coordination::ChangeEvent;
use crate::coordination::ChildWatch;
use crate::coordination::CoordinationClient;
use crate::coordination::WatchId;
use crate::endpoint::EndpointDescription;
use crate::metrics::MONITOR_EVENTS;
use crate::metrics::MONITOR_REBOOTSTRAPS;
use crate::BackoffPolicy;
use crate::CoordinationError;
use crate::Error;
use crate::Result;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Receiver of the events a monitor produces.
///
/// Called from inside the monitor's critical section: implementations must
/// only update in-memory state and enqueue, never block or call back into the
/// monitor. The sink is released only after the critical section is left.
pub trait MonitorSink: Send + Sync + 'static {
    fn dispatch(
        &self,
        interface: &str,
        monitor_id: u64,
        events: &[MonitorEvent],
    );
}

#[derive(Debug, Default)]
struct MonitorState {
    started: bool,
    stopped: bool,
}

/// Why the current session with the subtree ended
enum SessionEnd {
    Expired,
    Failed(Error),
}

impl From<Error> for SessionEnd {
    /// A client reporting the session gone is a session end, not a failure:
    /// it re-bootstraps without backoff.
    fn from(e: Error) -> Self {
        match e {
            Error::Coordination(CoordinationError::SessionExpired) => SessionEnd::Expired,
            e => SessionEnd::Failed(e),
        }
    }
}

pub struct InterfaceMonitor {
    id: u64,
    interface: String,
    path: String,
    client: Arc<dyn CoordinationClient>,
    sink: Weak<dyn MonitorSink>,
    retry: BackoffPolicy,

    /// Critical section guarding snapshot replacement and dispatch
    state: Mutex<MonitorState>,
    snapshot: ArcSwap<Snapshot>,

    /// Watch currently held, released on stop
    watch_id: Mutex<Option<WatchId>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for InterfaceMonitor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InterfaceMonitor")
            .field("id", &self.id)
            .field("interface", &self.interface)
            .field("path", &self.path)
            .field("entries", &self.snapshot.load().len())
            .finish_non_exhaustive()
    }
}

impl InterfaceMonitor {
    pub fn new(
        interface: impl Into<String>,
        root_path: &str,
        client: Arc<dyn CoordinationClient>,
        sink: Weak<dyn MonitorSink>,
        retry: BackoffPolicy,
    ) -> Arc<Self> {
        let interface = interface.into();
        let path = interface_path(root_path, &interface);
        Arc::new(Self {
            id: NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed),
            interface,
            path,
            client,
            sink,
            retry,
            state: Mutex::new(MonitorState::default()),
            snapshot: ArcSwap::from_pointee(Snapshot::new()),
            watch_id: Mutex::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last successfully processed state of the subtree.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Runs `f` on the current snapshot inside the critical section, so no
    /// diff can be dispatched concurrently. Returns `None` once stopped.
    pub fn with_snapshot<R>(
        &self,
        f: impl FnOnce(&Snapshot) -> R,
    ) -> Option<R> {
        let state = self.state.lock();
        if state.stopped {
            return None;
        }
        let snapshot = self.snapshot.load_full();
        let result = f(&*snapshot);
        drop(state);
        Some(result)
    }

    /// Establishes the watch and bootstraps in the background. Idempotent;
    /// a stopped monitor cannot be restarted.
    pub fn start(
        self: &Arc<Self>,
        runtime: &Handle,
    ) {
        {
            let mut state = self.state.lock();
            if state.started || state.stopped {
                return;
            }
            state.started = true;
        }

        let monitor = Arc::clone(self);
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = monitor.cancel.cancelled() => {}
                _ = monitor.run() => {}
            }
            monitor.release_watch().await;
            debug!(interface = %monitor.interface, monitor_id = monitor.id, "Interface monitor task stopped");
        });
        *self.task.lock() = Some(handle);
        info!(interface = %self.interface, path = %self.path, monitor_id = self.id, "Interface monitor started");
    }

    /// No event is dispatched after this returns. The watch itself is
    /// released asynchronously by the monitor task. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        self.cancel.cancel();
        self.snapshot.store(Arc::new(Snapshot::new()));
        info!(interface = %self.interface, monitor_id = self.id, "Interface monitor stopped");
    }

    /// Cancels the monitor task without entering the critical section. Used
    /// when the sink itself is going away, possibly from inside a dispatch.
    /// The task still releases its watch on the way out.
    pub(crate) fn abandon(&self) {
        self.cancel.cancel();
    }

    /// Waits for the monitor task to finish after [`Self::stop`].
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(interface = %self.interface, "monitor task ended abnormally: {:?}", e);
            }
        }
    }

    async fn run(&self) {
        // Both counters only cover the time since the last successful bootstrap
        let mut failures = 0usize;
        let mut expiries = 0usize;
        loop {
            let (end, bootstrapped) = self.run_session().await;
            if bootstrapped {
                failures = 0;
                expiries = 0;
            }

            match end {
                SessionEnd::Expired => {
                    info!(interface = %self.interface, "Coordination session lost, re-bootstrapping");
                    MONITOR_REBOOTSTRAPS.with_label_values(&["session_expired"]).inc();
                    self.invalidate();

                    // Only the first expiry re-watches at once
                    if expiries > 0 {
                        tokio::time::sleep(self.retry.delay_for(expiries - 1)).await;
                    }
                    expiries = expiries.saturating_add(1);
                }
                SessionEnd::Failed(e) => {
                    MONITOR_REBOOTSTRAPS.with_label_values(&["read_failure"]).inc();
                    self.invalidate();

                    // Never gives up while started: past the retry budget the
                    // failure is only reported louder
                    if self.retry.allows(failures) {
                        warn!(interface = %self.interface, error = %e, attempts = failures, "Subtree access failed, re-bootstrapping");
                    } else {
                        error!(
                            interface = %self.interface,
                            error = %e,
                            attempts = failures,
                            "Subtree still unreachable past retry budget, re-bootstrapping"
                        );
                    }
                    let delay = self.retry.delay_for(failures);
                    failures = failures.saturating_add(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One watch lifetime: establish, bootstrap, then follow changes until the
    /// session ends or an access fails. Also reports whether the bootstrap
    /// read went through.
    async fn run_session(&self) -> (SessionEnd, bool) {
        let mut watch = match self.client.watch_children(&self.path).await {
            Ok(watch) => watch,
            Err(e) => return (SessionEnd::from(e), false),
        };
        *self.watch_id.lock() = Some(watch.id);

        // Bootstrap: the first read emits every present endpoint as appeared
        let (end, bootstrapped) = match self.refresh().await {
            Ok(()) => (self.follow(&mut watch).await, true),
            Err(e) => (SessionEnd::from(e), false),
        };

        self.watch_id.lock().take();
        self.client.unwatch(watch.id).await;
        (end, bootstrapped)
    }

    async fn follow(
        &self,
        watch: &mut ChildWatch,
    ) -> SessionEnd {
        loop {
            let event = match watch.events.recv().await {
                Some(event) => event,
                None => return SessionEnd::Expired,
            };
            if event == ChangeEvent::SessionExpired {
                return SessionEnd::Expired;
            }
            trace!(interface = %self.interface, ?event, "subtree change received");

            // Coalesce a burst into one re-read
            loop {
                match watch.events.try_recv() {
                    Ok(ChangeEvent::SessionExpired) | Err(TryRecvError::Disconnected) => return SessionEnd::Expired,
                    Ok(_) => continue,
                    Err(TryRecvError::Empty) => break,
                }
            }

            if let Err(e) = self.refresh().await {
                return SessionEnd::from(e);
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        let current = self.read_subtree().await?;
        self.apply(current);
        Ok(())
    }

    async fn read_subtree(&self) -> Result<Snapshot> {
        let children = match self.client.list_children(&self.path).await {
            Ok(children) => children,
            // Nothing published for this interface yet
            Err(Error::Coordination(CoordinationError::NoNode(_))) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut snapshot = Snapshot::new();
        for child in children {
            let path = child_path(&self.path, &child);
            let Some(payload) = self.client.read_node(&path).await? else {
                // Deleted between list and read
                continue;
            };
            if payload.is_empty() {
                trace!(path = %path, "skipping node without endpoint payload");
                continue;
            }
            match EndpointDescription::from_bytes(&payload) {
                Ok(description) => {
                    snapshot.insert(child, Arc::new(description));
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Ignoring malformed endpoint node");
                }
            }
        }
        Ok(snapshot)
    }

    /// Replaces the snapshot with `current` and dispatches the diff.
    fn apply(
        &self,
        current: Snapshot,
    ) {
        let state = self.state.lock();
        if state.stopped {
            debug!(interface = %self.interface, "discarding refresh racing with stop");
            return;
        }
        let current = Arc::new(current);
        let previous = self.snapshot.swap(Arc::clone(&current));
        let events = diff(&previous, &current);
        let sink = self.dispatch(&events);
        drop(state);
        drop(sink);
    }

    /// Drops the snapshot, reporting every known endpoint as vanished.
    fn invalidate(&self) {
        let state = self.state.lock();
        if state.stopped {
            return;
        }
        let previous = self.snapshot.swap(Arc::new(Snapshot::new()));
        let sink = self.dispatch(&vanish_all(&previous));
        drop(state);
        drop(sink);
    }

    /// Must be called with the critical section held.
    ///
    /// Returns the upgraded sink so the caller releases it only after leaving
    /// the critical section: if it is the last reference, the sink's drop runs
    /// there and may touch this monitor.
    #[must_use]
    fn dispatch(
        &self,
        events: &[MonitorEvent],
    ) -> Option<Arc<dyn MonitorSink>> {
        if events.is_empty() {
            return None;
        }
        for event in events {
            MONITOR_EVENTS.with_label_values(&[event.kind()]).inc();
        }
        debug!(interface = %self.interface, events = events.len(), "dispatching subtree diff");
        let Some(sink) = self.sink.upgrade() else {
            trace!(interface = %self.interface, "sink gone, dropping events");
            return None;
        };
        sink.dispatch(&self.interface, self.id, events);
        Some(sink)
    }

    async fn release_watch(&self) {
        let watch_id = self.watch_id.lock().take();
        if let Some(id) = watch_id {
            self.client.unwatch(id).await;
            debug!(interface = %self.interface, watch_id = id, "children watch released");
        }
    }
}
