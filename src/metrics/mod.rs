use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref ACTIVE_MONITORS: IntGauge =
        IntGauge::new("discovery_active_monitors", "Interface monitors currently watching a subtree")
            .expect("metric can not be created");

    pub static ref MONITOR_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("discovery_monitor_events", "Endpoint events produced by interface monitors"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("discovery_notifications_delivered", "Notifications handed to consumer listeners"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATION_FAILURES: IntCounter = IntCounter::new(
        "discovery_notification_failures",
        "Consumer listener calls that returned an error or panicked"
    )
    .expect("metric can not be created");

    pub static ref MONITOR_REBOOTSTRAPS: IntCounterVec = IntCounterVec::new(
        Opts::new("discovery_monitor_rebootstraps", "Forced monitor re-bootstraps"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the discovery collectors with [`REGISTRY`]. Safe to call more
/// than once.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ACTIVE_MONITORS.clone()),
            Box::new(MONITOR_EVENTS.clone()),
            Box::new(NOTIFICATIONS_DELIVERED.clone()),
            Box::new(NOTIFICATION_FAILURES.clone()),
            Box::new(MONITOR_REBOOTSTRAPS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {:?}", e);
            }
        }
    });
}

/// Text exposition of every registered collector.
pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
