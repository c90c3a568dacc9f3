use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, histogram_opts, HistogramVec, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub commands: u64,
    pub command_failures: u64,
    pub cdp_events: u64,
    pub responses: u64,
    pub download_events: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static CDP_EVENTS: AtomicU64 = AtomicU64::new(0);
static RESPONSES: AtomicU64 = AtomicU64::new(0);
static DOWNLOAD_EVENTS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("threadkeeper_cdp_commands_total", "CDP commands sent"),
        &["method"]
    )
    .unwrap();
    static ref COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "threadkeeper_cdp_command_failures_total",
            "CDP commands that returned an error"
        ),
        &["method"]
    )
    .unwrap();
    static ref COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "threadkeeper_cdp_command_duration_seconds",
            "CDP command latency",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref SESSION_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "threadkeeper_session_events_total",
            "Session events published to subscribers"
        ),
        &["kind"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register session metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, COMMANDS_TOTAL.clone());
    register(registry, COMMAND_FAILURES_TOTAL.clone());
    register(registry, COMMAND_DURATION.clone());
    register(registry, SESSION_EVENTS_TOTAL.clone());
}

pub fn record_command(method: &str, elapsed: Duration, ok: bool) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    COMMANDS_TOTAL.with_label_values(&[method]).inc();
    COMMAND_DURATION
        .with_label_values(&[method])
        .observe(elapsed.as_secs_f64());
    if !ok {
        COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
        COMMAND_FAILURES_TOTAL.with_label_values(&[method]).inc();
    }
}

pub fn record_cdp_event() {
    CDP_EVENTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_response() {
    RESPONSES.fetch_add(1, Ordering::Relaxed);
    SESSION_EVENTS_TOTAL.with_label_values(&["response"]).inc();
}

pub fn record_download_event() {
    DOWNLOAD_EVENTS.fetch_add(1, Ordering::Relaxed);
    SESSION_EVENTS_TOTAL.with_label_values(&["download"]).inc();
}

pub fn snapshot() -> SessionMetricsSnapshot {
    SessionMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        cdp_events: CDP_EVENTS.load(Ordering::Relaxed),
        responses: RESPONSES.load(Ordering::Relaxed),
        download_events: DOWNLOAD_EVENTS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    COMMANDS.store(0, Ordering::Relaxed);
    COMMAND_FAILURES.store(0, Ordering::Relaxed);
    CDP_EVENTS.store(0, Ordering::Relaxed);
    RESPONSES.store(0, Ordering::Relaxed);
    DOWNLOAD_EVENTS.store(0, Ordering::Relaxed);
}
