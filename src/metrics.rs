use cdp_adapter::metrics as cdp_metrics;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

static THREADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("threadkeeper_threads_total", "Threads handled by the archiver"),
        &["mode", "outcome"],
    )
    .expect("static metric definition")
});

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        cdp_metrics::register_metrics(registry);
        if let Err(err) = registry.register(Box::new(THREADS_TOTAL.clone())) {
            error!(?err, "failed to register archiver metrics");
        }
    });
}

pub fn record_thread(mode: &str, outcome: &str) {
    THREADS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

/// Prometheus text exposition of everything registered so far.
pub fn render_text() -> Result<String, prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_archiver_counters() {
        record_thread("capture", "saved");
        let text = render_text().unwrap();
        assert!(text.contains("threadkeeper_threads_total"));
        assert!(text.contains("mode=\"capture\""));
    }
}
