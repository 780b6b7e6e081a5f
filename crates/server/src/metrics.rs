use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static REJECTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static CONNECTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static OPEN_CONNECTIONS: OnceLock<IntGaugeVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("apnsmock_http_requests_total", "Mock HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create apnsmock_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "apnsmock_http_request_duration_seconds",
                    "Mock HTTP request duration in seconds, including injected delay.",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create apnsmock_http_request_duration_seconds"),
        )
    })
}

fn rejections_total() -> &'static IntCounterVec {
    REJECTIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "apnsmock_rejections_total",
                    "Failure responses by reason string.",
                ),
                &["reason"],
            )
            .expect("create apnsmock_rejections_total"),
        )
    })
}

fn connections_total() -> &'static IntCounterVec {
    CONNECTIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "apnsmock_connections_total",
                    "Accepted TCP connections by admission outcome.",
                ),
                &["outcome"],
            )
            .expect("create apnsmock_connections_total"),
        )
    })
}

fn open_connections() -> &'static IntGaugeVec {
    OPEN_CONNECTIONS.get_or_init(|| {
        register_collector(
            IntGaugeVec::new(
                Opts::new(
                    "apnsmock_open_connections",
                    "Connections currently admitted, per listening address.",
                ),
                &["listener"],
            )
            .expect("create apnsmock_open_connections"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_rejection(reason: &str) {
    rejections_total().with_label_values(&[reason]).inc();
}

pub fn observe_connection(outcome: &str) {
    connections_total().with_label_values(&[outcome]).inc();
}

/// Servers embedded in one process share the registry, so the gauge is
/// keyed by listener address.
pub fn set_open_connections(listener: &str, open: u32) {
    open_connections()
        .with_label_values(&[listener])
        .set(i64::from(open));
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = open_connections();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
