use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static PARTITION_PROVISIONING_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static TRANSACTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

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
                Opts::new(
                    "tenantry_gateway_http_requests_total",
                    "Gateway HTTP request count per unit.",
                ),
                &["unit", "status"],
            )
            .expect("create tenantry_gateway_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "tenantry_gateway_http_request_duration_seconds",
                    "Gateway HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["unit", "outcome"],
            )
            .expect("create tenantry_gateway_http_request_duration_seconds"),
        )
    })
}

fn partition_provisioning_total() -> &'static IntCounterVec {
    PARTITION_PROVISIONING_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "tenantry_gateway_partition_provisioning_total",
                    "Tenant partition provisioning attempts.",
                ),
                &["outcome"],
            )
            .expect("create tenantry_gateway_partition_provisioning_total"),
        )
    })
}

fn transactions_total() -> &'static IntCounterVec {
    TRANSACTIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "tenantry_gateway_transactions_total",
                    "Request transactions by terminal state.",
                ),
                &["outcome"],
            )
            .expect("create tenantry_gateway_transactions_total"),
        )
    })
}

pub fn observe_http_request(unit: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[unit, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[unit, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_provisioning(outcome: &str) {
    partition_provisioning_total()
        .with_label_values(&[outcome])
        .inc();
}

pub fn observe_transaction(outcome: &str) {
    transactions_total().with_label_values(&[outcome]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = partition_provisioning_total();
    let _ = transactions_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
