//! Prometheus metrics for hustledesk-service.
//!
//! Domain counters live in the default `prometheus` registry; HTTP request
//! metrics emitted through the `metrics` facade are rendered by the
//! `metrics-exporter-prometheus` recorder. `/metrics` serves both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

static RECORDER_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "hustledesk_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

pub static ORDERS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_orders_created_total",
        "Orders created, by whether they were fully paid at the till",
        &["settlement"]
    )
    .expect("Failed to register orders_created")
});

/// Gross sales in minor units.
pub static SALES_AMOUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_sales_amount_cents_total",
        "Order totals in minor currency units",
        &["currency"]
    )
    .expect("Failed to register sales_amount")
});

pub static INVOICES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_invoices_total",
        "Invoice lifecycle transitions by resulting status",
        &["status"]
    )
    .expect("Failed to register invoices_total")
});

pub static PAYMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_payments_total",
        "Payments recorded by tender",
        &["tender"]
    )
    .expect("Failed to register payments_total")
});

pub static WEBHOOK_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_webhook_events_total",
        "Inbound webhook deliveries by source and outcome",
        &["source", "outcome"]
    )
    .expect("Failed to register webhook_events")
});

/// Outbound calls to Stripe and Daraja.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hustledesk_upstream_requests_total",
        "Requests to payment providers by provider, operation and outcome",
        &["provider", "operation", "outcome"]
    )
    .expect("Failed to register upstream_requests")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hustledesk_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Install the HTTP metrics recorder and force every domain metric into the
/// registry. Safe to call more than once; later calls are no-ops.
pub fn init_metrics() {
    RECORDER_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed");
            None
        }
    });

    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ORDERS_CREATED);
    Lazy::force(&SALES_AMOUNT);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS);
    Lazy::force(&UPSTREAM_REQUESTS);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = RECORDER_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}

/// Record a completed sale; `balance_cents > 0` means sold on credit.
pub fn record_order_created(total_cents: i64, balance_cents: i64, currency: &str) {
    let settlement = if balance_cents <= 0 {
        "paid"
    } else if balance_cents < total_cents {
        "partial"
    } else {
        "credit"
    };
    ORDERS_CREATED.with_label_values(&[settlement]).inc();
    if total_cents > 0 {
        SALES_AMOUNT
            .with_label_values(&[currency])
            .inc_by(total_cents as u64);
    }
}

pub fn record_invoice_status(status: &str) {
    INVOICES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_payment(tender: &str) {
    PAYMENTS_TOTAL.with_label_values(&[tender]).inc();
}

pub fn record_webhook(source: &str, outcome: &str) {
    WEBHOOK_EVENTS.with_label_values(&[source, outcome]).inc();
}

pub fn record_upstream(provider: &str, operation: &str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    UPSTREAM_REQUESTS
        .with_label_values(&[provider, operation, outcome])
        .inc();
}

pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
