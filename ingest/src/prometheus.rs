use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Installs the global recorder. Must only be called once per process.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(LATENCY_BUCKETS_SECONDS)?
        .install_recorder()?;

    describe_counter!(
        "ingest_messages_total",
        "Stream messages handled, by outcome"
    );
    describe_counter!(
        "ingest_receive_errors_total",
        "Errors returned by the broker while waiting for messages"
    );
    describe_counter!(
        "ingest_items_total",
        "Items submitted on the request path, by outcome"
    );
    describe_counter!("http_requests_total", "HTTP requests served");
    describe_histogram!(
        "http_requests_duration_seconds",
        Unit::Seconds,
        "HTTP request latency"
    );

    Ok(handle)
}

/// Records request count and latency, labelled with the route template
/// rather than the raw path.
pub async fn track_metrics(
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let path = match matched_path {
        Some(path) => path.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };
    let method = req.method().to_string();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}
