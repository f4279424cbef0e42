//! # Global Metrics Registry
//!
//! All Prometheus metrics for the engine live here, registered once via
//! `Lazy` statics, plus the warp-served `/metrics` endpoint. Centralizing
//! the definitions keeps the observability surface reviewable in one place.

use std::net::SocketAddr;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::task::JoinHandle;
use tracing::{error, info};
use warp::{Filter, Reply};

// --- Discovery Metrics ---
pub static ROUTE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "router_requests_total",
        "Route discovery requests, labeled by kind and outcome.",
        &["kind", "outcome"]
    )
    .expect("Failed to register router_requests_total")
});
pub static DISCOVERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "router_discovery_duration_seconds",
        "End-to-end route discovery latency.",
        &["kind"]
    )
    .expect("Failed to register router_discovery_duration_seconds")
});

// --- Verifier Metrics ---
pub static VERIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "router_verifications_total",
        "Path verification attempts, labeled by chain and outcome.",
        &["chain", "outcome"]
    )
    .expect("Failed to register router_verifications_total")
});
pub static VERIFY_CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "router_verify_cache_hits_total",
        "Verification results served from the TTL cache."
    )
    .expect("Failed to register router_verify_cache_hits_total")
});
pub static PROBE_DEPTH: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "router_probe_ladder_depth",
        "How far down the test-amount ladder a verification went (0 = full amount).",
        &["chain"],
        vec![0.0, 1.0, 2.0, 3.0, 4.0]
    )
    .expect("Failed to register router_probe_ladder_depth")
});
pub static INFLIGHT_PROBES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "router_inflight_probes",
        "Outbound pricing calls currently in flight."
    )
    .expect("Failed to register router_inflight_probes")
});

// --- Venue & Bridge Metrics ---
pub static ADAPTER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "router_adapter_requests_total",
        "Venue adapter getRoute calls, labeled by venue and outcome.",
        &["venue", "outcome"]
    )
    .expect("Failed to register router_adapter_requests_total")
});
pub static BRIDGE_QUOTES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "router_bridge_quotes_total",
        "Bridge quote requests, labeled by provider and outcome.",
        &["provider", "outcome"]
    )
    .expect("Failed to register router_bridge_quotes_total")
});

// --- RPC Metrics ---
pub static RPC_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rpc_call_latency_seconds",
        "RPC call latency in seconds, labeled by method.",
        &["method"]
    )
    .expect("Failed to register rpc_call_latency_seconds")
});
pub static RPC_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rpc_call_retries_total",
        "Number of RPC call retries, labeled by method.",
        &["method"]
    )
    .expect("Failed to register rpc_call_retries_total")
});

/// Starts the Prometheus metrics server on a separate Tokio task.
pub fn start_metrics_server(host: String, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr: SocketAddr = match format!("{host}:{port}").parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!(target: "metrics", "Invalid metrics server address {host}:{port}: {e}");
                return;
            }
        };

        info!(target: "metrics", "Prometheus metrics server starting on http://{}", addr);

        let metrics_route = warp::path("metrics").and_then(metrics_handler);
        warp::serve(metrics_route).run(addr).await;
    })
}

/// Warp handler collecting and encoding the registry for Prometheus.
async fn metrics_handler() -> Result<warp::reply::Response, warp::Rejection> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(target: "metrics", "Failed to encode metrics: {}", e);
        let response = warp::reply::with_status(
            "Failed to encode metrics".to_string(),
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        );
        return Ok(response.into_response());
    }

    let response = warp::reply::with_header(
        String::from_utf8_lossy(&buffer).to_string(),
        "Content-Type",
        encoder.format_type(),
    );
    Ok(response.into_response())
}
