// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The two telemetry sinks (§6): a Prometheus text exporter and a JSON stats
//! endpoint. Both read only the aggregator's [`Snapshot`], never a core's raw
//! [`cgnat_stats::CounterBlock`] directly — the aggregator is the single point
//! where per-core counters become one coherent point-in-time view.

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cgnat_stats::Snapshot;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install the Prometheus recorder: {0}")]
    RecorderInstall(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("sink server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared, explicitly-threaded handle to the latest aggregated snapshot. Workers
/// never touch this; only the aggregator thread writes it, and both sinks read it.
pub type SharedSnapshot = Arc<RwLock<Snapshot>>;

/// Registers HELP/TYPE metadata for every metric `record_snapshot` writes.
/// Must run once before the first `record_snapshot` call, or the exporter
/// renders the samples without `# HELP`/`# TYPE` lines.
fn describe_metrics() {
    metrics::describe_counter!("cgnat_packets_received_total", "Total packets received");
    metrics::describe_counter!("cgnat_packets_transmitted_total", "Total packets transmitted");
    metrics::describe_counter!("cgnat_packets_dropped_total", "Total packets dropped");
    metrics::describe_counter!("cgnat_bytes_received_total", "Total bytes received");
    metrics::describe_counter!("cgnat_bytes_transmitted_total", "Total bytes transmitted");
    metrics::describe_gauge!("cgnat_nat_sessions_active", "Currently active NAT sessions");
    metrics::describe_counter!("cgnat_nat_sessions_created_total", "Total NAT sessions created");
    metrics::describe_counter!("cgnat_nat_sessions_expired_total", "Total NAT sessions expired");
    metrics::describe_counter!(
        "cgnat_port_allocation_failures_total",
        "Total port allocation failures"
    );
    metrics::describe_gauge!(
        "cgnat_packet_latency_microseconds_avg",
        "Average packet processing latency in microseconds"
    );
    metrics::describe_gauge!(
        "cgnat_packet_latency_microseconds_max",
        "Maximum packet processing latency in microseconds"
    );
}

fn record_snapshot(handle: &PrometheusHandle, snapshot: &Snapshot) -> String {
    metrics::counter!("cgnat_packets_received_total").absolute(snapshot.packets_rx);
    metrics::counter!("cgnat_packets_transmitted_total").absolute(snapshot.packets_tx);
    metrics::counter!("cgnat_packets_dropped_total").absolute(snapshot.packets_dropped);
    metrics::counter!("cgnat_bytes_received_total").absolute(snapshot.bytes_rx);
    metrics::counter!("cgnat_bytes_transmitted_total").absolute(snapshot.bytes_tx);
    metrics::gauge!("cgnat_nat_sessions_active").set(snapshot.active_sessions as f64);
    metrics::counter!("cgnat_nat_sessions_created_total").absolute(snapshot.sessions_created);
    metrics::counter!("cgnat_nat_sessions_expired_total").absolute(snapshot.sessions_expired);
    metrics::counter!("cgnat_port_allocation_failures_total").absolute(snapshot.port_allocation_failures);
    metrics::gauge!("cgnat_packet_latency_microseconds_avg").set(snapshot.avg_latency_us);
    metrics::gauge!("cgnat_packet_latency_microseconds_max").set(snapshot.max_latency_us as f64);
    handle.render()
}

/// The Prometheus text 0.0.4 sink. Any request path returns the same body, per
/// §6; the usual `/metrics` convention is accepted but not required.
pub struct PrometheusSink {
    handle: PrometheusHandle,
    snapshot: SharedSnapshot,
}

impl PrometheusSink {
    pub fn new(snapshot: SharedSnapshot) -> Result<Self, TelemetryError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_metrics();
        Ok(Self { handle, snapshot })
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<(), TelemetryError> {
        let state = Arc::new((self.handle, self.snapshot));
        let app = Router::new().fallback(prometheus_handler).with_state(state);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TelemetryError::Bind { addr, source })?;
        tracing::info!(%addr, "Prometheus sink listening");
        axum::serve(listener, app).await.map_err(TelemetryError::Serve)
    }
}

async fn prometheus_handler(
    State(state): State<Arc<(PrometheusHandle, SharedSnapshot)>>,
) -> impl IntoResponse {
    let (handle, snapshot) = &*state;
    let snapshot = *snapshot.read().expect("snapshot lock never poisoned by a panic in a reader");
    let body = record_snapshot(handle, &snapshot);
    (StatusCode::OK, body)
}

/// The JSON stats sink (`GET /api/stats`; every other path 404s with an empty body).
pub struct JsonStatsSink {
    snapshot: SharedSnapshot,
}

impl JsonStatsSink {
    #[must_use]
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<(), TelemetryError> {
        let app = Router::new()
            .route("/api/stats", get(stats_handler))
            .with_state(self.snapshot);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TelemetryError::Bind { addr, source })?;
        tracing::info!(%addr, "JSON stats sink listening");
        axum::serve(listener, app).await.map_err(TelemetryError::Serve)
    }
}

async fn stats_handler(State(snapshot): State<SharedSnapshot>) -> Response {
    let snapshot = *snapshot.read().expect("snapshot lock never poisoned by a panic in a reader");
    let body = serde_json::to_string(&snapshot).expect("Snapshot serializes infallibly");
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert("access-control-allow-origin", HeaderValue::from_static("*"));
    response
        .headers_mut()
        .insert("connection", HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_snapshot_reflects_latest_write() {
        let shared: SharedSnapshot = Arc::new(RwLock::new(Snapshot::default()));
        {
            let mut guard = shared.write().unwrap();
            guard.packets_rx = 42;
        }
        assert_eq!(shared.read().unwrap().packets_rx, 42);
    }
}
