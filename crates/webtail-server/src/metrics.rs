//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections ended (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connections currently installed (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Bytes delivered from the source (counter).
pub const FLUSH_BYTES_TOTAL: &str = "flush_bytes_total";
/// Text frames carrying source data (counter).
pub const FLUSH_FRAMES_TOTAL: &str = "flush_frames_total";
/// Drain errors forwarded to the client (counter).
pub const SOURCE_ERRORS_REPORTED_TOTAL: &str = "source_errors_reported_total";
/// Drain errors suppressed as duplicates (counter).
pub const SOURCE_ERRORS_SUPPRESSED_TOTAL: &str = "source_errors_suppressed_total";
/// Factory fallbacks attempted (counter, labels: outcome).
pub const SOURCE_FALLBACKS_TOTAL: &str = "source_fallbacks_total";
/// Liveness pings sent (counter).
pub const PINGS_SENT_TOTAL: &str = "pings_sent_total";
