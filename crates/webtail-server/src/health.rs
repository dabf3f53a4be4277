//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::container::Container;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Whether a client is currently streaming.
    pub connected: bool,
    /// Identifier of the active connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Whether a source is installed right now.
    pub source_installed: bool,
    /// Whether a fallback factory is configured.
    pub has_factory: bool,
}

/// Snapshot the container into a health response.
pub fn health_check(start_time: Instant, container: &Container) -> HealthResponse {
    let connection = container.connection();
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connected: connection.is_some(),
        connection_id: connection.map(|c| c.id().to_string()),
        source_installed: container.source().is_some(),
        has_factory: container.has_factory(),
    }
}
