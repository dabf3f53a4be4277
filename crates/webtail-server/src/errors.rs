//! Error taxonomy for the streaming loops.

use std::time::Duration;

use thiserror::Error;
use webtail_core::SourceError;

/// Failures on the `WebSocket` transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An outbound frame was not written within the write deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    /// No pong arrived within the idle-read deadline.
    #[error("read deadline exceeded after {0:?}")]
    ReadTimeout(Duration),
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
    /// Protocol or I/O error reported by the `WebSocket` layer.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<axum::Error> for TransportError {
    fn from(e: axum::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

/// Terminal conditions of a connection's loops.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No source is installed and no factory can supply one.
    #[error("no source configured and no source factory available")]
    NoSourceConfigured,
    /// Writing to the client failed; fatal to the scheduler.
    #[error("transport write failed: {0}")]
    TransportWrite(TransportError),
    /// Reading from the client failed; fatal to the liveness monitor.
    #[error("transport read failed: {0}")]
    TransportRead(TransportError),
    /// The source factory failed to produce a replacement.
    #[error(transparent)]
    Fallback(#[from] SourceError),
}

impl StreamError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NoSourceConfigured => "no_source_configured",
            Self::TransportWrite(_) => "transport_write",
            Self::TransportRead(_) => "transport_read",
            Self::Fallback(_) => "fallback",
        }
    }

    /// Whether the error means the process is misconfigured rather than the
    /// peer having gone away.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NoSourceConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_timeout_display() {
        let err = TransportError::WriteTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "write timed out after 10s");
    }

    #[test]
    fn wrapped_transport_errors_keep_cause() {
        let err = StreamError::TransportRead(TransportError::ReadTimeout(Duration::from_secs(60)));
        assert!(err.to_string().contains("read deadline exceeded after 60s"));
        assert_eq!(err.error_kind(), "transport_read");
    }

    #[test]
    fn only_missing_source_is_configuration_error() {
        assert!(StreamError::NoSourceConfigured.is_configuration_error());
        assert!(!StreamError::TransportWrite(TransportError::Closed).is_configuration_error());
        assert!(!StreamError::Fallback(SourceError::Exhausted).is_configuration_error());
    }

    #[test]
    fn fallback_is_transparent() {
        let err: StreamError = SourceError::Factory("cannot open".into()).into();
        assert_eq!(err.to_string(), "source factory failed: cannot open");
        assert_eq!(err.error_kind(), "fallback");
    }
}
