//! Connection admission: install the connection, run both loops, clean up.

use std::sync::Arc;

use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::liveness::{LivenessExit, run_liveness};
use super::scheduler::{FlushScheduler, SchedulerExit};
use crate::config::StreamTimings;
use crate::container::{ConnectionId, Container};
use crate::errors::StreamError;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::transport::{FrameSink, FrameStream};

/// How a connection ended.
#[derive(Debug)]
pub struct ConnectionReport {
    /// Identifier assigned at admission.
    pub id: ConnectionId,
    /// Outcome of the inbound loop.
    pub liveness: Result<LivenessExit, StreamError>,
    /// Outcome of the outbound loop.
    pub scheduler: Result<SchedulerExit, StreamError>,
}

impl ConnectionReport {
    /// The fatal error that ended the connection, preferring the scheduler's.
    pub fn fatal_error(&self) -> Option<&StreamError> {
        self.scheduler.as_ref().err().or(self.liveness.as_ref().err())
    }

    fn reason(&self) -> &'static str {
        match (&self.scheduler, &self.liveness) {
            (Err(e), _) | (_, Err(e)) => e.error_kind(),
            (_, Ok(LivenessExit::PeerClosed)) => "peer_closed",
            _ => "cancelled",
        }
    }
}

/// Serve one upgraded connection until it ends.
///
/// Any previous connection is cancelled on admission. The scheduler runs on
/// its own task; the liveness monitor runs on the caller's. Both share one
/// token, so either loop ending stops the other.
#[instrument(skip_all, fields(connection_id))]
pub async fn run_connection<S, R>(
    container: Arc<Container>,
    sink: S,
    mut stream: R,
    timings: StreamTimings,
    shutdown: &CancellationToken,
) -> ConnectionReport
where
    S: FrameSink + 'static,
    R: FrameStream,
{
    let handle = container.install_connection(shutdown);
    let id = handle.id().clone();
    let _ = tracing::Span::current().record("connection_id", id.as_str());
    let cancel = handle.token();

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!("client connected");

    let scheduler = FlushScheduler::new(id.clone(), container.clone(), sink, timings, cancel.clone());
    let outbound = tokio::spawn(scheduler.run());

    let liveness = run_liveness(&mut stream, timings.idle_timeout, &cancel).await;
    let scheduler = match outbound.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "scheduler task failed");
            Ok(SchedulerExit::Cancelled)
        }
    };

    let released = container.release_connection(&id);
    let report = ConnectionReport {
        id,
        liveness,
        scheduler,
    };

    match report.fatal_error() {
        Some(e) if e.is_configuration_error() => {
            error!(error = %e, "no source configured and no factory; closing connection");
        }
        Some(e) => warn!(error = %e, "connection ended with error"),
        None => {}
    }

    let reason = report.reason();
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    info!(reason, superseded = !released, "client disconnected");

    report
}
