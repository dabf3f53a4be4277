//! Liveness monitor: the inbound loop of a connection.
//!
//! Reads frames until the peer goes quiet for longer than the idle timeout,
//! the peer closes, or the connection is cancelled. Only pongs extend the
//! read deadline; application frames from the client are read and ignored.

use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::{StreamError, TransportError};
use crate::transport::{FrameStream, InboundFrame};

/// Why the liveness monitor stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LivenessExit {
    /// The connection token was cancelled (superseded, shutdown, or scheduler exit).
    Cancelled,
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
}

/// Read from `stream` until cancellation, close, or an idle timeout.
///
/// Cancels `cancel` before returning so the scheduler stops with it.
pub async fn run_liveness<R: FrameStream>(
    stream: &mut R,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<LivenessExit, StreamError> {
    let result = monitor(stream, idle_timeout, cancel).await;
    cancel.cancel();
    result
}

async fn monitor<R: FrameStream>(
    stream: &mut R,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<LivenessExit, StreamError> {
    let mut deadline = Instant::now() + idle_timeout;
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(LivenessExit::Cancelled),
            read = time::timeout_at(deadline, stream.next_frame()) => read,
        };

        match frame {
            Err(_) => {
                debug!(?idle_timeout, "no pong before read deadline");
                return Err(StreamError::TransportRead(TransportError::ReadTimeout(
                    idle_timeout,
                )));
            }
            Ok(None) | Ok(Some(Ok(InboundFrame::Close))) => return Ok(LivenessExit::PeerClosed),
            Ok(Some(Err(e))) => return Err(StreamError::TransportRead(e)),
            Ok(Some(Ok(InboundFrame::Pong))) => {
                trace!("pong received, extending read deadline");
                deadline = Instant::now() + idle_timeout;
            }
            Ok(Some(Ok(other))) => trace!(frame = ?other, "ignoring inbound frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedStream;

    const IDLE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (mut stream, _tx) = ScriptedStream::new();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let err = run_liveness(&mut stream, IDLE, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::TransportRead(TransportError::ReadTimeout(d)) if d == IDLE
        ));
        assert_eq!(start.elapsed(), IDLE);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_extends_deadline() {
        let (mut stream, tx) = ScriptedStream::new();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let feeder = tokio::spawn(async move {
            time::sleep(Duration::from_secs(50)).await;
            tx.send(Ok(InboundFrame::Pong)).unwrap();
            tx
        });

        let err = run_liveness(&mut stream, IDLE, &cancel).await.unwrap_err();
        assert!(matches!(err, StreamError::TransportRead(TransportError::ReadTimeout(_))));
        assert_eq!(start.elapsed(), Duration::from_secs(110));
        drop(feeder);
    }

    #[tokio::test(start_paused = true)]
    async fn text_frames_do_not_extend_deadline() {
        let (mut stream, tx) = ScriptedStream::new();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let feeder = tokio::spawn(async move {
            time::sleep(Duration::from_secs(30)).await;
            tx.send(Ok(InboundFrame::Text("hello".into()))).unwrap();
            tx
        });

        let _ = run_liveness(&mut stream, IDLE, &cancel).await.unwrap_err();
        assert_eq!(start.elapsed(), IDLE);
        drop(feeder);
    }

    #[tokio::test]
    async fn close_frame_ends_monitor() {
        let (mut stream, tx) = ScriptedStream::new();
        tx.send(Ok(InboundFrame::Close)).unwrap();
        let cancel = CancellationToken::new();

        let exit = run_liveness(&mut stream, IDLE, &cancel).await.unwrap();
        assert_eq!(exit, LivenessExit::PeerClosed);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stream_end_is_peer_close() {
        let (mut stream, tx) = ScriptedStream::new();
        drop(tx);
        let exit = run_liveness(&mut stream, IDLE, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(exit, LivenessExit::PeerClosed);
    }

    #[tokio::test]
    async fn cancellation_stops_monitor() {
        let (mut stream, _tx) = ScriptedStream::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let exit = run_liveness(&mut stream, IDLE, &cancel).await.unwrap();
        assert_eq!(exit, LivenessExit::Cancelled);
    }

    #[tokio::test]
    async fn read_error_is_fatal() {
        let (mut stream, tx) = ScriptedStream::new();
        tx.send(Err(TransportError::WebSocket("reset".into()))).unwrap();
        let err = run_liveness(&mut stream, IDLE, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::TransportRead(TransportError::WebSocket(_))));
    }
}
