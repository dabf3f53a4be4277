//! Flush/ping scheduler: the outbound loop of a connection.
//!
//! Two timers feed one `select!` loop, so flush and ping writes never
//! overlap. The flush timer drains the installed source and forwards new
//! bytes as a text frame; the ping timer sends a liveness ping. Any write
//! failure or write-deadline overrun ends the loop.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use webtail_core::SourceError;

use crate::config::StreamTimings;
use crate::container::{ConnectionId, Container};
use crate::errors::{StreamError, TransportError};
use crate::metrics::{
    FLUSH_BYTES_TOTAL, FLUSH_FRAMES_TOTAL, PINGS_SENT_TOTAL, SOURCE_ERRORS_REPORTED_TOTAL,
    SOURCE_ERRORS_SUPPRESSED_TOTAL, SOURCE_FALLBACKS_TOTAL,
};
use crate::transport::FrameSink;

/// What a single flush tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// New bytes were sent as one text frame.
    Delivered(usize),
    /// Nothing new; nothing sent.
    Idle,
    /// A drain error was sent to the client.
    ErrorReported,
    /// A drain error matched the last reported one and was not resent.
    ErrorSuppressed,
    /// No source was installed; the factory supplied one.
    SourceInstalled,
    /// No source was installed and the factory failed; retried next tick.
    FallbackFailed,
    /// The source reported its permanent end and was uninstalled.
    SourceExhausted,
    /// The connection was cancelled before or during the write.
    Interrupted,
}

/// Why the scheduler stopped without an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerExit {
    /// The connection token was cancelled.
    Cancelled,
}

/// Outbound loop state for one connection.
pub struct FlushScheduler<S> {
    connection_id: ConnectionId,
    container: Arc<Container>,
    sink: S,
    timings: StreamTimings,
    cancel: CancellationToken,
    last_error: Option<String>,
    carry: Utf8Carry,
}

/// Whether an outbound write finished or was abandoned on cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sent {
    Done,
    Abandoned,
}

impl<S: FrameSink> FlushScheduler<S> {
    /// Create a scheduler writing to `sink` until `cancel` fires.
    pub fn new(
        connection_id: ConnectionId,
        container: Arc<Container>,
        sink: S,
        timings: StreamTimings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection_id,
            container,
            sink,
            timings,
            cancel,
            last_error: None,
            carry: Utf8Carry::default(),
        }
    }

    /// The last diagnostic sent to the client, if deduplication is active.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run until the connection token fires or a fatal error occurs.
    ///
    /// On exit the token is cancelled so the connection's liveness monitor
    /// stops as well, and the sink is closed.
    pub async fn run(mut self) -> Result<SchedulerExit, StreamError> {
        let cancel = self.cancel.clone();
        let start = Instant::now();
        let mut flush = time::interval_at(start + self.timings.flush_period, self.timings.flush_period);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping = time::interval_at(start + self.timings.ping_period, self.timings.ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(SchedulerExit::Cancelled),
                _ = flush.tick() => {
                    match self.flush_tick().await {
                        Ok(outcome) => trace!(connection_id = %self.connection_id, ?outcome, "flush tick"),
                        Err(e) => break Err(e),
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = self.ping().await {
                        break Err(e);
                    }
                }
            }
        };

        cancel.cancel();
        let deadline = self.timings.write_timeout;
        if let Err(e) = bounded(deadline, self.sink.close()).await {
            debug!(connection_id = %self.connection_id, error = %e, "close after scheduler exit failed");
        }
        debug!(connection_id = %self.connection_id, ?result, "scheduler stopped");
        result
    }

    /// Handle one flush-timer tick.
    ///
    /// A cancelled connection drains nothing, so bytes stay in the source for
    /// whichever connection replaces it.
    pub async fn flush_tick(&mut self) -> Result<FlushOutcome, StreamError> {
        if self.cancel.is_cancelled() {
            return Ok(FlushOutcome::Interrupted);
        }
        let Some(source) = self.container.source() else {
            return self.fall_back();
        };

        match source.drain().await {
            Ok(chunk) => {
                self.last_error = None;
                self.deliver(chunk).await
            }
            Err(SourceError::Exhausted) => {
                debug!(connection_id = %self.connection_id, source = %source.label(), "source exhausted");
                let _ = self.container.clear_source_if(&source);
                self.discard_carry();
                Ok(FlushOutcome::SourceExhausted)
            }
            Err(e) => self.report(&e).await,
        }
    }

    /// Send one liveness ping.
    pub async fn ping(&mut self) -> Result<(), StreamError> {
        let sent = guarded(&self.cancel, self.timings.write_timeout, self.sink.send_ping())
            .await
            .map_err(StreamError::TransportWrite)?;
        if sent == Sent::Abandoned {
            return Ok(());
        }
        counter!(PINGS_SENT_TOTAL).increment(1);
        debug!(connection_id = %self.connection_id, "ping sent");
        Ok(())
    }

    fn fall_back(&mut self) -> Result<FlushOutcome, StreamError> {
        if !self.container.has_factory() {
            return Err(StreamError::NoSourceConfigured);
        }
        match self.container.fallback_source() {
            Ok(source) => {
                counter!(SOURCE_FALLBACKS_TOTAL, "outcome" => "installed").increment(1);
                debug!(connection_id = %self.connection_id, source = %source.label(), "installed source from factory");
                self.discard_carry();
                Ok(FlushOutcome::SourceInstalled)
            }
            Err(e) => {
                counter!(SOURCE_FALLBACKS_TOTAL, "outcome" => "failed").increment(1);
                warn!(connection_id = %self.connection_id, error = %e, "source factory failed, retrying next tick");
                Ok(FlushOutcome::FallbackFailed)
            }
        }
    }

    async fn deliver(&mut self, chunk: Bytes) -> Result<FlushOutcome, StreamError> {
        let text = self.carry.decode(&chunk);
        if text.is_empty() {
            return Ok(FlushOutcome::Idle);
        }
        let len = text.len();
        if self.write_text(text).await? == Sent::Abandoned {
            debug!(connection_id = %self.connection_id, bytes = len, "connection cancelled mid-write");
            return Ok(FlushOutcome::Interrupted);
        }
        counter!(FLUSH_BYTES_TOTAL).increment(len as u64);
        counter!(FLUSH_FRAMES_TOTAL).increment(1);
        Ok(FlushOutcome::Delivered(len))
    }

    async fn report(&mut self, error: &SourceError) -> Result<FlushOutcome, StreamError> {
        let text = error.to_string();
        if self.last_error.as_deref() == Some(text.as_str()) {
            counter!(SOURCE_ERRORS_SUPPRESSED_TOTAL).increment(1);
            return Ok(FlushOutcome::ErrorSuppressed);
        }
        debug!(connection_id = %self.connection_id, error = %text, "reporting source error to client");
        self.last_error = Some(text.clone());
        if self.write_text(text).await? == Sent::Abandoned {
            return Ok(FlushOutcome::Interrupted);
        }
        counter!(SOURCE_ERRORS_REPORTED_TOTAL).increment(1);
        Ok(FlushOutcome::ErrorReported)
    }

    async fn write_text(&mut self, text: String) -> Result<Sent, StreamError> {
        guarded(&self.cancel, self.timings.write_timeout, self.sink.send_text(text))
            .await
            .map_err(StreamError::TransportWrite)
    }

    /// Drop a partial character left over from a source that is gone.
    fn discard_carry(&mut self) {
        let dropped = self.carry.reset();
        if dropped > 0 {
            debug!(connection_id = %self.connection_id, bytes = dropped, "discarding partial character from previous source");
        }
    }
}

/// Apply the write deadline to one outbound operation.
async fn bounded<F>(deadline: std::time::Duration, write: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    time::timeout(deadline, write)
        .await
        .map_err(|_| TransportError::WriteTimeout(deadline))?
}

/// Like [`bounded`], but abandons the write once `cancel` fires.
async fn guarded<F>(
    cancel: &CancellationToken,
    deadline: std::time::Duration,
    write: F,
) -> Result<Sent, TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Ok(Sent::Abandoned),
        res = time::timeout(deadline, write) => {
            res.map_err(|_| TransportError::WriteTimeout(deadline))??;
            Ok(Sent::Done)
        }
    }
}

/// Holds back an incomplete trailing UTF-8 sequence until the next chunk.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = incomplete_suffix_len(&self.pending);
        let split = self.pending.len() - keep;
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        let _ = self.pending.drain(..split);
        text
    }

    /// Forget any held bytes, returning how many there were.
    fn reset(&mut self) -> usize {
        let held = self.pending.len();
        self.pending.clear();
        held
    }
}

/// Length of a multi-byte sequence cut off at the end of `buf`, if any.
fn incomplete_suffix_len(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        let byte = buf[buf.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
