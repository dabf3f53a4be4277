//! In-memory append buffer source.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::errors::{Result, SourceError};
use crate::source::Source;

/// An append-only byte buffer shared between producers and the streamer.
///
/// Writers call [`write`](Self::write) at any time; each drain hands over
/// everything written since the previous drain and leaves the buffer empty.
#[derive(Default)]
pub struct BufferSource {
    pending: Mutex<BytesMut>,
    closed: AtomicBool,
}

impl BufferSource {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes for the next drain. Writes after [`close`](Self::close)
    /// are discarded.
    pub fn write(&self, data: impl AsRef<[u8]>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.pending.lock().extend_from_slice(data.as_ref());
    }

    /// Append a string for the next drain.
    pub fn write_str(&self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Number of bytes waiting to be drained.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Mark the end of the stream. Bytes already written are still delivered.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Source for BufferSource {
    async fn drain(&self) -> Result<Bytes> {
        let chunk = self.pending.lock().split().freeze();
        if chunk.is_empty() && self.is_closed() {
            return Err(SourceError::Exhausted);
        }
        Ok(chunk)
    }

    fn label(&self) -> String {
        "buffer".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_buffer_drains_nothing() {
        let buf = BufferSource::new();
        let chunk = buf.drain().await.unwrap();
        assert!(chunk.is_empty());
    }

    #[tokio::test]
    async fn drain_returns_only_new_bytes() {
        let buf = BufferSource::new();
        buf.write_str("A");
        assert_eq!(&buf.drain().await.unwrap()[..], b"A");
        buf.write_str("B");
        assert_eq!(&buf.drain().await.unwrap()[..], b"B");
        assert!(buf.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_between_drains_are_concatenated() {
        let buf = BufferSource::new();
        buf.write("one ");
        buf.write(b"two");
        assert_eq!(buf.pending_len(), 7);
        assert_eq!(&buf.drain().await.unwrap()[..], b"one two");
        assert_eq!(buf.pending_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_writers_lose_nothing() {
        let buf = Arc::new(BufferSource::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let b = buf.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    b.write("x");
                }
            }));
        }
        let mut total = 0;
        for h in handles {
            h.await.unwrap();
            total += buf.drain().await.unwrap().len();
        }
        total += buf.drain().await.unwrap().len();
        assert_eq!(total, 400);
    }

    #[tokio::test]
    async fn closed_buffer_delivers_pending_then_exhausts() {
        let buf = BufferSource::new();
        buf.write_str("last words");
        buf.close();
        buf.write_str("ignored");
        assert_eq!(&buf.drain().await.unwrap()[..], b"last words");
        assert!(matches!(buf.drain().await, Err(SourceError::Exhausted)));
    }

    #[test]
    fn label_is_buffer() {
        assert_eq!(BufferSource::new().label(), "buffer");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Write(Vec<u8>),
            Drain,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                proptest::collection::vec(any::<u8>(), 0..32).prop_map(Op::Write),
                Just(Op::Drain),
            ]
        }

        proptest! {
            #[test]
            fn every_write_is_drained_exactly_once(ops in proptest::collection::vec(op(), 0..64)) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let buf = BufferSource::new();
                let mut written = Vec::new();
                let mut since_drain = Vec::new();
                let mut delivered = Vec::new();

                for op in ops {
                    match op {
                        Op::Write(data) => {
                            buf.write(&data);
                            written.extend_from_slice(&data);
                            since_drain.extend_from_slice(&data);
                        }
                        Op::Drain => {
                            let chunk = rt.block_on(buf.drain()).unwrap();
                            prop_assert_eq!(&chunk[..], &since_drain[..]);
                            delivered.extend_from_slice(&chunk);
                            since_drain.clear();
                        }
                    }
                }
                delivered.extend_from_slice(&rt.block_on(buf.drain()).unwrap());
                prop_assert_eq!(delivered, written);
            }
        }
    }
}
