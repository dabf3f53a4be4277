//! The `Source` trait and shared handle aliases.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::Result;

/// A cursor over bytes that have not been delivered yet.
///
/// Producers append data outside of webtail's control; the streaming loop is
/// the only consumer. Each successful [`drain`](Source::drain) advances the
/// cursor, so a later drain returns only bytes that arrived in between.
#[async_trait]
pub trait Source: Send + Sync {
    /// Take every byte that became available since the previous drain.
    ///
    /// An empty `Bytes` means "nothing new right now" and is not an error.
    /// Errors are reserved for genuine read faults and for
    /// [`SourceError::Exhausted`](crate::SourceError::Exhausted).
    async fn drain(&self) -> Result<Bytes>;

    /// Short human-readable label used in logs.
    fn label(&self) -> String {
        "source".to_string()
    }
}

/// Shared handle to the currently installed source.
pub type SharedSource = Arc<dyn Source>;

/// Zero-argument provider of a replacement source.
pub type SourceFactory = Arc<dyn Fn() -> Result<SharedSource> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceError;

    struct Fixed(&'static str);

    #[async_trait]
    impl Source for Fixed {
        async fn drain(&self) -> Result<Bytes> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }
    }

    #[tokio::test]
    async fn trait_object_drains() {
        let src: SharedSource = Arc::new(Fixed("abc"));
        assert_eq!(&src.drain().await.unwrap()[..], b"abc");
        assert_eq!(src.label(), "source");
    }

    #[test]
    fn factory_can_fail() {
        let factory: SourceFactory = Arc::new(|| Err(SourceError::Factory("nope".into())));
        assert!(factory().is_err());
    }
}
