//! The single-connection container: active connection plus current source.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use webtail_core::{SharedSource, SourceFactory};

use crate::errors::StreamError;

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control handle for the installed connection.
///
/// The socket halves belong to the connection's loops; the container keeps
/// only what it needs to tear them down when a newer connection arrives.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    cancel: CancellationToken,
    connected_at: Instant,
}

impl ConnectionHandle {
    /// Connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Token cancelled when this connection must stop.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the connection was cancelled (superseded or shut down).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[derive(Default)]
struct ContainerState {
    connection: Option<ConnectionHandle>,
    source: Option<SharedSource>,
}

/// Holds the one active connection and the source it streams.
///
/// At least one of the initial source and the factory should be given; with
/// neither, the first flush ends the connection with
/// [`StreamError::NoSourceConfigured`].
pub struct Container {
    state: Mutex<ContainerState>,
    factory: Option<SourceFactory>,
}

impl Container {
    /// Create a container from an optional initial source and optional factory.
    pub fn new(source: Option<SharedSource>, factory: Option<SourceFactory>) -> Self {
        Self {
            state: Mutex::new(ContainerState {
                connection: None,
                source,
            }),
            factory,
        }
    }

    /// Container streaming a fixed source with no fallback.
    pub fn with_source(source: SharedSource) -> Self {
        Self::new(Some(source), None)
    }

    /// Container that obtains its source lazily from `factory`.
    pub fn with_factory(factory: SourceFactory) -> Self {
        Self::new(None, Some(factory))
    }

    /// Install a new connection, cancelling the one it replaces.
    ///
    /// The returned handle's token is a child of `parent`, so cancelling the
    /// parent (server shutdown) also stops this connection.
    pub fn install_connection(&self, parent: &CancellationToken) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: ConnectionId::new(),
            cancel: parent.child_token(),
            connected_at: Instant::now(),
        };
        let previous = self.state.lock().connection.replace(handle.clone());
        if let Some(old) = previous {
            info!(old = %old.id, new = %handle.id, "superseding active connection");
            old.cancel.cancel();
        }
        handle
    }

    /// Clear the connection slot if `id` still owns it.
    pub fn release_connection(&self, id: &ConnectionId) -> bool {
        let mut state = self.state.lock();
        if state.connection.as_ref().is_some_and(|c| &c.id == id) {
            state.connection = None;
            true
        } else {
            false
        }
    }

    /// The active connection, if any.
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.state.lock().connection.clone()
    }

    /// Replace the current source.
    pub fn install_source(&self, source: SharedSource) {
        debug!(source = %source.label(), "installing source");
        self.state.lock().source = Some(source);
    }

    /// Uninstall `source` if it is still the current one.
    pub fn clear_source_if(&self, source: &SharedSource) -> bool {
        let mut state = self.state.lock();
        if state.source.as_ref().is_some_and(|s| Arc::ptr_eq(s, source)) {
            state.source = None;
            true
        } else {
            false
        }
    }

    /// The current source, if any.
    pub fn source(&self) -> Option<SharedSource> {
        self.state.lock().source.clone()
    }

    /// Whether a fallback factory is configured.
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Ask the factory for a replacement source and install it.
    pub fn fallback_source(&self) -> Result<SharedSource, StreamError> {
        let factory = self.factory.as_ref().ok_or(StreamError::NoSourceConfigured)?;
        let source = factory()?;
        self.install_source(source.clone());
        Ok(source)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Container")
            .field("connection", &state.connection.as_ref().map(|c| c.id.as_str()))
            .field("source", &state.source.as_ref().map(|s| s.label()))
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
