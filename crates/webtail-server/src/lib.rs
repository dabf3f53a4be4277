//! # webtail-server
//!
//! Axum HTTP + `WebSocket` server that streams one source to one client.
//!
//! - [`container::Container`]: the single active connection plus the current source
//! - `WebSocket` gateway: admission, liveness monitor, flush/ping scheduler
//! - HTTP endpoints: presentation page, upgrade, health, metrics
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod container;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod page;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod websocket;

pub use config::{ServerConfig, StreamTimings};
pub use container::Container;
pub use errors::{StreamError, TransportError};
pub use server::WebtailServer;
