//! WebSocket connection admission, liveness monitoring, and flush/ping scheduling.

pub mod liveness;
pub mod scheduler;
pub mod session;
