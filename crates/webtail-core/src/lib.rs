//! # webtail-core
//!
//! Source handles for webtail.
//!
//! - [`Source`]: an incremental cursor over "bytes not yet delivered"
//! - [`BufferSource`]: in-memory append buffer fed by any producer
//! - [`FileSource`]: `tail`-style reader over a file on disk
//! - [`SourceFactory`]: fallback provider used when no source is installed

#![deny(unsafe_code)]

pub mod buffer;
pub mod errors;
pub mod file;
pub mod source;

pub use buffer::BufferSource;
pub use errors::SourceError;
pub use file::{FileSource, StartAt};
pub use source::{SharedSource, Source, SourceFactory};
