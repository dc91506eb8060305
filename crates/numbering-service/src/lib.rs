//! Fiscal numbering worker.
//!
//! Wires the Postgres series store, the numbering protocol, and the event
//! pipeline together. Inbound `document-prepared` notifications are read as
//! JSON lines from stdin and `invoice-created` notifications are written as
//! JSON lines to stdout.

pub mod config;
pub mod feed;

pub use config::{Config, LogFormat};
pub use feed::{
    ServiceError, ensure_series, feed_lines, forward_published, park_stranded, settle_unacked,
};
