//! Event pipeline adapter for the numbering engine.
//!
//! Consumes `document-prepared` notifications from an at-least-once bus,
//! obtains a fiscal number, publishes `invoice-created`, and acknowledges the
//! inbound message only once that publish has succeeded. Redelivery is safe
//! because numbering is idempotent per document id.
//!
//! | outcome | inbound message |
//! |---|---|
//! | numbered and published | acknowledged |
//! | malformed payload | dead-lettered, then acknowledged |
//! | store unavailable, timeout, publish failure | left unacknowledged |
//! | series not seeded | left unacknowledged, logged at error level |

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod worker;

pub use bus::{Delivery, InMemoryBus, MessageBus};
pub use config::PipelineConfig;
pub use error::{BusError, DecodeError, PipelineError};
pub use events::{DeadLetter, DocumentPreparedEvent, InvoiceCreatedEvent};
pub use handler::{Disposition, NumberingHandler};
pub use worker::{BatchReport, NumberingWorker};
