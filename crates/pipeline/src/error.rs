//! Pipeline error types.

use numbering::NumberingError;
use thiserror::Error;

/// Errors raised by a message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The message could not be published.
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The bus could not be reached.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    /// The delivery is not in flight (already acknowledged or never polled).
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(u64),
}

/// Errors decoding an inbound notification. Never retryable.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a valid `document-prepared` JSON object.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload decoded but carries a blank document id.
    #[error("Payload has an empty document id")]
    MissingDocumentId,
}

/// Errors that can occur while handling one inbound message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Numbering error: {0}")]
    Numbering(#[from] NumberingError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
