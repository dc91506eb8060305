//! Numbering error types.

use std::time::Duration;

use series_store::StoreError;
use thiserror::Error;

/// Errors that can occur while assigning a fiscal number.
#[derive(Debug, Error)]
pub enum NumberingError {
    /// The series was never seeded. Operator attention required.
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// The series has no values left. Operator attention required.
    #[error("Series exhausted: {0}")]
    SeriesExhausted(String),

    /// The store could not be reached; retrying later may succeed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A store call did not complete in time. The write may or may not
    /// have committed.
    #[error("Store operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The document id is blank.
    #[error("Document id must not be empty")]
    EmptyDocumentId,

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl NumberingError {
    /// Returns true when the same request may succeed on redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NumberingError::StoreUnavailable(_) | NumberingError::Timeout { .. }
        )
    }

    /// Returns true when the store may have applied the write even though
    /// the call failed.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, NumberingError::Timeout { .. })
    }
}

impl From<StoreError> for NumberingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeriesNotFound(series) => NumberingError::SeriesNotFound(series),
            StoreError::SeriesExhausted(series) => NumberingError::SeriesExhausted(series),
            e if e.is_transient() => NumberingError::StoreUnavailable(e),
            e => NumberingError::Store(e),
        }
    }
}

/// Convenience type alias for numbering results.
pub type Result<T> = std::result::Result<T, NumberingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let missing: NumberingError = StoreError::SeriesNotFound("1".into()).into();
        assert!(matches!(missing, NumberingError::SeriesNotFound(_)));
        assert!(!missing.is_transient());

        let exhausted: NumberingError = StoreError::SeriesExhausted("1".into()).into();
        assert!(matches!(exhausted, NumberingError::SeriesExhausted(_)));
        assert!(!exhausted.is_transient());

        let down: NumberingError = StoreError::Unavailable("refused".into()).into();
        assert!(matches!(down, NumberingError::StoreUnavailable(_)));
        assert!(down.is_transient());
        assert!(!down.is_unknown_outcome());

        let conflict: NumberingError = StoreError::ValueAlreadyClaimed {
            series: "1".into(),
            value: 3,
        }
        .into();
        assert!(matches!(conflict, NumberingError::Store(_)));
        assert!(!conflict.is_transient());
    }

    #[test]
    fn timeout_is_transient_with_unknown_outcome() {
        let err = NumberingError::Timeout {
            operation: "increment_and_record",
            after: Duration::from_millis(50),
        };
        assert!(err.is_transient());
        assert!(err.is_unknown_outcome());
    }
}
