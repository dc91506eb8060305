//! The get-or-create protocol binding documents to fiscal numbers.

use std::future::Future;

use common::{DocumentId, FiscalNumber, SeriesId};
use series_store::{AppendOutcome, SeriesStore};

use crate::config::NumberingConfig;
use crate::error::{NumberingError, Result};
use crate::ledger::AssignmentLedger;

/// Which path an assignment took through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// The document was already in the ledger; nothing was consumed.
    Existing,
    /// A fresh value was drawn and recorded.
    Assigned,
    /// A concurrent caller recorded the document first. Its value is
    /// returned; the value drawn here is discarded.
    RaceLost,
}

/// The fiscal number bound to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub series_id: SeriesId,
    pub document_id: DocumentId,
    pub fiscal_number: FiscalNumber,
    pub outcome: AssignmentOutcome,
}

/// Assigns fiscal numbers to documents, at most one per document per series.
///
/// Safe to call concurrently from many tasks and processes against one
/// store: uniqueness comes from the store's atomic increment and the
/// ledger's per-document uniqueness, never from a lock held here.
pub struct NumberingService<S: SeriesStore> {
    store: S,
    config: NumberingConfig,
}

impl<S: SeriesStore> NumberingService<S> {
    /// Creates a new numbering service with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, NumberingConfig::default())
    }

    pub fn with_config(store: S, config: NumberingConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> AssignmentLedger<'_, S> {
        AssignmentLedger::new(&self.store)
    }

    /// Resolves a series name to its id.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_series(&self, name: &str) -> Result<SeriesId> {
        let series = self
            .bounded("find_series", self.store.find_series(name))
            .await?;
        Ok(series.id)
    }

    /// Returns the fiscal number for a document, assigning one if needed.
    ///
    /// Calling this any number of times for the same document, sequentially
    /// or concurrently, yields the same number. A failed call is not
    /// resumable; retrying re-enters at the ledger lookup.
    #[tracing::instrument(skip_all, fields(%series_id, %document_id))]
    pub async fn assign_fiscal_number(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<Assignment> {
        let started = std::time::Instant::now();
        let result = self.get_or_assign(series_id, document_id).await;
        metrics::histogram!("numbering_assign_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn get_or_assign(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<Assignment> {
        if document_id.is_blank() {
            return Err(NumberingError::EmptyDocumentId);
        }

        let ledger = self.ledger();

        if let Some(value) = self
            .bounded("lookup", ledger.lookup(series_id, document_id))
            .await?
        {
            metrics::counter!("numbering_idempotent_hits_total").increment(1);
            tracing::debug!(value, "document already numbered");
            return Ok(self.assignment(
                series_id,
                document_id,
                value,
                AssignmentOutcome::Existing,
            ));
        }

        match self
            .bounded("increment_and_record", ledger.claim(series_id, document_id))
            .await?
        {
            AppendOutcome::Recorded(value) => {
                metrics::counter!("numbering_assignments_total").increment(1);
                tracing::info!(value, "fiscal number assigned");
                Ok(self.assignment(series_id, document_id, value, AssignmentOutcome::Assigned))
            }
            AppendOutcome::AlreadyPresent(value) => {
                metrics::counter!("numbering_race_lost_total").increment(1);
                tracing::warn!(value, "lost ledger race, returning winner's number");
                Ok(self.assignment(series_id, document_id, value, AssignmentOutcome::RaceLost))
            }
        }
    }

    fn assignment(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
        value: i64,
        outcome: AssignmentOutcome,
    ) -> Assignment {
        Assignment {
            series_id,
            document_id: document_id.clone(),
            fiscal_number: FiscalNumber::new(value),
            outcome,
        }
    }

    /// Runs a store call under the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = series_store::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(NumberingError::from),
            Err(_) => {
                metrics::counter!("numbering_store_timeouts_total").increment(1);
                tracing::warn!(operation, "store call timed out, outcome unknown");
                Err(NumberingError::Timeout {
                    operation,
                    after: self.config.store_timeout,
                })
            }
        }
    }
}
