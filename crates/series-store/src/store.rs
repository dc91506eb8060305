use async_trait::async_trait;

use crate::{AppendOutcome, DocumentId, LedgerEntry, NewSeries, Result, Series, SeriesId};

/// Core trait for series store implementations.
///
/// Every mutating method must be a single atomic update against the series
/// document in the backing store (find-and-modify, `UPDATE ... RETURNING`,
/// a single lock acquisition in memory). Concurrent callers, in this process
/// or another, must observe disjoint increments.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Seeds a new series. Not used by the numbering path.
    async fn create_series(&self, new_series: NewSeries) -> Result<Series>;

    /// Reads a series by name.
    ///
    /// Fails with `SeriesNotFound` if no such series was seeded.
    async fn find_series(&self, name: &str) -> Result<Series>;

    /// Reads a series by id.
    async fn get_series(&self, series_id: SeriesId) -> Result<Series>;

    /// Returns the ledger entry for a document, if one was recorded.
    async fn find_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<Option<LedgerEntry>>;

    /// Increments `last_value` by exactly one and returns the new value.
    async fn atomic_increment(&self, series_id: SeriesId) -> Result<i64>;

    /// Records `document_id -> value` unless the document is already present,
    /// in which case the stored value is returned instead.
    async fn append_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
        value: i64,
    ) -> Result<AppendOutcome>;

    /// Draws a fresh value and records it for the document.
    ///
    /// The default performs `atomic_increment` then `append_ledger_entry` as
    /// two separate writes. If the process dies between them the counter has
    /// advanced with no ledger entry claiming the value, leaving a gap.
    /// Stores with multi-statement transactions should override this to
    /// commit both writes together and roll back on failure.
    async fn increment_and_record(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<AppendOutcome> {
        let value = self.atomic_increment(series_id).await?;
        tracing::debug!(%series_id, %document_id, value, "counter incremented");
        self.append_ledger_entry(series_id, document_id, value)
            .await
    }
}
