//! Logical view over a series' assignment ledger.

use common::{DocumentId, SeriesId};
use series_store::{AppendOutcome, LedgerEntry, SeriesStore};

/// The idempotency record of a series: document id to assigned value.
///
/// Entries are append-only and keyed by document id. `lookup` is the single
/// source of truth for whether a document already holds a number.
pub struct AssignmentLedger<'a, S: SeriesStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: SeriesStore + ?Sized> AssignmentLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns the value recorded for the document, if any.
    pub async fn lookup(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> series_store::Result<Option<i64>> {
        Ok(self
            .store
            .find_ledger_entry(series_id, document_id)
            .await?
            .map(|entry| entry.value))
    }

    /// Draws the next counter value and records it for the document.
    ///
    /// `AlreadyPresent` means another caller recorded the document first;
    /// its value is the one that counts.
    pub async fn claim(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> series_store::Result<AppendOutcome> {
        self.store.increment_and_record(series_id, document_id).await
    }

    /// All recorded entries, ordered by assigned value.
    pub async fn entries(&self, series_id: SeriesId) -> series_store::Result<Vec<LedgerEntry>> {
        let mut entries = self.store.get_series(series_id).await?.ledger;
        entries.sort_by_key(|e| e.value);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use series_store::{InMemorySeriesStore, NewSeries};

    #[tokio::test]
    async fn lookup_misses_until_claimed() {
        let store = InMemorySeriesStore::new();
        let series = store
            .create_series(NewSeries::new("1", "invoice"))
            .await
            .unwrap();
        let ledger = AssignmentLedger::new(&store);
        let doc = DocumentId::new("docA");

        assert_eq!(ledger.lookup(series.id, &doc).await.unwrap(), None);

        let outcome = ledger.claim(series.id, &doc).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Recorded(1));
        assert_eq!(ledger.lookup(series.id, &doc).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn entries_are_ordered_by_value() {
        let store = InMemorySeriesStore::new();
        let series = store
            .create_series(NewSeries::new("1", "invoice"))
            .await
            .unwrap();
        let ledger = AssignmentLedger::new(&store);

        for doc in ["c", "a", "b"] {
            ledger.claim(series.id, &DocumentId::new(doc)).await.unwrap();
        }

        let entries = ledger.entries(series.id).await.unwrap();
        let values: Vec<i64> = entries.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(entries[0].document_id, DocumentId::new("c"));
    }
}
