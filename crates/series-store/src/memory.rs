use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AppendOutcome, DocumentId, LedgerEntry, NewSeries, Result, Series, SeriesId, StoreError,
    store::SeriesStore,
};

#[derive(Debug, Default)]
struct SeriesTable {
    series: HashMap<SeriesId, Series>,
    by_name: HashMap<String, SeriesId>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_on_append: AtomicBool,
}

/// In-memory series store for testing.
///
/// Each mutation takes the table's write lock exactly once, which gives the
/// same single-document atomicity the PostgreSQL implementation gets from
/// `UPDATE ... RETURNING`. Faults can be injected to exercise transient
/// failure paths.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesStore {
    table: Arc<RwLock<SeriesTable>>,
    faults: Arc<Faults>,
    increments: Arc<AtomicU64>,
}

impl InMemorySeriesStore {
    /// Creates a new empty in-memory series store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes ledger appends fail after the counter has been incremented,
    /// which is what a crash between the two writes looks like.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.faults.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Total number of successful `atomic_increment` calls across all series.
    pub fn increment_count(&self) -> u64 {
        self.increments.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn create_series(&self, new_series: NewSeries) -> Result<Series> {
        self.check_available()?;
        let mut table = self.table.write().await;

        if table.by_name.contains_key(&new_series.name) {
            return Err(StoreError::SeriesAlreadyExists(new_series.name));
        }

        let series = new_series.into_series();
        table.by_name.insert(series.name.clone(), series.id);
        table.series.insert(series.id, series.clone());
        Ok(series)
    }

    async fn find_series(&self, name: &str) -> Result<Series> {
        self.check_available()?;
        let table = self.table.read().await;
        table
            .by_name
            .get(name)
            .and_then(|id| table.series.get(id))
            .cloned()
            .ok_or_else(|| StoreError::SeriesNotFound(name.to_string()))
    }

    async fn get_series(&self, series_id: SeriesId) -> Result<Series> {
        self.check_available()?;
        let table = self.table.read().await;
        table
            .series
            .get(&series_id)
            .cloned()
            .ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))
    }

    async fn find_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<Option<LedgerEntry>> {
        self.check_available()?;
        let table = self.table.read().await;
        let series = table
            .series
            .get(&series_id)
            .ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))?;
        Ok(series.ledger_entry(document_id).cloned())
    }

    async fn atomic_increment(&self, series_id: SeriesId) -> Result<i64> {
        self.check_available()?;
        let mut table = self.table.write().await;
        let series = table
            .series
            .get_mut(&series_id)
            .ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))?;

        series.last_value = series
            .last_value
            .checked_add(1)
            .ok_or_else(|| StoreError::SeriesExhausted(series_id.to_string()))?;
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(series.last_value)
    }

    async fn append_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
        value: i64,
    ) -> Result<AppendOutcome> {
        self.check_available()?;
        if self.faults.fail_on_append.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "connection lost before ledger append".to_string(),
            ));
        }

        let mut table = self.table.write().await;
        let series = table
            .series
            .get_mut(&series_id)
            .ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))?;

        if let Some(existing) = series.ledger_entry(document_id) {
            return Ok(AppendOutcome::AlreadyPresent(existing.value));
        }

        // Unique (series, value) constraint simulation
        if series.ledger.iter().any(|e| e.value == value) {
            return Err(StoreError::ValueAlreadyClaimed {
                series: series_id.to_string(),
                value,
            });
        }

        series
            .ledger
            .push(LedgerEntry::new(document_id.clone(), value));
        Ok(AppendOutcome::Recorded(value))
    }
}
