//! Persistent storage for fiscal counter series.
//!
//! A series is a single logical document holding a monotonic `last_value`
//! and the ledger of document ids already numbered from it. All mutation goes
//! through the store's own atomic update primitive; callers never read a
//! value and write it back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod series;
pub mod store;

pub use common::{DocumentId, SeriesId};
pub use error::{Result, StoreError};
pub use memory::InMemorySeriesStore;
pub use postgres::PostgresSeriesStore;
pub use series::{AppendOutcome, LedgerEntry, NewSeries, Series};
pub use store::SeriesStore;
