pub mod types;

pub use types::{DocumentId, FiscalNumber, SeriesId};
