//! Fiscal number assignment.
//!
//! Turns "increment a counter" into "get or create a stable mapping from
//! document to number". A call first consults the series ledger; only a
//! document with no entry consumes a fresh value, and the ledger append is
//! the point at which a value becomes truly assigned.
//!
//! ```text
//! LOOKUP --hit--> DONE
//! LOOKUP --miss--> INCREMENT -> RECORD --won--> DONE
//!                                      --lost race--> DONE (winner's value)
//! ```
//!
//! Serialization comes entirely from the store's atomic primitives, so any
//! number of tasks or processes may call into the same series.

pub mod config;
pub mod error;
pub mod ledger;
pub mod protocol;

pub use config::NumberingConfig;
pub use error::{NumberingError, Result};
pub use ledger::AssignmentLedger;
pub use protocol::{Assignment, AssignmentOutcome, NumberingService};
