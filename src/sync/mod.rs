//! Document to relational synchronization.
//!
//! [`SyncEngine`] drives a run: it walks the units of a
//! [`SyncSpec`](docrel_core::SyncSpec), resolves merge joins against the
//! document store and upserts the resulting rows.

mod engine;
mod error;
mod join;

pub use engine::{RunReport, SyncEngine};
pub use error::SyncError;
