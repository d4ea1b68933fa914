//! lakesync synchronizes a versioned lake table into a cloud data warehouse and
//! folds it into a curated table via an idempotent, change-aware merge.
//!
//! The crate is organized around the run's data flow: [`lake`] resolves the
//! latest committed version and materializes a snapshot, [`warehouse`] defines
//! the destination operations (with BigQuery and in-memory implementations),
//! and [`pipeline`] sequences one run end to end.

pub mod error;
pub mod lake;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod tables;
pub mod types;
pub mod warehouse;
