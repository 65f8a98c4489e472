//! Vector search index integration.

pub mod client;
pub mod types;

pub use client::SearchIndexClient;
pub use types::{IndexError, RecordFailure, ScoredRecord, UpsertOutcome};
