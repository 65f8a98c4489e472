//! Shared types used by the search index client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// An upsert batch was internally inconsistent before any network call.
    #[error("Embedding batch mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected count or vector dimension.
        expected: usize,
        /// Observed count or vector dimension.
        actual: usize,
    },
}

/// One chunk that failed to index, with the reason.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    /// Identifier of the chunk that failed.
    pub chunk_id: String,
    /// Human-readable failure description.
    pub error: String,
}

/// Result of an upsert request across all sub-batches.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    /// Number of chunks accepted by the index.
    pub succeeded: usize,
    /// Chunks the index rejected, with reasons.
    pub failures: Vec<RecordFailure>,
}

impl UpsertOutcome {
    /// True when every submitted chunk was accepted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scored payload returned by similarity queries.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by the index.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
