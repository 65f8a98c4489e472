//! Ingestion and processing pipeline.

pub mod ingest;
pub mod processor;

pub use ingest::{IngestionService, IngestionSummary, RawFile, RawUrl};
pub use processor::{BatchOutcome, PipelineError, PipelineProcessor};
