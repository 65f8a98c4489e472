#![deny(missing_docs)]

//! Core library for the Cividex document ingestion and retrieval server.

/// HTTP routing and REST handlers.
pub mod api;
/// Token-aware document chunking.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Document model and processing status state machine.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction for uploaded files and scraped pages.
pub mod extract;
/// Vector search index client.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Ingestion and processing pipeline.
pub mod pipeline;
/// Query-time retrieval and citation assembly.
pub mod retrieval;
/// Content-safety and URL provenance validation.
pub mod safety;
/// Metadata and object storage collaborators.
pub mod store;
