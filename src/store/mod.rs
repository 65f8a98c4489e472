//! External collaborator interfaces: document metadata store and object storage.
//!
//! The pipeline treats persistence as opaque. Both traits are constructor-injected so
//! tests can swap deterministic fakes for the real backends. The metadata store exposes
//! a compare-and-set status transition; status acts as the only guard against
//! double-processing, so every writer that completes a stage must persist the resulting
//! status before considering the stage committed.

mod memory;

pub use memory::{MemoryMetadataStore, MemoryObjectStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::document::{Document, DocumentStatus, DocumentUpdate};

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend failed to complete the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Keyed document metadata store with a status-filtered scan.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a new document record.
    async fn create(&self, document: Document) -> Result<(), StoreError>;

    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Apply a partial update to a document unconditionally.
    async fn update(&self, id: &str, update: DocumentUpdate) -> Result<(), StoreError>;

    /// Apply a partial update only when the stored status matches `expected`.
    ///
    /// Returns `false` without writing when the status has moved on, which is how
    /// concurrent processors avoid double-indexing the same document.
    async fn update_if_status(
        &self,
        id: &str,
        expected: DocumentStatus,
        update: DocumentUpdate,
    ) -> Result<bool, StoreError>;

    /// Return up to `limit` documents currently in `status`, oldest first.
    async fn query_by_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Remove a document record. Returns `false` when no record existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Raw byte storage addressed by opaque keys.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes under `key`, returning the backend's location string.
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str)
    -> Result<String, StoreError>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Delete the object stored under `key`. Returns `false` when absent.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
