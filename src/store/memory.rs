//! In-memory collaborator implementations.
//!
//! The default wiring for local runs and the fakes used throughout the test suite.
//! A deployment against real backends implements the same traits over its own clients.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Document, DocumentStatus, DocumentUpdate};
use crate::store::{MetadataStore, ObjectStorage, StoreError};

/// Process-local document metadata store.
#[derive(Default, Clone)]
pub struct MemoryMetadataStore {
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, document: Document) -> Result<(), StoreError> {
        let mut guard = self.documents.write().await;
        guard.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: DocumentUpdate) -> Result<(), StoreError> {
        let mut guard = self.documents.write().await;
        let document = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(document);
        Ok(())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: DocumentStatus,
        update: DocumentUpdate,
    ) -> Result<bool, StoreError> {
        let mut guard = self.documents.write().await;
        let document = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if document.status != expected {
            return Ok(false);
        }
        update.apply(document);
        Ok(true)
    }

    async fn query_by_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.documents.read().await;
        let mut matching: Vec<Document> = guard
            .values()
            .filter(|doc| doc.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.documents.write().await.remove(id).is_some())
    }
}

/// Process-local object storage keyed by opaque names.
#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryObjectStore {
    /// Create an empty object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether no objects are stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStore {
    async fn put(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut guard = self.objects.write().await;
        guard.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.write().await.remove(key).is_some())
    }
}
