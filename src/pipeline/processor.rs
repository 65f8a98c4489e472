//! Chunk, embed, and index validated documents.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chunking::{ChunkMetadata, Chunker};
use crate::document::{DocumentStatus, DocumentUpdate, now_rfc3339};
use crate::embedding::EmbeddingClient;
use crate::index::{IndexError, SearchIndexClient};
use crate::metrics::IngestMetrics;
use crate::store::{MetadataStore, ObjectStorage, StoreError};

/// Minimum characters of extracted text worth chunking.
const MIN_TEXT_LEN: usize = 10;

/// Errors that abort document processing instead of marking it failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Metadata store failed; the document's state is unknown.
    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
    /// Embedding vectors do not match the configured index dimension.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(IndexError),
}

/// Accounting for one batch-processing run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct BatchOutcome {
    /// Documents examined.
    pub total: usize,
    /// Documents that reached `Indexed`.
    pub succeeded: usize,
    /// Documents that ended `Failed` or were skipped.
    pub failed: usize,
}

/// Drives validated documents through chunking, embedding, and indexing.
pub struct PipelineProcessor {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStorage>,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    index: Option<SearchIndexClient>,
    metrics: Arc<IngestMetrics>,
}

impl PipelineProcessor {
    /// Assemble the processor from its collaborators. `index` is `None` in
    /// degraded mode, where documents fail processing rather than silently
    /// skipping the index write.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStorage>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingClient>,
        index: Option<SearchIndexClient>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            metadata,
            storage,
            chunker,
            embedder,
            index,
            metrics,
        }
    }

    /// Process one validated document to completion.
    ///
    /// Returns `Ok(true)` when the document reached `Indexed`. A missing
    /// document, a document in any status other than `Validated`, and
    /// per-document failures all return `Ok(false)`; the guard makes repeat
    /// calls on a finished document a no-op. Only infrastructure errors that
    /// leave state unknown surface as `Err`.
    pub async fn process_document(&self, document_id: &str) -> Result<bool, PipelineError> {
        let Some(document) = self.metadata.get(document_id).await? else {
            tracing::warn!(document_id, "Document not found");
            return Ok(false);
        };
        if document.status != DocumentStatus::Validated {
            tracing::debug!(
                document_id,
                status = ?document.status,
                "Skipping document not awaiting processing"
            );
            return Ok(false);
        }

        // full extracted text lives in object storage; the stored preview is
        // display-bounded and only used when the object read fails
        let text = match self.storage.get(&document.storage_key).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(document_id, "Stored object is not valid UTF-8");
                    document.text_preview.clone().unwrap_or_default()
                }
            },
            Err(error) => {
                tracing::warn!(document_id, error = %error, "Object read failed; using preview");
                document.text_preview.clone().unwrap_or_default()
            }
        };

        if text.trim().chars().count() < MIN_TEXT_LEN {
            return self
                .mark_failed(document_id, "insufficient text for chunking")
                .await;
        }

        let chunk_metadata = ChunkMetadata {
            filename: document.original_name.clone(),
            source: document.source.as_str().to_string(),
            category: document.category.clone().unwrap_or_default(),
            uri: document.storage_url.clone(),
        };
        let chunks = self.chunker.chunk(&text, document_id, &chunk_metadata);
        if chunks.is_empty() {
            return self.mark_failed(document_id, "no chunks produced").await;
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(error) => {
                tracing::error!(document_id, error = %error, "Embedding failed");
                return self
                    .mark_failed(document_id, &format!("embedding failed ({error})"))
                    .await;
            }
        };

        let Some(index) = &self.index else {
            return self.mark_failed(document_id, "no search index configured").await;
        };
        let outcome = match index.upsert_chunks(&chunks, &vectors).await {
            Ok(outcome) => outcome,
            Err(error @ IndexError::DimensionMismatch { .. }) => {
                // a misconfigured dimension poisons every document; stop the run
                return Err(PipelineError::DimensionMismatch(error));
            }
            Err(error) => {
                tracing::error!(document_id, error = %error, "Index write failed");
                return self
                    .mark_failed(document_id, &format!("index write failed ({error})"))
                    .await;
            }
        };
        if !outcome.is_complete() {
            return self
                .mark_failed(
                    document_id,
                    &format!("{} chunks failed to index", outcome.failures.len()),
                )
                .await;
        }

        let update = DocumentUpdate {
            status: Some(DocumentStatus::Indexed),
            chunked: Some(true),
            indexed: Some(true),
            chunks_count: Some(chunks.len()),
            indexed_at: Some(now_rfc3339()),
            ..Default::default()
        };
        let written = self
            .metadata
            .update_if_status(document_id, DocumentStatus::Validated, update)
            .await?;
        if !written {
            tracing::warn!(document_id, "Document moved on during processing; result dropped");
            return Ok(false);
        }

        self.metrics.record_indexed(chunks.len() as u64);
        tracing::info!(document_id, chunks = chunks.len(), "Document indexed");
        Ok(true)
    }

    /// Process every document currently awaiting processing, oldest first.
    pub async fn process_pending(&self, limit: usize) -> Result<BatchOutcome, PipelineError> {
        let pending = self
            .metadata
            .query_by_status(DocumentStatus::Validated, limit)
            .await?;
        let mut outcome = BatchOutcome {
            total: pending.len(),
            ..Default::default()
        };

        for document in pending {
            match self.process_document(&document.id).await {
                Ok(true) => outcome.succeeded += 1,
                Ok(false) => outcome.failed += 1,
                Err(error) => return Err(error),
            }
        }
        tracing::info!(
            total = outcome.total,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Batch processing finished"
        );
        Ok(outcome)
    }

    /// Remove a document and everything derived from it: index vectors, the
    /// stored object, and finally the metadata record.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, PipelineError> {
        let Some(document) = self.metadata.get(document_id).await? else {
            return Ok(false);
        };

        if let Some(index) = &self.index
            && let Err(error) = index.delete_by_document(document_id).await
        {
            tracing::warn!(document_id, error = %error, "Index cleanup failed; continuing");
        }
        if let Err(error) = self.storage.delete(&document.storage_key).await {
            tracing::warn!(document_id, error = %error, "Object cleanup failed; continuing");
        }
        Ok(self.metadata.delete(document_id).await?)
    }

    async fn mark_failed(&self, document_id: &str, reason: &str) -> Result<bool, PipelineError> {
        tracing::warn!(document_id, reason, "Document failed processing");
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Failed),
            rejection_reason: Some(reason.to_string()),
            ..Default::default()
        };
        // best effort: if the status already moved on, the other writer wins
        match self
            .metadata
            .update_if_status(document_id, DocumentStatus::Validated, update)
            .await
        {
            Ok(_) => {}
            Err(error) => {
                tracing::error!(document_id, error = %error, "Failed to record failure status");
            }
        }
        self.metrics.record_failed();
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, SourceKind};
    use crate::embedding::LocalHashEmbedder;
    use crate::store::{MemoryMetadataStore, MemoryObjectStore};
    use httpmock::{Method::PUT, MockServer};

    async fn seeded(
        text: &str,
    ) -> (Arc<MemoryMetadataStore>, Arc<MemoryObjectStore>, String) {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let key = "doc.txt";
        let url = storage
            .put(text.as_bytes().to_vec(), key, "text/plain")
            .await
            .unwrap();
        let document = Document::validated(
            key.to_string(),
            "doc.txt".to_string(),
            "text/plain".to_string(),
            text.len(),
            key.to_string(),
            url,
            text,
            SourceKind::Upload,
            None,
        );
        let id = document.id.clone();
        metadata.create(document).await.unwrap();
        (metadata, storage, id)
    }

    fn processor(
        metadata: Arc<MemoryMetadataStore>,
        storage: Arc<MemoryObjectStore>,
        index: Option<SearchIndexClient>,
    ) -> PipelineProcessor {
        PipelineProcessor::new(
            metadata,
            storage,
            Chunker::new(800, 100).unwrap(),
            Arc::new(LocalHashEmbedder::new(8)),
            index,
            Arc::new(IngestMetrics::new()),
        )
    }

    #[tokio::test]
    async fn missing_document_is_a_no_op() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let processor = processor(metadata, storage, None);
        assert!(!processor.process_document("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn short_text_marks_the_document_failed() {
        let (metadata, storage, id) = seeded("tiny").await;
        let processor = processor(metadata.clone(), storage, None);

        assert!(!processor.process_document(&id).await.unwrap());
        let document = metadata.get(&id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Failed);
        assert!(document
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("insufficient text"));
    }

    #[tokio::test]
    async fn degraded_mode_fails_instead_of_indexing() {
        let (metadata, storage, id) = seeded(
            "The council approved the updated zoning map for the riverside district.",
        )
        .await;
        let processor = processor(metadata.clone(), storage, None);

        assert!(!processor.process_document(&id).await.unwrap());
        let document = metadata.get(&id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn finished_document_is_not_reprocessed() {
        let (metadata, storage, id) = seeded("some reasonable body of text here").await;
        metadata
            .update(
                &id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Indexed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let processor = processor(metadata.clone(), storage, None);
        assert!(!processor.process_document(&id).await.unwrap());
        // still Indexed, untouched by the failed-path writer
        let document = metadata.get(&id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Indexed);
        assert!(document.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn process_pending_reports_per_document_results() {
        let (metadata, storage, _good) = seeded(
            "A long enough body of text that chunking will happily accept and process.",
        )
        .await;
        // second record with too little text to survive
        let short = Document::validated(
            "short.txt".into(),
            "short.txt".into(),
            "text/plain".into(),
            4,
            "short.txt".into(),
            "memory://short.txt".into(),
            "tiny",
            SourceKind::Upload,
            None,
        );
        storage
            .put(b"tiny".to_vec(), "short.txt", "text/plain")
            .await
            .unwrap();
        metadata.create(short).await.unwrap();

        // no index configured, so even the long document fails
        let processor = processor(metadata, storage, None);
        let outcome = processor.process_pending(50).await.unwrap();
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 2);
    }

    #[tokio::test]
    async fn multibyte_text_indexes_with_small_windows() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/points");
                then.status(200).json_body(serde_json::json!({ "status": "ok" }));
            })
            .await;

        // window boundaries land inside the emoji; processing must still
        // carry the document to Indexed instead of surfacing an error
        let (metadata, storage, id) = seeded(&"🎉 fiesta municipal 🎉 ".repeat(12)).await;
        let index = SearchIndexClient::new(server.base_url(), "civic".into(), None, 8).unwrap();
        let processor = PipelineProcessor::new(
            metadata.clone(),
            storage,
            Chunker::new(3, 1).unwrap(),
            Arc::new(LocalHashEmbedder::new(8)),
            Some(index),
            Arc::new(IngestMetrics::new()),
        );

        assert!(processor.process_document(&id).await.unwrap());
        let document = metadata.get(&id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Indexed);
        assert!(upsert.hits_async().await >= 1);
    }

    #[tokio::test]
    async fn delete_removes_object_and_record() {
        let (metadata, storage, id) = seeded("document slated for removal").await;
        let processor = processor(metadata.clone(), storage.clone(), None);

        assert!(processor.delete_document(&id).await.unwrap());
        assert!(metadata.get(&id).await.unwrap().is_none());
        assert!(storage.is_empty().await);
        // second delete finds nothing
        assert!(!processor.delete_document(&id).await.unwrap());
    }
}
