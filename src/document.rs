//! Document model and the processing status state machine.
//!
//! A [`Document`] is one ingested artifact. Its `status` moves strictly forward:
//!
//! ```text
//! PENDING_VALIDATION --(safe & extractable)--> VALIDATED
//! PENDING_VALIDATION --(unsafe | extraction error)--> REJECTED        [terminal]
//! VALIDATED --(chunk+embed+index succeed)--> INDEXED                  [terminal]
//! VALIDATED --(no text | no chunks | embed/index failure)--> FAILED   [terminal]
//! ```
//!
//! `REJECTED` and `FAILED` are terminal for a given ingestion attempt; re-ingesting the
//! same source material creates a fresh document id rather than mutating a terminal record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Awaiting safety and provenance validation.
    PendingValidation,
    /// Validated and safe; eligible for chunking and indexing.
    Validated,
    /// Rejected during validation. Terminal.
    Rejected,
    /// Chunked, embedded, and written to the search index. Terminal.
    Indexed,
    /// Processing failed after validation. Terminal.
    Failed,
}

impl DocumentStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Indexed | Self::Failed)
    }
}

/// Origin of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Direct file upload.
    Upload,
    /// Text scraped from an allow-listed URL.
    UrlScrape,
    /// Pre-seeded government material.
    GovernmentSeed,
}

impl SourceKind {
    /// Stable string form used in index payloads and chunk metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::UrlScrape => "url_scrape",
            Self::GovernmentSeed => "government_seed",
        }
    }
}

/// Maximum number of characters kept in the display preview.
pub const PREVIEW_CHARS: usize = 500;

/// Metadata record for one ingested artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, generated at creation and immutable.
    pub id: String,
    /// Name of the object stored in object storage.
    pub filename: String,
    /// Original upload filename, or the source URL for scraped pages.
    pub original_name: String,
    /// Declared MIME type of the raw bytes.
    pub content_type: String,
    /// Size of the raw bytes.
    pub byte_size: usize,
    /// Opaque key resolving the raw bytes in object storage.
    pub storage_key: String,
    /// Location reported by object storage when the bytes were written.
    pub storage_url: String,
    /// Bounded text preview used for display.
    pub text_preview: Option<String>,
    /// Whether the content passed safety classification.
    pub is_safe: bool,
    /// Reason recorded when validation rejected the document.
    pub rejection_reason: Option<String>,
    /// Current position in the processing state machine.
    pub status: DocumentStatus,
    /// Where the artifact came from.
    pub source: SourceKind,
    /// Optional topical category tag.
    pub category: Option<String>,
    /// Optional language tag.
    pub language: Option<String>,
    /// Whether chunking has completed.
    pub chunked: bool,
    /// Whether index records exist for this document.
    pub indexed: bool,
    /// Number of chunks produced; non-zero only once status is `Indexed`.
    pub chunks_count: usize,
    /// RFC3339 timestamp of ingestion.
    pub uploaded_at: String,
    /// RFC3339 timestamp of validation, when it occurred.
    pub validated_at: Option<String>,
    /// RFC3339 timestamp of index completion, when it occurred.
    pub indexed_at: Option<String>,
}

impl Document {
    /// Create a validated document record for freshly ingested material.
    ///
    /// Ingestion only persists documents that already passed validation, so the record
    /// starts at `Validated` with `validated_at` set.
    #[allow(clippy::too_many_arguments)]
    pub fn validated(
        filename: String,
        original_name: String,
        content_type: String,
        byte_size: usize,
        storage_key: String,
        storage_url: String,
        full_text: &str,
        source: SourceKind,
        category: Option<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            original_name,
            content_type,
            byte_size,
            storage_key,
            storage_url,
            text_preview: Some(preview_of(full_text)),
            is_safe: true,
            rejection_reason: None,
            status: DocumentStatus::Validated,
            source,
            category,
            language: None,
            chunked: false,
            indexed: false,
            chunks_count: 0,
            uploaded_at: now.clone(),
            validated_at: Some(now),
            indexed_at: None,
        }
    }
}

/// Partial update applied to a stored document.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    /// New status, when transitioning.
    pub status: Option<DocumentStatus>,
    /// New chunked flag.
    pub chunked: Option<bool>,
    /// New indexed flag.
    pub indexed: Option<bool>,
    /// New chunk count.
    pub chunks_count: Option<usize>,
    /// Index completion timestamp.
    pub indexed_at: Option<String>,
    /// Rejection or failure reason.
    pub rejection_reason: Option<String>,
}

impl DocumentUpdate {
    /// Apply this update to a document in place.
    pub fn apply(&self, document: &mut Document) {
        if let Some(status) = self.status {
            document.status = status;
        }
        if let Some(chunked) = self.chunked {
            document.chunked = chunked;
        }
        if let Some(indexed) = self.indexed {
            document.indexed = indexed;
        }
        if let Some(count) = self.chunks_count {
            document.chunks_count = count;
        }
        if let Some(at) = &self.indexed_at {
            document.indexed_at = Some(at.clone());
        }
        if let Some(reason) = &self.rejection_reason {
            document.rejection_reason = Some(reason.clone());
        }
    }
}

/// Truncate text to the bounded display preview.
pub fn preview_of(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Current timestamp formatted for document records.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_constructor_sets_state_machine_fields() {
        let doc = Document::validated(
            "abc.txt".into(),
            "notes.txt".into(),
            "text/plain".into(),
            11,
            "abc.txt".into(),
            "memory://abc.txt".into(),
            "hello world",
            SourceKind::Upload,
            None,
        );

        assert_eq!(doc.status, DocumentStatus::Validated);
        assert!(doc.is_safe);
        assert!(doc.validated_at.is_some());
        assert!(!doc.chunked);
        assert_eq!(doc.chunks_count, 0);
        assert_eq!(doc.text_preview.as_deref(), Some("hello world"));
    }

    #[test]
    fn preview_is_bounded() {
        let long = "x".repeat(PREVIEW_CHARS * 2);
        assert_eq!(preview_of(&long).chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn terminal_statuses() {
        assert!(DocumentStatus::Rejected.is_terminal());
        assert!(DocumentStatus::Indexed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Validated.is_terminal());
        assert!(!DocumentStatus::PendingValidation.is_terminal());
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut doc = Document::validated(
            "a".into(),
            "a".into(),
            "text/plain".into(),
            1,
            "a".into(),
            "memory://a".into(),
            "text",
            SourceKind::Upload,
            None,
        );
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Indexed),
            chunks_count: Some(4),
            indexed: Some(true),
            chunked: Some(true),
            indexed_at: Some(now_rfc3339()),
            ..Default::default()
        };
        update.apply(&mut doc);
        assert_eq!(doc.status, DocumentStatus::Indexed);
        assert_eq!(doc.chunks_count, 4);
        assert!(doc.indexed && doc.chunked);
        assert!(doc.indexed_at.is_some());
        assert!(doc.rejection_reason.is_none());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = now_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
