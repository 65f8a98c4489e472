//! Intake validation for uploaded files and government URLs.
//!
//! Ingestion decides whether material enters the system at all. Files are
//! extracted and safety-classified before any byte reaches object storage;
//! URLs must pass the provenance allow-list and a reachability probe before
//! their pages are fetched. Rejections never create document records.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::document::{Document, SourceKind};
use crate::extract::{extract_html, extract_text};
use crate::metrics::IngestMetrics;
use crate::safety::{SafetyClient, UrlValidator};
use crate::store::{MetadataStore, ObjectStorage};

/// Minimum extracted characters for a scraped page to be worth indexing.
const MIN_SCRAPED_CHARS: usize = 100;
/// Character ceiling of scraped text submitted to the safety classifier.
const SCRAPED_SAFETY_CHARS: usize = 8000;
/// Timeout for fetching an already-validated page body.
const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// An uploaded file awaiting validation.
pub struct RawFile {
    /// Declared filename, used for format dispatch.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Optional topical category.
    pub category: Option<String>,
}

/// A URL submitted for scraping.
pub struct RawUrl {
    /// Absolute URL of the page.
    pub url: String,
    /// Optional topical category.
    pub category: Option<String>,
}

/// Per-batch accounting returned from an ingestion call.
#[derive(Debug, Default, Serialize)]
pub struct IngestionSummary {
    /// Optional human-readable status line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Identifiers of documents created by this batch.
    pub document_ids: Vec<String>,
    /// Number of files examined.
    pub files_processed: usize,
    /// Number of URLs examined.
    pub urls_processed: usize,
    /// Files that produced a validated document.
    pub files_accepted: usize,
    /// Files rejected, as `{name}: {reason}` lines.
    pub files_rejected: Vec<String>,
    /// URLs that produced a validated document.
    pub urls_accepted: usize,
    /// URLs rejected, as `{url}: {reason}` lines.
    pub urls_rejected: Vec<String>,
}

/// Validates incoming material and persists what passes.
pub struct IngestionService {
    safety: SafetyClient,
    url_validator: UrlValidator,
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStorage>,
    metrics: Arc<IngestMetrics>,
    page_client: Client,
}

impl IngestionService {
    /// Assemble the service from its collaborators.
    pub fn new(
        safety: SafetyClient,
        url_validator: UrlValidator,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStorage>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        let page_client = Client::builder()
            .user_agent("cividex/0.1")
            .timeout(PAGE_FETCH_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            safety,
            url_validator,
            metadata,
            storage,
            metrics,
            page_client,
        }
    }

    /// Validate a batch of files and URLs, persisting each accepted item as a
    /// `Validated` document. Rejections are reported per item; one bad item
    /// never aborts the batch.
    pub async fn ingest(&self, files: Vec<RawFile>, urls: Vec<RawUrl>) -> IngestionSummary {
        let mut summary = IngestionSummary {
            files_processed: files.len(),
            urls_processed: urls.len(),
            ..Default::default()
        };

        for file in files {
            let name = file.filename.clone();
            match self.ingest_file(file).await {
                Ok(document_id) => {
                    summary.files_accepted += 1;
                    summary.document_ids.push(document_id);
                }
                Err(reason) => {
                    tracing::info!(filename = %name, %reason, "File rejected");
                    self.metrics.record_rejected();
                    summary.files_rejected.push(format!("{name}: {reason}"));
                }
            }
        }

        for raw_url in urls {
            let url = raw_url.url.clone();
            match self.ingest_url(raw_url).await {
                Ok(document_id) => {
                    summary.urls_accepted += 1;
                    summary.document_ids.push(document_id);
                }
                Err(reason) => {
                    tracing::info!(%url, %reason, "URL rejected");
                    self.metrics.record_rejected();
                    summary.urls_rejected.push(format!("{url}: {reason}"));
                }
            }
        }

        summary.message = Some(format!(
            "accepted {} of {} files and {} of {} URLs",
            summary.files_accepted,
            summary.files_processed,
            summary.urls_accepted,
            summary.urls_processed
        ));
        summary
    }

    async fn ingest_file(&self, file: RawFile) -> Result<String, String> {
        let text = extract_text(&file.bytes, &file.filename)
            .map_err(|error| format!("text extraction failed ({error})"))?;

        // classification happens before the bytes ever reach storage
        if !self.safety.validate_text(&text).await {
            return Err("safety validation failed (content policy violation)".to_string());
        }

        let extension = file
            .filename
            .rsplit('.')
            .next()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "bin".to_string());
        let storage_key = format!("{}.{extension}", Uuid::new_v4());
        let storage_url = self
            .storage
            .put(file.bytes.clone(), &storage_key, &file.content_type)
            .await
            .map_err(|error| format!("storage write failed ({error})"))?;

        let document = Document::validated(
            storage_key.clone(),
            file.filename,
            file.content_type,
            file.bytes.len(),
            storage_key,
            storage_url,
            &text,
            SourceKind::Upload,
            file.category,
        );
        let document_id = document.id.clone();
        self.metadata
            .create(document)
            .await
            .map_err(|error| format!("metadata write failed ({error})"))?;
        tracing::info!(document_id = %document_id, "File validated");
        Ok(document_id)
    }

    async fn ingest_url(&self, raw: RawUrl) -> Result<String, String> {
        if !self.url_validator.validate(&raw.url).await {
            return Err(
                "URL validation failed (non-governmental domain or unreachable)".to_string(),
            );
        }

        let page = self
            .page_client
            .get(&raw.url)
            .send()
            .await
            .map_err(|error| format!("page fetch failed ({error})"))?;
        if !page.status().is_success() {
            return Err(format!("page fetch returned {}", page.status()));
        }
        let html = page
            .text()
            .await
            .map_err(|error| format!("page body unreadable ({error})"))?;

        let text = extract_html(&html);
        if text.chars().count() < MIN_SCRAPED_CHARS {
            return Err("insufficient content extracted".to_string());
        }

        let sample: String = text.chars().take(SCRAPED_SAFETY_CHARS).collect();
        if !self.safety.validate_text(&sample).await {
            return Err("safety validation failed (content policy violation)".to_string());
        }

        // scraped pages are stored as the extracted plain text
        let storage_key = format!("url_{}.txt", Uuid::new_v4());
        let bytes = text.clone().into_bytes();
        let byte_size = bytes.len();
        let storage_url = self
            .storage
            .put(bytes, &storage_key, "text/plain")
            .await
            .map_err(|error| format!("storage write failed ({error})"))?;

        let document = Document::validated(
            storage_key.clone(),
            raw.url.clone(),
            "text/html".to_string(),
            byte_size,
            storage_key,
            storage_url,
            &text,
            SourceKind::UrlScrape,
            raw.category,
        );
        let document_id = document.id.clone();
        self.metadata
            .create(document)
            .await
            .map_err(|error| format!("metadata write failed ({error})"))?;
        tracing::info!(document_id = %document_id, url = %raw.url, "URL validated");
        Ok(document_id)
    }
}
