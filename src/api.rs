//! HTTP surface for Cividex.
//!
//! A compact Axum router over the ingestion and retrieval services:
//!
//! - `POST /ingest` – Validate a batch of base64-encoded files and government
//!   URLs, persisting each accepted item as a validated document.
//! - `POST /documents/:id/process` – Chunk, embed, and index one document.
//! - `POST /documents/process-pending` – Process every document awaiting indexing.
//! - `DELETE /documents/:id` – Remove a document, its stored object, and its vectors.
//! - `POST /search` – Similarity search returning context documents and citations.
//! - `GET /metrics` – Ingestion counters for observability.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::pipeline::{
    BatchOutcome, IngestionService, IngestionSummary, PipelineError, PipelineProcessor, RawFile,
    RawUrl,
};
use crate::retrieval::{DEFAULT_TOP_K, RetrievalOutcome, RetrievalService};

/// Default batch ceiling for `POST /documents/process-pending`.
const DEFAULT_PENDING_LIMIT: usize = 50;

/// Shared service handles threaded through every request.
#[derive(Clone)]
pub struct AppState {
    /// Intake validation service.
    pub ingestion: Arc<IngestionService>,
    /// Chunk-embed-index processor.
    pub processor: Arc<PipelineProcessor>,
    /// Query-side retrieval service.
    pub retrieval: Arc<RetrievalService>,
    /// Process-wide counters.
    pub metrics: Arc<IngestMetrics>,
}

/// Build the HTTP router exposing the full API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/documents/:id/process", post(process_document))
        .route("/documents/process-pending", post(process_pending))
        .route("/documents/:id", delete(delete_document))
        .route("/search", post(search))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// One base64-encoded file in an ingestion request.
#[derive(Deserialize)]
struct IngestFilePayload {
    /// Declared filename, used for format dispatch.
    filename: String,
    /// Declared MIME type.
    #[serde(default = "default_content_type")]
    content_type: String,
    /// Base64-encoded raw bytes.
    content_base64: String,
    /// Optional topical category.
    #[serde(default)]
    category: Option<String>,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// One URL in an ingestion request.
#[derive(Deserialize)]
struct IngestUrlPayload {
    /// Absolute URL of the page to scrape.
    url: String,
    /// Optional topical category.
    #[serde(default)]
    category: Option<String>,
}

/// Request body for `POST /ingest`.
#[derive(Deserialize)]
struct IngestRequest {
    #[serde(default)]
    files: Vec<IngestFilePayload>,
    #[serde(default)]
    urls: Vec<IngestUrlPayload>,
}

/// Validate a batch of files and URLs.
///
/// Files whose base64 payload cannot be decoded are rejected per item without
/// aborting the batch, matching how downstream validation failures behave.
async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestionSummary> {
    let mut files = Vec::new();
    let mut decode_rejects = Vec::new();
    for payload in request.files {
        match BASE64.decode(payload.content_base64.as_bytes()) {
            Ok(bytes) => files.push(RawFile {
                filename: payload.filename,
                content_type: payload.content_type,
                bytes,
                category: payload.category,
            }),
            Err(error) => {
                tracing::info!(filename = %payload.filename, %error, "Undecodable file payload");
                state.metrics.record_rejected();
                decode_rejects.push(format!("{}: invalid base64 payload", payload.filename));
            }
        }
    }
    let urls = request
        .urls
        .into_iter()
        .map(|payload| RawUrl {
            url: payload.url,
            category: payload.category,
        })
        .collect();

    let mut summary = state.ingestion.ingest(files, urls).await;
    summary.files_processed += decode_rejects.len();
    summary.files_rejected.extend(decode_rejects);
    Json(summary)
}

/// Response body for `POST /documents/:id/process`.
#[derive(Serialize)]
struct ProcessResponse {
    document_id: String,
    indexed: bool,
}

/// Process one validated document.
async fn process_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessResponse>, AppError> {
    let indexed = state.processor.process_document(&id).await?;
    Ok(Json(ProcessResponse {
        document_id: id,
        indexed,
    }))
}

/// Request body for `POST /documents/process-pending`.
#[derive(Deserialize, Default)]
struct ProcessPendingRequest {
    #[serde(default)]
    limit: Option<usize>,
}

/// Process every document awaiting indexing, oldest first.
async fn process_pending(
    State(state): State<AppState>,
    request: Option<Json<ProcessPendingRequest>>,
) -> Result<Json<BatchOutcome>, AppError> {
    let limit = request
        .and_then(|Json(body)| body.limit)
        .unwrap_or(DEFAULT_PENDING_LIMIT);
    let outcome = state.processor.process_pending(limit).await?;
    Ok(Json(outcome))
}

/// Response body for `DELETE /documents/:id`.
#[derive(Serialize)]
struct DeleteResponse {
    document_id: String,
    deleted: bool,
}

/// Remove a document and everything derived from it.
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.processor.delete_document(&id).await?;
    Ok(Json(DeleteResponse {
        document_id: id,
        deleted,
    }))
}

/// Request body for `POST /search`.
#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Retrieve cited context for a query.
async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<RetrievalOutcome> {
    let top_k = request.top_k.unwrap_or(DEFAULT_TOP_K);
    Json(state.retrieval.search(&request.query, top_k).await)
}

/// Return the ingestion counters.
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunker;
    use crate::embedding::LocalHashEmbedder;
    use crate::safety::{SafetyClient, UrlValidator};
    use crate::store::{MemoryMetadataStore, MemoryObjectStore};
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use tower::ServiceExt;

    fn state_with(safety_server: &MockServer) -> AppState {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let metrics = Arc::new(IngestMetrics::new());
        let embedder = Arc::new(LocalHashEmbedder::new(8));

        let ingestion = IngestionService::new(
            SafetyClient::new(safety_server.base_url(), None).unwrap(),
            UrlValidator::new(),
            metadata.clone(),
            storage.clone(),
            metrics.clone(),
        );
        let processor = PipelineProcessor::new(
            metadata,
            storage,
            Chunker::new(800, 100).unwrap(),
            embedder.clone(),
            None,
            metrics.clone(),
        );
        let retrieval = RetrievalService::new(embedder, None);

        AppState {
            ingestion: Arc::new(ingestion),
            processor: Arc::new(processor),
            retrieval: Arc::new(retrieval),
            metrics,
        }
    }

    async fn json_response(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn ingest_accepts_base64_files() {
        let safety = MockServer::start_async().await;
        safety
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(200)
                    .json_body(json!({ "categoriesAnalysis": [] }));
            })
            .await;
        let app = create_router(state_with(&safety));

        let encoded = BASE64.encode(b"The city published its annual accountability report.");
        let (status, body) = json_response(
            app,
            Method::POST,
            "/ingest",
            Some(json!({
                "files": [
                    { "filename": "report.txt", "content_type": "text/plain", "content_base64": encoded }
                ]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files_processed"], 1);
        assert_eq!(body["files_accepted"], 1);
        assert_eq!(body["document_ids"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_file_is_rejected_per_item() {
        let safety = MockServer::start_async().await;
        let app = create_router(state_with(&safety));

        let (status, body) = json_response(
            app,
            Method::POST,
            "/ingest",
            Some(json!({
                "files": [
                    { "filename": "junk.txt", "content_base64": "!!! not base64 !!!" }
                ]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files_processed"], 1);
        assert_eq!(body["files_accepted"], 0);
        let rejected = body["files_rejected"].as_array().unwrap();
        assert!(rejected[0].as_str().unwrap().contains("invalid base64"));
    }

    #[tokio::test]
    async fn processing_an_unknown_document_reports_not_indexed() {
        let safety = MockServer::start_async().await;
        let app = create_router(state_with(&safety));

        let (status, body) = json_response(
            app,
            Method::POST,
            "/documents/ghost/process",
            Some(json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["document_id"], "ghost");
        assert_eq!(body["indexed"], false);
    }

    #[tokio::test]
    async fn search_degrades_to_placeholder_citations() {
        let safety = MockServer::start_async().await;
        let app = create_router(state_with(&safety));

        let (status, body) = json_response(
            app,
            Method::POST,
            "/search",
            Some(json!({ "query": "horarios de atención" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["degraded"], true);
        let documents = body["documents"].as_array().unwrap();
        let citations = body["citations"].as_array().unwrap();
        assert_eq!(documents.len(), citations.len());
        assert_eq!(citations[0]["id"], "1");
        assert_eq!(citations[0]["type"], "PDF");
    }

    #[tokio::test]
    async fn metrics_reports_rejections() {
        let safety = MockServer::start_async().await;
        let app = create_router(state_with(&safety));

        let (_, _) = json_response(
            app.clone(),
            Method::POST,
            "/ingest",
            Some(json!({
                "files": [ { "filename": "junk.txt", "content_base64": "???" } ]
            })),
        )
        .await;

        let (status, body) = json_response(app, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items_rejected"], 1);
        assert_eq!(body["documents_indexed"], 0);
    }

    #[tokio::test]
    async fn delete_for_unknown_document_reports_false() {
        let safety = MockServer::start_async().await;
        let app = create_router(state_with(&safety));

        let (status, body) =
            json_response(app, Method::DELETE, "/documents/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], false);
    }
}
