//! HTTP client wrapper for the vector search index.

use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::chunking::Chunk;
use crate::config::Config;
use crate::document::now_rfc3339;
use crate::index::types::{
    IndexError, QueryResponse, QueryResponseResult, RecordFailure, ScoredRecord, UpsertOutcome,
};

/// Number of points submitted per upsert request.
const UPSERT_BATCH_SIZE: usize = 64;

/// Lightweight HTTP client for index operations.
pub struct SearchIndexClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) index_name: String,
    pub(crate) api_key: Option<String>,
    pub(crate) dimension: usize,
}

impl SearchIndexClient {
    /// Construct a client from configuration, or `None` when no index URL is
    /// configured and the service should run in degraded mode.
    pub fn from_config(config: &Config) -> Result<Option<Self>, IndexError> {
        let Some(url) = &config.search_index_url else {
            tracing::warn!("No search index configured; indexing and search run degraded");
            return Ok(None);
        };
        Ok(Some(Self::new(
            url.clone(),
            config.search_index_name.clone(),
            config.search_api_key.clone(),
            config.embedding_dimension,
        )?))
    }

    /// Construct a client for the given index endpoint.
    pub fn new(
        base_url: String,
        index_name: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("cividex/0.1").build()?;
        let base_url = normalize_base_url(&base_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(url = %base_url, index = %index_name, dimension, "Initialized index client");
        Ok(Self {
            client,
            base_url,
            index_name,
            api_key,
            dimension,
        })
    }

    /// Create the index collection and payload indexes when missing.
    ///
    /// Creation is idempotent: an existing collection is left untouched and a
    /// CONFLICT on a payload index means it is already present.
    pub async fn ensure_index_schema(&self) -> Result<(), IndexError> {
        if !self.collection_exists().await? {
            tracing::info!(index = %self.index_name, dimension = self.dimension, "Creating index collection");
            let body = json!({
                "vectors": {
                    "size": self.dimension,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}", self.index_name))?
                .json(&body)
                .send()
                .await?;
            self.ensure_success(response).await?;
        }

        let fields: [(&str, &str); 6] = [
            ("document_id", "keyword"),
            ("chunk_id", "keyword"),
            ("filename", "keyword"),
            ("source", "keyword"),
            ("category", "keyword"),
            ("chunk_index", "integer"),
        ];
        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });
            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/index", self.index_name),
                )?
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Upload chunk vectors to the index in sub-batches.
    ///
    /// The chunk and vector slices are validated for matching length and
    /// vector dimension before any request is sent. A failed sub-batch is
    /// recorded per chunk and the remaining sub-batches still run.
    pub async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<UpsertOutcome, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::DimensionMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        for vector in vectors {
            if !vector.is_empty() && vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let mut outcome = UpsertOutcome::default();
        let indexed_at = now_rfc3339();
        let pairs: Vec<(&Chunk, &Vec<f32>)> = chunks
            .iter()
            .zip(vectors)
            .filter(|(chunk, vector)| {
                if vector.is_empty() {
                    outcome.failures.push(RecordFailure {
                        chunk_id: chunk.chunk_id.clone(),
                        error: "no embedding produced".into(),
                    });
                    false
                } else {
                    true
                }
            })
            .collect();

        for batch in pairs.chunks(UPSERT_BATCH_SIZE) {
            let points: Vec<Value> = batch
                .iter()
                .map(|(chunk, vector)| {
                    json!({
                        "id": Uuid::new_v4().to_string(),
                        "vector": vector,
                        "payload": {
                            "document_id": chunk.document_id,
                            "chunk_id": chunk.chunk_id,
                            "content": chunk.content,
                            "chunk_index": chunk.chunk_index,
                            "total_chunks": chunk.total_chunks,
                            "filename": chunk.metadata.filename,
                            "source": chunk.metadata.source,
                            "category": chunk.metadata.category,
                            "uri": chunk.metadata.uri,
                            "indexed_at": indexed_at,
                        }
                    })
                })
                .collect();

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/points", self.index_name),
                )?
                .query(&[("wait", true)])
                .json(&json!({ "points": points }))
                .send()
                .await?;

            if response.status().is_success() {
                outcome.succeeded += batch.len();
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::error!(%status, body = %body, "Upsert sub-batch rejected");
                for (chunk, _) in batch {
                    outcome.failures.push(RecordFailure {
                        chunk_id: chunk.chunk_id.clone(),
                        error: format!("index returned {status}"),
                    });
                }
            }
        }

        tracing::debug!(
            succeeded = outcome.succeeded,
            failed = outcome.failures.len(),
            "Upsert finished"
        );
        Ok(outcome)
    }

    /// Delete every vector belonging to a document. Unknown documents and a
    /// missing collection are both treated as a completed no-op.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<(), IndexError> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": "document_id", "match": { "value": document_id } }
                ]
            }
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.index_name),
            )?
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!(document_id, "Deleted document vectors");
                Ok(())
            }
            StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(IndexError::UnexpectedStatus { status, body })
            }
        }
    }

    /// Perform a similarity search, returning scored payloads.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.index_name),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(index = %self.index_name, error = %error, "Index search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredRecord {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.index_name))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(IndexError::UnexpectedStatus { status, body })
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, IndexError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("api-key", api_key);
        }
        Ok(request)
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), IndexError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Index request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|error| error.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkMetadata;
    use httpmock::{Method::GET, Method::POST, Method::PUT, MockServer};

    fn client_for(server: &MockServer, dimension: usize) -> SearchIndexClient {
        SearchIndexClient::new(server.base_url(), "civic".into(), None, dimension)
            .expect("index client")
    }

    fn chunk(id: &str, index: usize) -> Chunk {
        Chunk {
            chunk_id: format!("{id}_chunk_{index}"),
            document_id: id.to_string(),
            content: "city records".into(),
            chunk_index: index,
            total_chunks: 1,
            metadata: ChunkMetadata {
                filename: "records.txt".into(),
                source: "upload".into(),
                category: "general".into(),
                uri: "#".into(),
            },
        }
    }

    #[tokio::test]
    async fn existing_collection_is_not_recreated() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/civic");
                then.status(200).json_body(serde_json::json!({ "result": { "status": "green" } }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic");
                then.status(200);
            })
            .await;
        let payload_indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/index");
                then.status(200).json_body(serde_json::json!({ "status": "ok" }));
            })
            .await;

        let client = client_for(&server, 2);
        client.ensure_index_schema().await.unwrap();

        assert_eq!(exists.hits_async().await, 1);
        assert_eq!(create.hits_async().await, 0);
        assert_eq!(payload_indexes.hits_async().await, 6);
    }

    #[tokio::test]
    async fn conflicting_payload_indexes_are_tolerated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/civic");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic");
                then.status(200).json_body(serde_json::json!({ "result": true }));
            })
            .await;
        let payload_indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/index");
                then.status(409).body("already exists");
            })
            .await;

        let client = client_for(&server, 2);
        client.ensure_index_schema().await.unwrap();

        assert_eq!(create.hits_async().await, 1);
        assert_eq!(payload_indexes.hits_async().await, 6);
    }

    #[tokio::test]
    async fn upsert_carries_chunk_identity_in_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/civic/points")
                    .json_body_partial(
                        r#"{ "points": [ { "payload": { "chunk_id": "doc-1_chunk_0", "document_id": "doc-1" } } ] }"#,
                    );
                then.status(200).json_body(serde_json::json!({ "status": "ok" }));
            })
            .await;

        let client = client_for(&server, 2);
        let outcome = client
            .upsert_chunks(&[chunk("doc-1", 0)], &[vec![0.1, 0.2]])
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert!(outcome.is_complete());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn mismatched_lengths_fail_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/points");
                then.status(200);
            })
            .await;

        let client = client_for(&server, 2);
        let error = client
            .upsert_chunks(&[chunk("doc-1", 0), chunk("doc-1", 1)], &[vec![0.1, 0.2]])
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn wrong_vector_dimension_fails_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/points");
                then.status(200);
            })
            .await;

        let client = client_for(&server, 4);
        let error = client
            .upsert_chunks(&[chunk("doc-1", 0)], &[vec![0.1, 0.2]])
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn rejected_batch_records_per_chunk_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/civic/points");
                then.status(500).body("storage full");
            })
            .await;

        let client = client_for(&server, 2);
        let outcome = client
            .upsert_chunks(
                &[chunk("doc-1", 0), chunk("doc-1", 1)],
                &[vec![0.1, 0.2], vec![0.3, 0.4]],
            )
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].chunk_id, "doc-1_chunk_0");
    }

    #[tokio::test]
    async fn delete_for_unknown_collection_is_a_no_op() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/civic/points/delete");
                then.status(404).body("collection not found");
            })
            .await;

        let client = client_for(&server, 2);
        assert!(client.delete_by_document("ghost-doc").await.is_ok());
    }

    #[tokio::test]
    async fn search_maps_scored_payloads() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/civic/points/query");
                then.status(200).json_body(serde_json::json!({
                    "result": [
                        {
                            "id": "a1",
                            "score": 0.9,
                            "payload": { "chunk_id": "doc-1_chunk_0", "content": "budget" }
                        }
                    ]
                }));
            })
            .await;

        let client = client_for(&server, 2);
        let records = client.search(vec![0.1, 0.2], 5).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "a1");
        let payload = records[0].payload.as_ref().unwrap();
        assert_eq!(payload["content"], "budget");
    }
}
