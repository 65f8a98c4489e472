use std::sync::Arc;

use tokio::net::TcpListener;

use cividex::api::{self, AppState};
use cividex::chunking::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use cividex::embedding::{EmbeddingClient, HttpEmbeddingClient, LocalHashEmbedder};
use cividex::index::SearchIndexClient;
use cividex::metrics::IngestMetrics;
use cividex::pipeline::{IngestionService, PipelineProcessor};
use cividex::retrieval::RetrievalService;
use cividex::safety::{SafetyClient, UrlValidator};
use cividex::store::{MemoryMetadataStore, MemoryObjectStore};
use cividex::{config, logging};

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let metadata = Arc::new(MemoryMetadataStore::new());
    let storage = Arc::new(MemoryObjectStore::new());
    let metrics = Arc::new(IngestMetrics::new());

    let embedder: Arc<dyn EmbeddingClient> = match &config.embedding_url {
        Some(url) => Arc::new(
            HttpEmbeddingClient::new(
                url.clone(),
                config.embedding_model.clone(),
                config.embedding_api_key.clone(),
            )
            .expect("Failed to build embedding client"),
        ),
        None => {
            tracing::warn!("No embedding service configured; using local deterministic encoder");
            Arc::new(LocalHashEmbedder::new(config.embedding_dimension))
        }
    };

    let index = SearchIndexClient::from_config(config).expect("Invalid search index URL");
    if let Some(index) = &index
        && let Err(error) = index.ensure_index_schema().await
    {
        tracing::error!(error = %error, "Failed to ensure index schema at startup");
    }
    let retrieval_index =
        SearchIndexClient::from_config(config).expect("Invalid search index URL");

    let chunker = Chunker::new(
        config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
        config.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
    )
    .expect("Invalid chunker configuration");

    let safety = SafetyClient::new(
        config.content_safety_url.clone(),
        config.content_safety_key.clone(),
    )
    .expect("Failed to build safety client");

    let state = AppState {
        ingestion: Arc::new(IngestionService::new(
            safety,
            UrlValidator::new(),
            metadata.clone(),
            storage.clone(),
            metrics.clone(),
        )),
        processor: Arc::new(PipelineProcessor::new(
            metadata,
            storage,
            chunker,
            embedder.clone(),
            index,
            metrics.clone(),
        )),
        retrieval: Arc::new(RetrievalService::new(embedder, retrieval_index)),
        metrics,
    };
    let app = api::create_router(state);

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8100..=8199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8100-8199",
    ))
}
