//! Similarity search over indexed chunks with citation assembly.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::embedding::EmbeddingClient;
use crate::index::{ScoredRecord, SearchIndexClient};

/// Default number of chunks returned when the caller gives no limit.
pub const DEFAULT_TOP_K: usize = 5;

/// Title used when a hit's payload carries no filename.
const UNTITLED: &str = "Untitled Document";
/// URI used when a hit's payload carries no usable link.
const NO_URI: &str = "#";
/// Document type used when no extension can be derived.
const DEFAULT_DOC_TYPE: &str = "PDF";
/// Size shown for hits, which do not carry byte sizes.
const UNKNOWN_SIZE: &str = "N/A";

/// One retrieved chunk prepared for prompt assembly.
#[derive(Debug, Clone, Serialize)]
pub struct ContextDocument {
    /// Display title of the source document.
    pub title: String,
    /// Chunk text to feed into generation.
    pub content: String,
    /// Link shown alongside the citation.
    pub uri: String,
    /// Coarse document type label.
    pub doc_type: String,
    /// Human-readable size, when known.
    pub size: String,
}

/// A numbered citation describing one retrieved source.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    /// One-based ordinal, as a string, matching the order of the documents.
    pub id: String,
    /// Display title of the source document.
    pub title: String,
    /// Link shown to the reader.
    pub uri: String,
    /// Coarse document type label.
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Human-readable size, when known.
    pub size: String,
}

/// Search results plus the citations derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    /// Retrieved chunks, best match first.
    pub documents: Vec<ContextDocument>,
    /// Citations aligned with `documents`.
    pub citations: Vec<Citation>,
    /// True when results are placeholders rather than real index hits.
    pub degraded: bool,
}

/// Embeds queries and retrieves cited context from the search index.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingClient>,
    index: Option<SearchIndexClient>,
}

impl RetrievalService {
    /// Assemble the service. `index` is `None` in degraded mode.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, index: Option<SearchIndexClient>) -> Self {
        Self { embedder, index }
    }

    /// Retrieve the `top_k` best-matching chunks for a query.
    ///
    /// Retrieval never fails: an unconfigured index, an embedding failure, or
    /// an index error all degrade to fixed placeholder results so the caller
    /// can keep serving answers.
    pub async fn search(&self, query: &str, top_k: usize) -> RetrievalOutcome {
        let Some(index) = &self.index else {
            tracing::debug!("No search index configured; serving placeholder results");
            return degraded_outcome();
        };

        let vector = match self.embedder.embed(query).await {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => {
                tracing::debug!("Query embedded to nothing; serving placeholder results");
                return degraded_outcome();
            }
            Err(error) => {
                tracing::warn!(error = %error, "Query embedding failed; degrading");
                return degraded_outcome();
            }
        };

        let records = match index.search(vector, top_k).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(error = %error, "Index search failed; degrading");
                return degraded_outcome();
            }
        };

        let documents: Vec<ContextDocument> = records.iter().map(document_from_record).collect();
        let citations = citations_for(&documents);
        tracing::debug!(hits = documents.len(), "Retrieval complete");
        RetrievalOutcome {
            documents,
            citations,
            degraded: false,
        }
    }
}

fn document_from_record(record: &ScoredRecord) -> ContextDocument {
    let payload = record.payload.as_ref();
    let title = payload_str(payload, "filename").unwrap_or_else(|| UNTITLED.to_string());
    let uri = payload_str(payload, "uri")
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| NO_URI.to_string());
    let doc_type = doc_type_of(&title);
    ContextDocument {
        title,
        content: payload_str(payload, "content").unwrap_or_default(),
        uri,
        doc_type,
        size: UNKNOWN_SIZE.to_string(),
    }
}

fn citations_for(documents: &[ContextDocument]) -> Vec<Citation> {
    documents
        .iter()
        .enumerate()
        .map(|(position, document)| Citation {
            id: (position + 1).to_string(),
            title: document.title.clone(),
            uri: document.uri.clone(),
            doc_type: document.doc_type.clone(),
            size: document.size.clone(),
        })
        .collect()
}

fn payload_str(payload: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    payload
        .and_then(|map| map.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn doc_type_of(title: &str) -> String {
    match title.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.contains(' ') => {
            extension.to_uppercase()
        }
        _ => DEFAULT_DOC_TYPE.to_string(),
    }
}

fn degraded_outcome() -> RetrievalOutcome {
    let documents = vec![
        ContextDocument {
            title: "Guía de Trámites Municipales".to_string(),
            content: "Los trámites municipales pueden realizarse en línea a través del \
                      portal oficial o presencialmente en las oficinas de atención al \
                      ciudadano."
                .to_string(),
            uri: NO_URI.to_string(),
            doc_type: DEFAULT_DOC_TYPE.to_string(),
            size: UNKNOWN_SIZE.to_string(),
        },
        ContextDocument {
            title: "Preguntas Frecuentes".to_string(),
            content: "Consulte el directorio de dependencias para conocer los horarios \
                      de atención y los requisitos de cada trámite."
                .to_string(),
            uri: NO_URI.to_string(),
            doc_type: DEFAULT_DOC_TYPE.to_string(),
            size: UNKNOWN_SIZE.to_string(),
        },
    ];
    let citations = citations_for(&documents);
    RetrievalOutcome {
        documents,
        citations,
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashEmbedder;
    use serde_json::json;

    fn record(payload: Value) -> ScoredRecord {
        ScoredRecord {
            id: "p1".into(),
            score: 0.8,
            payload: payload.as_object().cloned(),
        }
    }

    #[tokio::test]
    async fn unconfigured_index_serves_placeholders() {
        let service = RetrievalService::new(Arc::new(LocalHashEmbedder::new(8)), None);
        let outcome = service.search("horario de atención", 5).await;

        assert!(outcome.degraded);
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.citations.len(), 2);
        assert_eq!(outcome.citations[0].id, "1");
        assert_eq!(outcome.citations[1].id, "2");
        assert_eq!(outcome.citations[0].uri, "#");
    }

    #[test]
    fn payload_fields_map_onto_citation_fields() {
        let document = document_from_record(&record(json!({
            "filename": "presupuesto_2026.xlsx",
            "content": "Asignaciones por secretaría",
            "uri": "https://archivo.gov.co/presupuesto_2026.xlsx"
        })));

        assert_eq!(document.title, "presupuesto_2026.xlsx");
        assert_eq!(document.doc_type, "XLSX");
        assert_eq!(document.uri, "https://archivo.gov.co/presupuesto_2026.xlsx");
        assert_eq!(document.size, "N/A");
    }

    #[test]
    fn missing_payload_fields_fall_back_to_sentinels() {
        let document = document_from_record(&record(json!({})));
        assert_eq!(document.title, "Untitled Document");
        assert_eq!(document.uri, "#");
        assert_eq!(document.doc_type, "PDF");
        assert!(document.content.is_empty());

        let citations = citations_for(&[document]);
        assert_eq!(citations[0].id, "1");
        assert_eq!(citations[0].title, "Untitled Document");
    }

    #[test]
    fn titles_without_extensions_use_the_default_type() {
        assert_eq!(doc_type_of("Informe Anual"), "PDF");
        assert_eq!(doc_type_of("acta.docx"), "DOCX");
        assert_eq!(doc_type_of(".hidden"), "PDF");
    }
}
