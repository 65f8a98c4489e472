//! Token-window chunking of extracted document text.

use thiserror::Error;
use tiktoken_rs::{CoreBPE, Rank, cl100k_base};

/// Default token window per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default token overlap between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Errors raised while configuring or running the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunk size must be at least one token.
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave forward progress between windows.
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured overlap in tokens.
        overlap: usize,
        /// Configured chunk size in tokens.
        chunk_size: usize,
    },
    /// Tokenizer construction failed.
    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(#[from] anyhow::Error),
}

/// Descriptive fields carried onto every chunk of a document.
#[derive(Debug, Clone, Default)]
pub struct ChunkMetadata {
    /// Display filename of the source document.
    pub filename: String,
    /// Provenance of the source document.
    pub source: String,
    /// Topical category assigned at ingestion.
    pub category: String,
    /// Canonical URI for citations.
    pub uri: String,
}

/// One indexable slice of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Stable identifier, `{document_id}_chunk_{index}`.
    pub chunk_id: String,
    /// Identifier of the parent document.
    pub document_id: String,
    /// Decoded text of this token window.
    pub content: String,
    /// Zero-based position within the document.
    pub chunk_index: usize,
    /// Number of chunks the document produced.
    pub total_chunks: usize,
    /// Descriptive fields shared by all sibling chunks.
    pub metadata: ChunkMetadata,
}

/// Splits text into fixed token windows with a configurable overlap.
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    encoding: CoreBPE,
}

impl Chunker {
    /// Build a chunker over the `cl100k_base` vocabulary.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap,
                chunk_size,
            });
        }
        let encoding = cl100k_base().map_err(ChunkingError::Tokenizer)?;
        Ok(Self {
            chunk_size,
            overlap,
            encoding,
        })
    }

    /// Number of tokens `text` encodes to.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoding.encode_ordinary(text).len()
    }

    /// Split `text` into overlapping token windows.
    ///
    /// Empty or whitespace-only text yields no chunks. Each window advances by
    /// `chunk_size - overlap` tokens; the loop terminates when a window reaches
    /// the final token, so the trailing chunk may be shorter than the window.
    /// A window edge inside a multi-byte character decodes to a replacement
    /// character rather than failing.
    pub fn chunk(&self, text: &str, document_id: &str, metadata: &ChunkMetadata) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let tokens = self.encoding.encode_ordinary(text);
        let total_tokens = tokens.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.chunk_size).min(total_tokens);
            let content = self.decode_window(&tokens[start..end]);
            chunks.push(Chunk {
                chunk_id: format!("{document_id}_chunk_{}", chunks.len()),
                document_id: document_id.to_string(),
                content,
                chunk_index: chunks.len(),
                total_chunks: 0,
                metadata: metadata.clone(),
            });
            if end == total_tokens {
                break;
            }
            start = end - self.overlap;
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        chunks
    }

    /// Split `text` into chunks along sentence boundaries.
    ///
    /// Sentences accumulate into a buffer bounded by `chunk_size` tokens. When
    /// the next sentence would overflow the buffer, the buffer closes as a
    /// chunk and the next buffer is seeded with that chunk's final sentence.
    /// A single sentence longer than the budget becomes its own chunk rather
    /// than being split mid-sentence.
    pub fn chunk_by_sentences(
        &self,
        text: &str,
        document_id: &str,
        metadata: &ChunkMetadata,
    ) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(text);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut buffer_tokens = 0usize;

        for sentence in sentences {
            let sentence_tokens = self.count_tokens(&sentence);
            if !buffer.is_empty() && buffer_tokens + sentence_tokens > self.chunk_size {
                let last = buffer.last().cloned();
                self.push_sentence_chunk(&mut chunks, &buffer, document_id, metadata);
                buffer.clear();
                buffer_tokens = 0;
                if let Some(last) = last {
                    buffer_tokens = self.count_tokens(&last);
                    buffer.push(last);
                }
            }
            buffer_tokens += sentence_tokens;
            buffer.push(sentence);
        }
        if !buffer.is_empty() {
            self.push_sentence_chunk(&mut chunks, &buffer, document_id, metadata);
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        chunks
    }

    fn decode_window(&self, tokens: &[Rank]) -> String {
        // a window boundary can land inside a multi-byte character, so the
        // strict decoder would reject otherwise valid text; decode the raw
        // token bytes and substitute replacement characters at torn edges
        let bytes: Vec<u8> = self
            .encoding
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn push_sentence_chunk(
        &self,
        chunks: &mut Vec<Chunk>,
        sentences: &[String],
        document_id: &str,
        metadata: &ChunkMetadata,
    ) {
        let content = sentences.join(" ").trim().to_string();
        if content.is_empty() {
            return;
        }
        chunks.push(Chunk {
            chunk_id: format!("{document_id}_chunk_{}", chunks.len()),
            document_id: document_id.to_string(),
            content,
            chunk_index: chunks.len(),
            total_chunks: 0,
            metadata: metadata.clone(),
        });
    }
}

/// Split text after sentence terminators (`.`, `!`, `?`), keeping the
/// terminator with its sentence. Consecutive terminators stay together.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            // swallow a run of terminators before cutting
            while matches!(chars.peek(), Some('.' | '!' | '?')) {
                current.push(chars.next().unwrap());
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
