//! Process-wide counters describing ingestion and indexing activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters accumulated over the lifetime of the process.
#[derive(Default)]
pub struct IngestMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    documents_failed: AtomicU64,
    items_rejected: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully indexed document and the chunks it produced.
    pub fn record_indexed(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document that failed during processing.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item rejected at ingestion.
    pub fn record_rejected(&self) {
        self.items_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            items_rejected: self.items_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_indexed: u64,
    /// Total chunk count across all indexed documents.
    pub chunks_indexed: u64,
    /// Documents that entered processing and failed.
    pub documents_failed: u64,
    /// Files and URLs rejected at ingestion.
    pub items_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_indexed_documents_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_indexed(4);
        metrics.record_indexed(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_indexed, 2);
        assert_eq!(snapshot.chunks_indexed, 6);
    }

    #[test]
    fn failures_and_rejections_count_separately() {
        let metrics = IngestMetrics::new();
        metrics.record_failed();
        metrics.record_rejected();
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_indexed, 0);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.items_rejected, 2);
    }
}
