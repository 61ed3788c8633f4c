//! The ingestion run: skip check, per-source chunking and embedding, batched
//! writes to the vector store.
//!
//! State flow for one run: check the store count, either skip (collection
//! already populated and no `--force`) or ingest every listed key, then flush
//! whatever remains in the batch buffer. Per-source failures are logged and
//! skipped; only the store check and the source listing are fatal.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::chunker::{Chunker, StrategyKind};
use crate::config::{resolve_chunk_params, Settings};
use crate::embedding::Embedder;
use crate::loader::Loader;
use crate::store::{StoredPoint, VectorStore};

/// Accumulates points until the batch size is reached.
pub struct BatchBuffer {
    items: Vec<StoredPoint>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, point: StoredPoint) {
        self.items.push(point);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Drain the buffer, leaving it empty for the next batch.
    pub fn take(&mut self) -> Vec<StoredPoint> {
        std::mem::take(&mut self.items)
    }
}

/// Counters for one completed ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_loaded: usize,
    pub batches_flushed: usize,
    pub flush_failures: usize,
}

/// Outcome of one run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The collection already held points and `force_refresh` was off.
    Skipped { existing: u64 },
    Completed(IngestReport),
}

pub struct IngestionPipeline {
    pub loader: Box<dyn Loader>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Box<dyn VectorStore>,
    pub settings: Settings,
    /// The chunking module whose strategy table applies to this run.
    pub module: String,
    pub batch_size: usize,
    pub force_refresh: bool,
}

impl IngestionPipeline {
    pub async fn run(self) -> Result<RunOutcome> {
        let existing = self
            .store
            .count()
            .await
            .context("Failed to check vector store state")?;
        if existing > 0 && !self.force_refresh {
            tracing::info!(existing, "collection already populated, skipping ingestion");
            return Ok(RunOutcome::Skipped { existing });
        }

        let keys = self
            .loader
            .list()
            .await
            .with_context(|| format!("Failed to list {} source", self.loader.name()))?;
        tracing::info!(source = self.loader.name(), files = keys.len(), "ingesting");

        let mut report = IngestReport::default();
        let mut buffer = BatchBuffer::new(self.batch_size);

        for key in &keys {
            let (text, metadata) = self.loader.load(key).await;
            if text.trim().is_empty() || metadata.is_empty() {
                tracing::warn!(key, "no content, skipping");
                report.files_skipped += 1;
                continue;
            }

            match self
                .process_source(&text, &metadata, &mut buffer, &mut report)
                .await
            {
                Ok(chunks) => {
                    report.files_processed += 1;
                    report.chunks_loaded += chunks;
                    tracing::debug!(key, chunks, "processed");
                }
                Err(e) => {
                    tracing::error!(key, error = %e, "failed to process, skipping");
                    report.files_skipped += 1;
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, &mut report).await;
        }

        tracing::info!(
            files = report.files_processed,
            skipped = report.files_skipped,
            chunks = report.chunks_loaded,
            batches = report.batches_flushed,
            "ingestion finished"
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Chunk and embed one document, pushing points into the shared buffer.
    ///
    /// An embedding failure abandons the document's remaining fragments but
    /// leaves points already buffered for other documents intact.
    async fn process_source(
        &self,
        text: &str,
        metadata: &crate::models::SourceMetadata,
        buffer: &mut BatchBuffer,
        report: &mut IngestReport,
    ) -> Result<usize> {
        let extension = metadata.extension.as_deref().unwrap_or("");
        let params = resolve_chunk_params(&self.settings, &self.module, extension);
        let strategy = StrategyKind::parse(&params.strategy);

        let mut chunker = Chunker::new(strategy, params.size, params.overlap);
        if strategy.needs_embedder() {
            chunker = chunker.with_embedder(Arc::clone(&self.embedder));
        }

        let records = chunker.process(text, metadata).await?;
        let count = records.len();

        for record in records {
            let vector = self
                .embedder
                .embed(&record.text)
                .await
                .context("Embedding failed")?;
            buffer.push(StoredPoint {
                text: record.text,
                vector,
                metadata: record.metadata,
            });
            if buffer.is_full() {
                self.flush(buffer, report).await;
            }
        }
        Ok(count)
    }

    /// Write the buffered batch, returning how many points went out.
    /// Failures are logged and counted; the run continues and the failed
    /// points are dropped.
    async fn flush(&self, buffer: &mut BatchBuffer, report: &mut IngestReport) -> usize {
        let points = buffer.take();
        let size = points.len();
        match self.store.insert_batch(&points).await {
            Ok(()) => {
                report.batches_flushed += 1;
                tracing::debug!(size, "flushed batch");
                size
            }
            Err(e) => {
                report.flush_failures += 1;
                tracing::warn!(size, error = %e, "batch flush failed, points dropped");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn point(text: &str) -> StoredPoint {
        StoredPoint {
            text: text.to_string(),
            vector: vec![0.0; 4],
            metadata: Map::new(),
        }
    }

    #[test]
    fn buffer_fills_at_capacity() {
        let mut buffer = BatchBuffer::new(2);
        assert!(buffer.is_empty());
        buffer.push(point("a"));
        assert!(!buffer.is_full());
        buffer.push(point("b"));
        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn take_drains_and_resets() {
        let mut buffer = BatchBuffer::new(2);
        buffer.push(point("a"));
        let drained = buffer.take();
        assert_eq!(drained.len(), 1);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = BatchBuffer::new(0);
        buffer.push(point("a"));
        assert!(buffer.is_full());
    }
}
