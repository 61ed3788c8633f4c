//! The chunking engine.
//!
//! A [`Chunker`] runs one pass over a document: primary strategy split,
//! file-level metadata merge, size enforcement, then payload formatting with
//! deterministic chunk IDs. Strategy selection is a closed enum; unknown
//! configuration values degrade to the recursive splitter rather than
//! failing the file.

pub mod elements;
pub mod enforce;
pub mod identity;
pub mod mechanical;
pub mod semantic;

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::models::{ChunkRecord, Fragment, SourceMetadata};

pub use elements::ElementsMode;

/// The closed set of chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Character windows at exact offsets.
    Fixed,
    /// Greedy sentence accumulation with overlap stitching.
    Sentences,
    /// Split at `#`/`##`/`###` headings.
    MarkdownHeaders,
    /// Separator-hierarchy splitter; the universal fallback.
    Recursive,
    /// Embedding-similarity breakpoints.
    Semantic,
    /// Structural elements parsed from a materialized file.
    Elements(ElementsMode),
    /// Heuristic: markdown headings when present, sentences otherwise.
    Auto,
}

impl StrategyKind {
    /// Parse a configured strategy name. Total: unknown or empty names log a
    /// warning and select [`StrategyKind::Recursive`]. Longer aliases match
    /// names used by common document-loader ecosystems so existing configs
    /// keep working.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "fixed" => Self::Fixed,
            "sentences" | "by_sentences" => Self::Sentences,
            "markdown" | "by_markdown_headers" | "markdownHeaderTextSplitter" => {
                Self::MarkdownHeaders
            }
            "recursive" => Self::Recursive,
            "semantic" | "semanticChunker" => Self::Semantic,
            "elements" | "unstructuredMarkdownLoaderElements" => {
                Self::Elements(ElementsMode::Elements)
            }
            "elements-single" | "unstructuredMarkdownLoaderSingle" => {
                Self::Elements(ElementsMode::Single)
            }
            "auto" => Self::Auto,
            other => {
                tracing::warn!(strategy = other, "unknown chunking strategy, using recursive");
                Self::Recursive
            }
        }
    }

    /// Whether this strategy needs an embedding backend.
    pub fn needs_embedder(&self) -> bool {
        matches!(self, Self::Semantic)
    }
}

/// One configured chunking pass.
pub struct Chunker {
    strategy: StrategyKind,
    size: usize,
    overlap: usize,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Chunker {
    pub fn new(strategy: StrategyKind, size: usize, overlap: usize) -> Self {
        Self {
            strategy,
            size,
            overlap,
            embedder: None,
        }
    }

    /// Attach the embedding backend the semantic strategy uses. Only
    /// constructed when the resolved strategy actually needs it.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run the full pass over one document: split, merge metadata, enforce
    /// the size bound, format records with ordinal-based IDs.
    ///
    /// Whitespace-only input yields no records.
    pub async fn process(&self, text: &str, base: &SourceMetadata) -> Result<Vec<ChunkRecord>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fragments = self.split(text).await?;

        let base_attrs = base.to_attributes();
        let mut merged = fragments;
        for fragment in &mut merged {
            identity::merge_base_metadata(fragment, &base_attrs);
        }

        let bounded = enforce::enforce(merged, self.size, self.overlap);

        Ok(bounded
            .into_iter()
            .enumerate()
            .map(|(ordinal, fragment)| identity::format_record(fragment, ordinal))
            .collect())
    }

    async fn split(&self, text: &str) -> Result<Vec<Fragment>> {
        let strategy = match self.strategy {
            StrategyKind::Auto => {
                if mechanical::has_heading(text) {
                    StrategyKind::MarkdownHeaders
                } else {
                    StrategyKind::Sentences
                }
            }
            other => other,
        };

        Ok(match strategy {
            StrategyKind::Fixed => to_fragments(mechanical::split_fixed(
                text,
                self.size,
                self.overlap,
            )),
            StrategyKind::Sentences => {
                to_fragments(mechanical::split_sentences(text, self.size, self.overlap))
            }
            StrategyKind::MarkdownHeaders => {
                to_fragments(mechanical::split_markdown(text, self.overlap))
            }
            StrategyKind::Recursive => {
                to_fragments(mechanical::split_recursive(text, self.size, self.overlap))
            }
            StrategyKind::Semantic => match &self.embedder {
                Some(embedder) => semantic::split_semantic(text, embedder).await?,
                None => {
                    // The enforcer still bounds the single fragment.
                    tracing::warn!("semantic strategy without an embedder, passing text through");
                    vec![Fragment::new(text)]
                }
            },
            StrategyKind::Elements(mode) => elements::split_elements(text, mode)?,
            StrategyKind::Auto => unreachable!("auto resolved above"),
        })
    }
}

fn to_fragments(chunks: Vec<String>) -> Vec<Fragment> {
    chunks.into_iter().map(Fragment::new).collect()
}
