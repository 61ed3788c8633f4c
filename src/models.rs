//! Core data types that flow through the ingestion pipeline.
//!
//! A [`SourceMetadata`] describes provenance for one loaded document, a
//! [`Fragment`] is an intermediate piece of text produced by a chunking
//! strategy, and a [`ChunkRecord`] is the final flat payload handed to the
//! embedding and storage stage.

use serde_json::{Map, Value};

/// Provenance metadata attached to a loaded document by a [`crate::loader::Loader`].
///
/// `source` is mandatory and globally unique per document (a `file://` or
/// `s3://` URI); every other field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    pub source: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub extension: Option<String>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    /// Set only when the loader can attribute the whole document to a single
    /// page. Normally absent; format-aware strategies may fill it per chunk.
    pub page_number: Option<i64>,
}

impl SourceMetadata {
    /// True for the sentinel value loaders return on failure.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Convert to an attribute map for merging into fragment attributes.
    ///
    /// Absent fields are omitted entirely (not inserted as nulls), matching
    /// the merge contract: only present base keys are considered.
    pub fn to_attributes(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source".to_string(), Value::String(self.source.clone()));
        if let Some(title) = &self.title {
            map.insert("title".to_string(), Value::String(title.clone()));
        }
        if let Some(url) = &self.url {
            map.insert("url".to_string(), Value::String(url.clone()));
        }
        if let Some(ext) = &self.extension {
            map.insert("extension".to_string(), Value::String(ext.clone()));
        }
        if let Some(domain) = &self.domain {
            map.insert("domain".to_string(), Value::String(domain.clone()));
        }
        map.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        if let Some(page) = self.page_number {
            map.insert("page_number".to_string(), Value::from(page));
        }
        map
    }
}

/// Intermediate text fragment produced by a chunking strategy.
///
/// Created by a strategy call, consumed by the size enforcer, discarded after
/// formatting. `attributes` carries strategy-discovered metadata such as a
/// detected heading category or page number.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub attributes: Map<String, Value>,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// Final output unit: the embedding input text plus the flat metadata payload
/// sent to the vector store.
///
/// The payload always contains `source`, `phrase` (== `text`) and
/// `phrase_metadata_id`; the remaining fixed-schema fields and any
/// strategy-specific extras are present only when they have values.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl ChunkRecord {
    /// The deterministic chunk identifier, if present in the payload.
    pub fn id(&self) -> Option<&str> {
        self.metadata
            .get("phrase_metadata_id")
            .and_then(Value::as_str)
    }
}
