//! Metadata merging, deterministic chunk identity, and payload formatting.
//!
//! The merge copies file-level provenance into each fragment without
//! clobbering values the strategy already discovered. Identity is a pure
//! function of `(source, ordinal, text prefix)`, so re-running ingestion over
//! an unchanged document reproduces identical IDs and the downstream upsert
//! stays idempotent.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{ChunkRecord, Fragment};

/// Fixed payload schema; everything else in a fragment's attributes is an
/// "extra" flattened in before these, so the schema wins key collisions.
const SCHEMA_KEYS: [&str; 7] = [
    "source",
    "title",
    "url",
    "extension",
    "domain",
    "tags",
    "page_number",
];

/// Keys generated by the formatter or internal to upstream tooling, never
/// carried over as extras.
const INTERNAL_KEYS: [&str; 3] = ["phrase", "phrase_metadata_id", "loc"];

/// Number of leading characters of the fragment text that participate in the
/// identity hash.
const ID_SNIPPET_CHARS: usize = 50;

/// Merge file-level metadata into a fragment's attributes.
///
/// A base key is copied only when the fragment lacks it or carries a null.
/// `page_number` is special-cased: once a strategy has attached a non-null
/// page, file-level metadata never overwrites it. A `page` attribute from a
/// format-aware splitter is normalized to `page_number` first.
pub fn merge_base_metadata(fragment: &mut Fragment, base: &Map<String, Value>) {
    if let Some(page) = fragment.attributes.remove("page") {
        fragment
            .attributes
            .entry("page_number".to_string())
            .or_insert(page);
    }

    for (key, value) in base {
        if key == "page_number" {
            let already_paged = fragment
                .attributes
                .get("page_number")
                .is_some_and(|v| !v.is_null());
            if already_paged {
                continue;
            }
        }
        match fragment.attributes.get(key) {
            None => {
                fragment.attributes.insert(key.clone(), value.clone());
            }
            Some(existing) if existing.is_null() && !value.is_null() => {
                fragment.attributes.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }
}

/// Deterministic chunk identifier: SHA-256 hex of
/// `"{source}_{ordinal}_{first 50 chars of text}"`.
///
/// Order-sensitive by construction: changing chunk size, overlap or strategy
/// reshuffles ordinals and prefixes, producing a fresh ID set for the whole
/// document.
pub fn chunk_id(source: &str, ordinal: usize, text: &str) -> String {
    let snippet: String = text.chars().take(ID_SNIPPET_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"_");
    hasher.update(ordinal.to_string().as_bytes());
    hasher.update(b"_");
    hasher.update(snippet.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert a merged fragment into the flat [`ChunkRecord`] payload.
///
/// Extras are inserted first, then the fixed schema (nulls dropped), then
/// `phrase` and `phrase_metadata_id` — so fixed-schema values always take
/// precedence on collision.
pub fn format_record(fragment: Fragment, ordinal: usize) -> ChunkRecord {
    let source = fragment
        .attributes
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let id = chunk_id(&source, ordinal, &fragment.text);

    let mut payload = Map::new();
    for (key, value) in &fragment.attributes {
        if SCHEMA_KEYS.contains(&key.as_str()) || INTERNAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !value.is_null() {
            payload.insert(key.clone(), value.clone());
        }
    }

    payload.insert("source".to_string(), Value::String(source));
    for key in ["title", "url", "extension", "domain", "page_number"] {
        if let Some(value) = fragment.attributes.get(key) {
            if !value.is_null() {
                payload.insert(key.to_string(), value.clone());
            }
        }
    }
    let tags = fragment
        .attributes
        .get("tags")
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    payload.insert("tags".to_string(), tags);

    payload.insert("phrase".to_string(), Value::String(fragment.text.clone()));
    payload.insert("phrase_metadata_id".to_string(), Value::String(id));

    ChunkRecord {
        text: fragment.text,
        metadata: payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("source".into(), json!("file:///doc.pdf"));
        m.insert("title".into(), json!("doc.pdf"));
        m.insert("domain".into(), json!("local"));
        m.insert("page_number".into(), json!(1));
        m
    }

    #[test]
    fn merge_fills_missing_keys_only() {
        let mut frag = Fragment::new("text").with_attribute("title", json!("From strategy"));
        merge_base_metadata(&mut frag, &base());
        assert_eq!(frag.attributes.get("title"), Some(&json!("From strategy")));
        assert_eq!(frag.attributes.get("domain"), Some(&json!("local")));
    }

    #[test]
    fn merge_replaces_null_values() {
        let mut frag = Fragment::new("text").with_attribute("domain", Value::Null);
        merge_base_metadata(&mut frag, &base());
        assert_eq!(frag.attributes.get("domain"), Some(&json!("local")));
    }

    #[test]
    fn fragment_page_number_wins_over_base() {
        let mut frag = Fragment::new("text").with_attribute("page_number", json!(42));
        merge_base_metadata(&mut frag, &base());
        assert_eq!(frag.attributes.get("page_number"), Some(&json!(42)));
    }

    #[test]
    fn page_attribute_is_normalized() {
        let mut frag = Fragment::new("text").with_attribute("page", json!(9));
        merge_base_metadata(&mut frag, &base());
        assert_eq!(frag.attributes.get("page_number"), Some(&json!(9)));
        assert!(!frag.attributes.contains_key("page"));
    }

    #[test]
    fn chunk_id_deterministic_and_ordinal_sensitive() {
        let a = chunk_id("s3://b/k", 0, "hello world");
        let b = chunk_id("s3://b/k", 0, "hello world");
        let c = chunk_id("s3://b/k", 1, "hello world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn chunk_id_uses_only_text_prefix() {
        let long_a = format!("{}{}", "p".repeat(50), "tail one");
        let long_b = format!("{}{}", "p".repeat(50), "different tail");
        assert_eq!(chunk_id("src", 3, &long_a), chunk_id("src", 3, &long_b));
    }

    #[test]
    fn payload_schema_wins_over_extras() {
        let mut frag = Fragment::new("body")
            .with_attribute("category", json!("NarrativeText"))
            .with_attribute("source", json!("file:///doc.md"));
        merge_base_metadata(&mut frag, &Map::new());
        let record = format_record(frag, 0);
        assert_eq!(record.metadata.get("source"), Some(&json!("file:///doc.md")));
        assert_eq!(
            record.metadata.get("category"),
            Some(&json!("NarrativeText"))
        );
        assert_eq!(record.metadata.get("phrase"), Some(&json!("body")));
        assert!(record.id().is_some());
    }

    #[test]
    fn payload_drops_nulls_and_defaults_tags() {
        let mut frag = Fragment::new("body").with_attribute("url", Value::Null);
        merge_base_metadata(&mut frag, &Map::new());
        let record = format_record(frag, 0);
        assert!(!record.metadata.contains_key("url"));
        assert_eq!(record.metadata.get("tags"), Some(&json!([])));
        assert_eq!(record.metadata.get("source"), Some(&json!("unknown")));
    }
}
