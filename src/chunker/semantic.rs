//! Embedding-driven chunking.
//!
//! Sentences are embedded, neighbouring sentences are compared by cosine
//! distance, and the document is cut where the distance jumps above the 95th
//! percentile of all observed distances. Segments below a minimum character
//! count are merged forward so the store never fills with one-line chunks.

use anyhow::Result;
use std::sync::Arc;

use crate::chunker::mechanical::{char_count, split_into_sentences};
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Fragment;

/// Distance percentile above which a sentence boundary becomes a chunk
/// boundary.
const BREAKPOINT_PERCENTILE: f64 = 95.0;
/// Segments shorter than this many characters are merged into the following
/// segment.
const MIN_CHUNK_SIZE: usize = 200;

/// Split `text` at semantic breakpoints derived from sentence embeddings.
///
/// Embedding failures propagate; the caller decides whether to fall back to a
/// mechanical strategy.
pub async fn split_semantic(text: &str, embedder: &Arc<dyn Embedder>) -> Result<Vec<Fragment>> {
    let sentences = split_into_sentences(text);
    if sentences.len() < 2 {
        return Ok(sentences.into_iter().map(Fragment::new).collect());
    }

    let vectors = embedder.embed_batch(&sentences).await?;
    let distances: Vec<f32> = vectors
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
        .collect();
    let threshold = percentile(&distances, BREAKPOINT_PERCENTILE);

    let mut segments: Vec<Vec<String>> = Vec::new();
    let mut current = vec![sentences[0].clone()];
    for (i, sentence) in sentences.iter().enumerate().skip(1) {
        if distances[i - 1] > threshold {
            segments.push(std::mem::take(&mut current));
        }
        current.push(sentence.clone());
    }
    segments.push(current);

    Ok(merge_short_segments(segments)
        .into_iter()
        .map(|sents| Fragment::new(sents.join(" ")))
        .collect())
}

/// Nearest-rank percentile over an unsorted sample.
fn percentile(values: &[f32], pct: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Merge segments whose joined text is under [`MIN_CHUNK_SIZE`] characters
/// into the segment that follows them.
fn merge_short_segments(segments: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut merged: Vec<Vec<String>> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for mut segment in segments {
        if !pending.is_empty() {
            pending.append(&mut segment);
            segment = std::mem::take(&mut pending);
        }
        let len = char_count(&segment.join(" "));
        if len < MIN_CHUNK_SIZE {
            pending = segment;
        } else {
            merged.push(segment);
        }
    }
    if !pending.is_empty() {
        // trailing short segment folds into the last real chunk
        match merged.last_mut() {
            Some(last) => last.append(&mut pending),
            None => merged.push(pending),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let values = vec![0.1, 0.9, 0.2, 0.3];
        assert_eq!(percentile(&values, 95.0), 0.9);
        assert_eq!(percentile(&values, 50.0), 0.2);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn short_segments_merge_forward() {
        let long: Vec<String> = vec!["w".repeat(250)];
        let segments = vec![vec!["tiny".to_string()], long.clone(), vec!["tail".into()]];
        let merged = merge_short_segments(segments);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 3);
        assert_eq!(merged[0][0], "tiny");
    }

    #[test]
    fn all_short_segments_collapse_to_one() {
        let segments = vec![vec!["a".to_string()], vec!["b".to_string()]];
        let merged = merge_short_segments(segments);
        assert_eq!(merged, vec![vec!["a".to_string(), "b".to_string()]]);
    }
}
