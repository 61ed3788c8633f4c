//! Mechanical text splitters: fixed-window, sentence, markdown-header and
//! recursive, plus the overlap stitching shared by the sentence and markdown
//! strategies.
//!
//! All lengths here are in characters, not bytes, so multi-byte input never
//! splits inside a code point.

use regex::Regex;
use std::sync::LazyLock;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,3}\s").expect("heading regex"));

/// Separator hierarchy for recursive splitting: paragraph break, line break,
/// sentence period, space. The empty-string fallback is the fixed window.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

pub fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Whether the text contains a `#`, `##` or `###` heading line.
pub fn has_heading(text: &str) -> bool {
    HEADING.is_match(text)
}

/// The last `n` characters of `s` (all of `s` when shorter).
fn char_suffix(s: &str, n: usize) -> &str {
    let len = char_count(s);
    let skip = len.saturating_sub(n);
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// Slide a window of `size` characters across `text`, advancing by
/// `size - overlap` (or by `size` when `overlap >= size`, to avoid an
/// infinite loop). The last window may be shorter. Exact character offsets
/// are preserved; word boundaries are not respected.
pub fn split_fixed(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut step = size.saturating_sub(overlap);
    if step == 0 {
        step = size;
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Split `text` into sentences on sentence-ending punctuation followed by
/// whitespace. Punctuation stays with its sentence.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for mat in SENTENCE_END.find_iter(text) {
        let punct_len = mat.as_str().trim_end().len();
        let end = mat.start() + punct_len;
        let sentence = text[last..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = mat.end();
    }
    let rest = text[last..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Greedily accumulate sentences into chunks of at most `size` characters,
/// then stitch `overlap` characters of context between neighbours.
///
/// A single sentence longer than `size` is emitted as-is; the caller's size
/// enforcement cuts it down.
pub fn split_sentences(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let sentences = split_into_sentences(text);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        let sep = usize::from(!current.is_empty());
        if char_count(&current) + char_count(&sentence) + sep <= size {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = sentence;
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    stitch_overlap(chunks, overlap)
}

/// Split immediately before every line starting with `#`, `##` or `###`,
/// keeping the heading line with the block that follows it. Empty blocks are
/// dropped; overlap stitching is applied afterwards.
pub fn split_markdown(text: &str, overlap: usize) -> Vec<String> {
    let mut boundaries: Vec<usize> = HEADING.find_iter(text).map(|m| m.start()).collect();
    boundaries.push(text.len());

    let mut blocks = Vec::new();
    let mut start = 0;
    for &end in &boundaries {
        if end > start {
            let block = text[start..end].trim();
            if !block.is_empty() {
                blocks.push(block.to_string());
            }
        }
        start = end;
    }

    stitch_overlap(blocks, overlap)
}

/// Prefix fragment *i* (*i > 0*) with the last `min(overlap, len(prev))`
/// characters of the previous fragment, separated by a single space.
/// Fragment 0 is never modified. The suffix is taken from the fragment as
/// originally produced, not from its stitched form.
pub fn stitch_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }
    let mut stitched = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            stitched.push(chunk.clone());
        } else {
            let tail = char_suffix(&chunks[i - 1], overlap);
            stitched.push(format!("{} {}", tail, chunk));
        }
    }
    stitched
}

/// Recursive splitter: tries separators in priority order and splits at the
/// highest-priority one that yields fragments within `size`. Pieces that are
/// still oversized recurse with the remaining separators; when no separator
/// is left, the fixed window cuts with the configured overlap.
///
/// This is the designated universal fallback and the size enforcer's cutting
/// primitive.
pub fn split_recursive(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }
    recurse(text, size, overlap, &SEPARATORS)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn recurse(text: &str, size: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    if char_count(text) <= size {
        return vec![text.to_string()];
    }

    let Some(sep_index) = separators.iter().position(|sep| text.contains(sep)) else {
        return split_fixed(text, size, overlap);
    };
    let sep = separators[sep_index];
    let rest = &separators[sep_index + 1..];

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    for piece in split_keeping_separator(text, sep) {
        if char_count(&piece) > size {
            flush(&mut buffer, &mut chunks);
            chunks.extend(recurse(&piece, size, overlap, rest));
        } else if char_count(&buffer) + char_count(&piece) <= size {
            buffer.push_str(&piece);
        } else {
            flush(&mut buffer, &mut chunks);
            buffer = piece;
        }
    }
    flush(&mut buffer, &mut chunks);
    chunks
}

fn flush(buffer: &mut String, chunks: &mut Vec<String>) {
    if !buffer.trim().is_empty() {
        chunks.push(std::mem::take(buffer));
    } else {
        buffer.clear();
    }
}

/// Split on `sep`, keeping the separator attached to the preceding piece so
/// that sentence periods and paragraph breaks survive the round trip.
fn split_keeping_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut last = 0;
    let mut search_from = 0;
    while let Some(pos) = text[search_from..].find(sep) {
        let end = search_from + pos + sep.len();
        pieces.push(text[last..end].to_string());
        last = end;
        search_from = end;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_window_offsets() {
        let chunks = split_fixed("abcdefghij", 4, 1);
        // step = 3: abcd, defg(from 3)=defg, ghij(from 6), j(from 9)
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn fixed_window_overlap_ge_size_advances_by_size() {
        let chunks = split_fixed("abcdefgh", 3, 5);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn fixed_window_is_char_based() {
        let chunks = split_fixed("żółćab", 3, 0);
        assert_eq!(chunks, vec!["żół", "ćab"]);
    }

    #[test]
    fn sentences_detected_with_punctuation_kept() {
        let sents = split_into_sentences("One. Two! Three? Four");
        assert_eq!(sents, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn sentences_accumulate_up_to_size() {
        let chunks = split_sentences("One. Two. Three.", 10, 0);
        assert_eq!(chunks, vec!["One. Two.", "Three."]);
    }

    #[test]
    fn sentences_overlap_stitching_exact() {
        let chunks = split_sentences("One. Two. Three.", 10, 4);
        // fragment 1 = last 4 chars of "One. Two." + " " + "Three."
        assert_eq!(chunks, vec!["One. Two.", "Two. Three."]);
    }

    #[test]
    fn markdown_blocks_keep_heading_lines() {
        let text = "intro\n# A\nbody a\n## B\nbody b\n";
        let chunks = split_markdown(text, 0);
        assert_eq!(chunks, vec!["intro", "# A\nbody a", "## B\nbody b"]);
    }

    #[test]
    fn markdown_deep_headings_do_not_split() {
        let chunks = split_markdown("#### not a boundary\ntext", 0);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn markdown_overlap_prefixes_previous_tail() {
        let chunks = split_markdown("# A\naaaa\n# B\nbbbb", 3);
        assert_eq!(chunks[0], "# A\naaaa");
        assert_eq!(chunks[1], "aaa # B\nbbbb");
    }

    #[test]
    fn stitch_first_fragment_untouched() {
        let stitched = stitch_overlap(vec!["abcdef".into(), "xyz".into()], 2);
        assert_eq!(stitched, vec!["abcdef", "ef xyz"]);
    }

    #[test]
    fn stitch_overlap_capped_at_previous_length() {
        let stitched = stitch_overlap(vec!["ab".into(), "xyz".into()], 10);
        assert_eq!(stitched[1], "ab xyz");
    }

    #[test]
    fn recursive_prefers_paragraph_breaks() {
        let chunks = split_recursive("Para one.\n\nPara two.", 10, 2);
        assert_eq!(chunks, vec!["Para one.", "Para two."]);
        assert!(chunks.iter().all(|c| char_count(c) <= 10));
    }

    #[test]
    fn recursive_falls_through_to_lines_then_periods() {
        let text = "First sentence is long. Second one too.\nshort line";
        let chunks = split_recursive(text, 25, 0);
        assert!(chunks.iter().all(|c| char_count(c) <= 25), "{:?}", chunks);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn recursive_hard_splits_unbreakable_text() {
        let text = "x".repeat(25);
        let chunks = split_recursive(&text, 10, 0);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn recursive_merges_small_pieces() {
        let chunks = split_recursive("a.\n\nb.\n\nc.", 10, 0);
        // all three paragraphs fit into one 10-char chunk
        assert_eq!(chunks, vec!["a.\n\nb.\n\nc."]);
    }

    #[test]
    fn recursive_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon.\n\nZeta eta theta iota kappa.";
        assert_eq!(
            split_recursive(text, 20, 4),
            split_recursive(text, 20, 4)
        );
    }
}
