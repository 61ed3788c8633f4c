//! The size safety net.
//!
//! Whatever strategy produced a fragment sequence, [`enforce`] guarantees no
//! fragment exceeds the configured bound. Logical strategies (markdown,
//! semantic) preserve context but may emit a 5000-character section; this is
//! the single authority that makes the pipeline's maximum-length guarantee
//! strategy-independent.

use crate::chunker::mechanical::{char_count, split_recursive};
use crate::models::Fragment;

/// Re-split every fragment longer than `size` characters with the recursive
/// splitter; fragments within the bound pass through untouched. Sub-fragments
/// inherit the parent's attributes verbatim, so provenance discovered by the
/// primary strategy survives the cut.
///
/// `size == 0` disables enforcement (unbounded fragments allowed).
pub fn enforce(fragments: Vec<Fragment>, size: usize, overlap: usize) -> Vec<Fragment> {
    if size == 0 {
        return fragments;
    }

    let mut bounded = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if char_count(&fragment.text) <= size {
            bounded.push(fragment);
        } else {
            for sub in split_recursive(&fragment.text, size, overlap) {
                bounded.push(Fragment {
                    text: sub,
                    attributes: fragment.attributes.clone(),
                });
            }
        }
    }
    bounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn within_bound_passes_through_unchanged() {
        let frag = Fragment::new("short").with_attribute("category", json!("Title"));
        let out = enforce(vec![frag.clone()], 100, 10);
        assert_eq!(out, vec![frag]);
    }

    #[test]
    fn oversized_fragment_is_cut_to_bound() {
        let text = "word ".repeat(50); // 250 chars
        let out = enforce(vec![Fragment::new(text)], 40, 5);
        assert!(out.len() > 1);
        assert!(out.iter().all(|f| char_count(&f.text) <= 40));
    }

    #[test]
    fn sub_fragments_inherit_parent_attributes() {
        let frag = Fragment::new("x ".repeat(100)).with_attribute("page_number", json!(7));
        let out = enforce(vec![frag], 30, 0);
        assert!(out.len() > 1);
        for sub in &out {
            assert_eq!(sub.attributes.get("page_number"), Some(&json!(7)));
        }
    }

    #[test]
    fn zero_size_disables_enforcement() {
        let frag = Fragment::new("y".repeat(10_000));
        let out = enforce(vec![frag.clone()], 0, 0);
        assert_eq!(out, vec![frag]);
    }
}
