//! Structured-document strategy.
//!
//! Splits markdown-like content into structural elements (headings,
//! paragraphs, list items) or returns the whole document as one cleaned
//! fragment. The parser operates on files, so the text is materialized to a
//! temporary `.md` file first; [`tempfile::NamedTempFile`] removes it on
//! drop, on success and failure paths alike.

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;

use crate::models::Fragment;

/// Parsing mode for the structured strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementsMode {
    /// Whole document as a single cleaned fragment.
    Single,
    /// One fragment per structural element, tagged with its category.
    Elements,
}

/// Materialize `text` to a temp file, parse it back, and split it into
/// structural elements according to `mode`.
pub fn split_elements(text: &str, mode: ElementsMode) -> Result<Vec<Fragment>> {
    let mut file = tempfile::Builder::new()
        .prefix("docforge-")
        .suffix(".md")
        .tempfile()
        .context("Failed to create temp file for structured parsing")?;
    file.write_all(text.as_bytes())
        .context("Failed to write temp file for structured parsing")?;
    file.flush()?;

    let materialized = std::fs::read_to_string(file.path())
        .with_context(|| format!("Failed to read back temp file {}", file.path().display()))?;

    match mode {
        ElementsMode::Single => Ok(parse_single(&materialized)),
        ElementsMode::Elements => Ok(parse_elements(&materialized)),
    }
}

/// One fragment holding the whole document with markdown markers stripped
/// and blank runs collapsed.
fn parse_single(text: &str) -> Vec<Fragment> {
    let cleaned: Vec<String> = text
        .lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Vec::new();
    }
    vec![Fragment::new(cleaned.join("\n")).with_attribute("category", json!("Document"))]
}

/// Split into blocks on blank lines; headings always form their own element.
fn parse_elements(text: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            emit_block(&mut fragments, &mut block);
        } else if heading_level(line).is_some() {
            emit_block(&mut fragments, &mut block);
            block.push(line);
            emit_block(&mut fragments, &mut block);
        } else {
            block.push(line);
        }
    }
    emit_block(&mut fragments, &mut block);
    fragments
}

fn emit_block(fragments: &mut Vec<Fragment>, block: &mut Vec<&str>) {
    if block.is_empty() {
        return;
    }
    let text = block.join("\n").trim().to_string();
    block.clear();
    if text.is_empty() {
        return;
    }

    let first = text.lines().next().unwrap_or_default();
    let fragment = if let Some(level) = heading_level(first) {
        Fragment::new(clean_line(first))
            .with_attribute("category", json!("Title"))
            .with_attribute("header_level", json!(level))
    } else if is_list_item(first) {
        Fragment::new(text).with_attribute("category", json!("ListItem"))
    } else {
        Fragment::new(text).with_attribute("category", json!("NarrativeText"))
    };
    fragments.push(fragment);
}

fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) && trimmed.chars().nth(hashes).is_some_and(char::is_whitespace) {
        Some(hashes as u8)
    } else {
        None
    }
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
    {
        return !rest.trim().is_empty();
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(". ")
}

/// Strip heading markers and list bullets, keeping the line's content.
fn clean_line(line: &str) -> String {
    let trimmed = line.trim();
    if heading_level(trimmed).is_some() {
        return trimmed.trim_start_matches('#').trim().to_string();
    }
    trimmed.to_string()
}
