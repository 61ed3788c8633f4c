//! Local filesystem loader.
//!
//! Walks a directory tree, keeps files whose extension is allowed, and loads
//! each one as UTF-8 text — through binary extraction for PDF/OOXML formats.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract;
use crate::loader::Loader;
use crate::models::SourceMetadata;

pub struct FilesystemLoader {
    root: PathBuf,
    allowed: Vec<String>,
}

impl FilesystemLoader {
    /// `allowed` holds lowercase extensions with leading dots
    /// (see [`crate::config::allowed_extensions`]).
    pub fn new(root: impl Into<PathBuf>, allowed: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed,
        }
    }

    fn extension_of(path: &Path) -> String {
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    fn metadata_for(&self, path: &Path) -> SourceMetadata {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let uri = format!("file://{}", path.display());
        SourceMetadata {
            source: uri.clone(),
            title: Some(title),
            url: Some(uri),
            extension: Some(Self::extension_of(path)),
            domain: Some("local".to_string()),
            tags: vec!["local".to_string(), "filesystem".to_string()],
            page_number: None,
        }
    }
}

#[async_trait]
impl Loader for FilesystemLoader {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            bail!("Data directory does not exist: {}", self.root.display());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = Self::extension_of(entry.path());
            if self.allowed.contains(&ext) {
                keys.push(entry.path().to_string_lossy().to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn load(&self, key: &str) -> (String, SourceMetadata) {
        let path = Path::new(key);
        let ext = Self::extension_of(path);

        let text = if extract::is_binary_extension(&ext) {
            match std::fs::read(path) {
                Ok(bytes) => match extract::extract_text(&bytes, &ext) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(key, error = %e, "extraction failed, skipping file");
                        return (String::new(), SourceMetadata::default());
                    }
                },
                Err(e) => {
                    tracing::warn!(key, error = %e, "read failed, skipping file");
                    return (String::new(), SourceMetadata::default());
                }
            }
        } else {
            match std::fs::read(path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!(key, error = %e, "read failed, skipping file");
                    return (String::new(), SourceMetadata::default());
                }
            }
        };

        (text, self.metadata_for(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn lists_only_allowed_extensions_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b.md", "beta");
        write_file(dir.path(), "a.txt", "alpha");
        write_file(dir.path(), "c.exe", "binary");

        let loader = FilesystemLoader::new(dir.path(), vec![".md".into(), ".txt".into()]);
        let keys = loader.list().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("a.txt"));
        assert!(keys[1].ends_with("b.md"));
    }

    #[tokio::test]
    async fn missing_root_is_a_fatal_listing_error() {
        let loader = FilesystemLoader::new("/nonexistent/docforge-test", vec![".md".into()]);
        assert!(loader.list().await.is_err());
    }

    #[tokio::test]
    async fn load_returns_text_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "doc.md", "# hello");

        let loader = FilesystemLoader::new(dir.path(), vec![".md".into()]);
        let key = loader.list().await.unwrap().remove(0);
        let (text, meta) = loader.load(&key).await;
        assert_eq!(text, "# hello");
        assert_eq!(meta.title.as_deref(), Some("doc.md"));
        assert_eq!(meta.extension.as_deref(), Some(".md"));
        assert!(meta.source.starts_with("file://"));
        assert_eq!(meta.domain.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn unreadable_key_yields_empty_sentinel() {
        let loader = FilesystemLoader::new("/tmp", vec![".md".into()]);
        let (text, meta) = loader.load("/tmp/does-not-exist-docforge.md").await;
        assert!(text.is_empty());
        assert!(meta.is_empty());
    }
}
