//! Layered TOML configuration.
//!
//! Settings are resolved from three layers, later layers overriding earlier
//! ones:
//!
//! 1. the config file passed on the command line (defaults),
//! 2. an optional profile overlay (`<dir>/<APP_PROFILE>.toml`),
//! 3. environment variables of the form `APP__SECTION__KEY`.
//!
//! The merged tree is exposed through dotted-path lookup
//! (`settings.get_str("vector_db.collection_name")`), plus typed views for
//! the embedding, store and chunking subsystems.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use toml::Value;

/// Global fallback chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 600;
/// Global fallback overlap in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Extensions ingested when `chunking.allowed_extensions` is not configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &[".txt", ".md", ".xml", ".json", ".pdf", ".docx", ".xlsx"];

/// Merged configuration tree with dotted-path access.
#[derive(Debug, Clone)]
pub struct Settings {
    data: Value,
}

impl Settings {
    /// Load the config file, apply the `APP_PROFILE` overlay (a sibling
    /// `<profile>.toml`, when it exists) and `APP__` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut data: Value = content
            .parse()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Ok(profile) = std::env::var("APP_PROFILE") {
            if profile != "default" && !profile.is_empty() {
                let overlay_path = path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(format!("{}.toml", profile));
                if overlay_path.exists() {
                    let overlay: Value = std::fs::read_to_string(&overlay_path)?
                        .parse()
                        .with_context(|| {
                            format!("Failed to parse profile overlay: {}", overlay_path.display())
                        })?;
                    merge_value(&mut data, overlay);
                } else {
                    tracing::warn!(profile, "profile overlay not found, using defaults only");
                }
            }
        }

        let mut settings = Self { data };
        settings.apply_env_overrides(std::env::vars());
        Ok(settings)
    }

    /// Wrap an already-built TOML tree. Used by tests and embedders of the
    /// library that construct configuration programmatically.
    pub fn from_value(data: Value) -> Self {
        Self { data }
    }

    /// Dotted-path lookup into the merged tree.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;
        for key in path.split('.') {
            current = current.as_table()?.get(key)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str, default: &str) -> String {
        self.get(path)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_usize(&self, path: &str, default: usize) -> usize {
        self.get(path)
            .and_then(Value::as_integer)
            .map(|v| v.max(0) as usize)
            .unwrap_or(default)
    }

    pub fn get_str_list(&self, path: &str) -> Option<Vec<String>> {
        let list = self.get(path)?.as_array()?;
        Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    /// Deserialize one section of the merged tree into a typed struct.
    /// A missing section yields the struct's defaults.
    pub fn section<T>(&self, name: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.get(name) {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("Invalid [{}] section", name)),
            None => Ok(T::default()),
        }
    }

    /// Apply `APP__SECTION__KEY=value` overrides. The double underscore is
    /// the path separator; keys are lowercased. Values that parse as
    /// integers, floats or booleans are inserted as such, so typed sections
    /// deserialize the same way whether a value came from the file or the
    /// environment.
    fn apply_env_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, val) in vars {
            let Some(rest) = key.strip_prefix("APP__") else {
                continue;
            };
            let segments: Vec<String> = rest.split("__").map(str::to_lowercase).collect();
            if segments.iter().any(String::is_empty) {
                continue;
            }
            let mut current = &mut self.data;
            for segment in &segments[..segments.len() - 1] {
                if !current.is_table() {
                    *current = Value::Table(toml::map::Map::new());
                }
                current = current
                    .as_table_mut()
                    .expect("just coerced to table")
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Table(toml::map::Map::new()));
            }
            if !current.is_table() {
                *current = Value::Table(toml::map::Map::new());
            }
            if let Some(table) = current.as_table_mut() {
                table.insert(segments[segments.len() - 1].clone(), coerce_scalar(val));
            }
        }
    }
}

/// Best-effort typing for environment override values.
fn coerce_scalar(val: String) -> Value {
    if let Ok(i) = val.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = val.parse::<f64>() {
        return Value::Float(f);
    }
    match val.as_str() {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        _ => Value::String(val),
    }
}

/// Recursive table merge; scalar and array values are replaced wholesale.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Resolved per-(module, extension) chunking parameters.
///
/// Resolution never fails: size and overlap fall back to the global defaults
/// and the strategy falls back to `recursive`, so a resolvable configuration
/// always yields all three.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
    pub strategy: String,
}

/// Resolve chunking parameters for one file.
///
/// Lookup order: `chunking.strategies.<module>.<ext>` →
/// `chunking.strategies.<module>.def` → global `chunking.default_size` /
/// `chunking.default_overlap` → compiled-in constants.
pub fn resolve_chunk_params(settings: &Settings, module: &str, extension: &str) -> ChunkParams {
    let mut clean_ext = extension.trim_start_matches('.').to_lowercase();
    if clean_ext.is_empty() {
        clean_ext = "def".to_string();
    }

    let base = format!("chunking.strategies.{}", module);
    let table = settings
        .get(&format!("{}.{}", base, clean_ext))
        .or_else(|| settings.get(&format!("{}.def", base)))
        .and_then(Value::as_table);

    if table.is_none() {
        tracing::warn!(module, extension, "no chunking config, using global defaults");
    }

    let global_size = settings.get_usize("chunking.default_size", DEFAULT_CHUNK_SIZE);
    let global_overlap = settings.get_usize("chunking.default_overlap", DEFAULT_CHUNK_OVERLAP);

    let size = table
        .and_then(|t| t.get("size"))
        .and_then(Value::as_integer)
        .map(|v| v.max(0) as usize)
        .unwrap_or(global_size);
    let overlap = table
        .and_then(|t| t.get("overlap"))
        .and_then(Value::as_integer)
        .map(|v| v.max(0) as usize)
        .unwrap_or(global_overlap);
    let strategy = table
        .and_then(|t| t.get("strategy"))
        .and_then(Value::as_str)
        .unwrap_or("recursive")
        .to_string();

    ChunkParams {
        size,
        overlap,
        strategy,
    }
}

/// Embedding endpoint configuration (`[embedding]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dims: usize,
    pub api_key_env: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: String::new(),
            dims: 768,
            api_key_env: "EMBEDDING_API_KEY".to_string(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let config: Self = settings.section("embedding")?;
        if config.model.is_empty() {
            anyhow::bail!("embedding.model must be configured");
        }
        if config.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        Ok(config)
    }
}

/// Qdrant connection configuration (`[vector_db]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key_env: String,
    pub collection_name: String,
    pub vector_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: "QDRANT_API_KEY".to_string(),
            collection_name: String::new(),
            vector_size: 768,
        }
    }
}

impl StoreConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let config: Self = settings.section("vector_db")?;
        if config.url.is_empty() {
            anyhow::bail!("vector_db.url must be configured");
        }
        if config.collection_name.is_empty() {
            anyhow::bail!("vector_db.collection_name must be configured");
        }
        Ok(config)
    }
}

/// The file extensions the loaders will ingest, with leading dots,
/// lowercased.
pub fn allowed_extensions(settings: &Settings) -> Vec<String> {
    settings
        .get_str_list("chunking.allowed_extensions")
        .unwrap_or_else(|| {
            DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
        .into_iter()
        .map(|ext| {
            let ext = ext.to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}
