//! Vector store abstraction and the Qdrant REST implementation.
//!
//! [`VectorStore`] is the seam the pipeline and search layer talk to; tests
//! substitute an in-memory recorder. The Qdrant implementation speaks the
//! plain REST API over `reqwest`.
//!
//! Point IDs are derived from the deterministic chunk ID, so re-upserting an
//! unchanged document overwrites its points instead of duplicating them.
//! Points left behind by a strategy or size change are not deleted; refresh
//! the collection to reclaim them.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::StoreConfig;

/// One embedded chunk ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// One search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Number of points currently in the collection.
    async fn count(&self) -> Result<u64>;

    /// Upsert a batch of points.
    async fn insert_batch(&self, points: &[StoredPoint]) -> Result<()>;

    /// Nearest-neighbour search by vector.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

pub struct QdrantStore {
    config: StoreConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    /// Connect and make sure the collection exists, creating it with cosine
    /// distance when missing.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        let store = Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.config.url.trim_end_matches('/'),
            self.config.collection_name,
            suffix
        )
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        let resp = self
            .with_auth(self.client.get(self.collection_url("")))
            .send()
            .await
            .with_context(|| format!("Failed to reach Qdrant at {}", self.config.url))?;

        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("Qdrant collection check failed (HTTP {})", resp.status());
        }

        tracing::info!(
            collection = %self.config.collection_name,
            vector_size = self.config.vector_size,
            "creating collection"
        );
        let body = json!({
            "vectors": {
                "size": self.config.vector_size,
                "distance": "Cosine",
            }
        });
        let resp = self
            .with_auth(self.client.put(self.collection_url("")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Failed to create collection (HTTP {}): {}", status, text);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn count(&self) -> Result<u64> {
        let resp = self
            .with_auth(self.client.post(self.collection_url("/points/count")))
            .json(&json!({"exact": true}))
            .send()
            .await
            .context("Qdrant count request failed")?;
        if !resp.status().is_success() {
            bail!("Qdrant count failed (HTTP {})", resp.status());
        }
        let body: Value = resp.json().await?;
        body.pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant count response"))
    }

    async fn insert_batch(&self, points: &[StoredPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let payload_points: Vec<Value> = points
            .iter()
            .map(|point| {
                let mut payload = point.metadata.clone();
                payload
                    .entry("phrase".to_string())
                    .or_insert_with(|| Value::String(point.text.clone()));
                json!({
                    "id": point_uuid(&point.metadata).to_string(),
                    "vector": point.vector,
                    "payload": payload,
                })
            })
            .collect();

        let resp = self
            .with_auth(self.client.put(self.collection_url("/points?wait=true")))
            .json(&json!({"points": payload_points}))
            .send()
            .await
            .context("Qdrant upsert request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Qdrant upsert failed (HTTP {}): {}", status, text);
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let resp = self
            .with_auth(self.client.post(self.collection_url("/points/search")))
            .json(&body)
            .send()
            .await
            .context("Qdrant search request failed")?;
        if !resp.status().is_success() {
            bail!("Qdrant search failed (HTTP {})", resp.status());
        }

        let body: Value = resp.json().await?;
        let hits = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant search response"))?;

        Ok(hits
            .iter()
            .map(|hit| {
                let payload = hit
                    .get("payload")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let text = payload
                    .get("phrase")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let score = hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
                SearchHit {
                    text,
                    metadata: payload,
                    score,
                }
            })
            .collect())
    }
}

/// Derive a stable UUID point ID from the chunk's hex digest: the first 16
/// digest bytes, rendered as a UUID. Points without a usable ID get a random
/// one.
fn point_uuid(metadata: &Map<String, Value>) -> Uuid {
    metadata
        .get("phrase_metadata_id")
        .and_then(Value::as_str)
        .and_then(|id| hex::decode(id).ok())
        .and_then(|bytes| bytes.get(..16).map(|b| {
            let mut arr = [0u8; 16];
            arr.copy_from_slice(b);
            Uuid::from_bytes(arr)
        }))
        .unwrap_or_else(Uuid::new_v4)
}
