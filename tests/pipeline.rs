//! End-to-end pipeline tests over in-memory fakes: a scripted loader, a
//! deterministic embedder, and a recording store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use docforge::config::Settings;
use docforge::embedding::Embedder;
use docforge::ingest::{IngestionPipeline, RunOutcome};
use docforge::loader::Loader;
use docforge::models::SourceMetadata;
use docforge::store::{SearchHit, StoredPoint, VectorStore};

/// Serves a fixed key → document map. Keys absent from the map behave like a
/// failed load: empty text, empty metadata.
struct ScriptedLoader {
    docs: BTreeMap<String, String>,
    failing: Vec<String>,
}

impl ScriptedLoader {
    fn new(docs: Vec<(&str, &str)>, failing: Vec<&str>) -> Self {
        Self {
            docs: docs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            failing: failing.into_iter().map(str::to_string).collect(),
        }
    }
}

#[async_trait]
impl Loader for ScriptedLoader {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.docs.keys().cloned().collect();
        keys.extend(self.failing.iter().cloned());
        keys.sort();
        Ok(keys)
    }

    async fn load(&self, key: &str) -> (String, SourceMetadata) {
        match self.docs.get(key) {
            Some(text) => {
                let ext = key
                    .rsplit_once('.')
                    .map(|(_, e)| format!(".{}", e))
                    .unwrap_or_default();
                (
                    text.clone(),
                    SourceMetadata {
                        source: format!("file://{}", key),
                        title: Some(key.to_string()),
                        url: Some(format!("file://{}", key)),
                        extension: Some(ext),
                        domain: Some("local".to_string()),
                        tags: vec!["test".to_string()],
                        page_number: None,
                    },
                )
            }
            None => (String::new(), SourceMetadata::default()),
        }
    }
}

/// Deterministic embeddings derived from the text bytes; no network.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % 8] += byte as f32 / 255.0;
                }
                vector
            })
            .collect())
    }
}

/// Records every upsert; reports a preloaded count before the first insert.
#[derive(Clone)]
struct RecordingStore {
    preloaded: u64,
    points: Arc<Mutex<Vec<StoredPoint>>>,
    insert_calls: Arc<Mutex<usize>>,
}

impl RecordingStore {
    fn new(preloaded: u64) -> Self {
        Self {
            preloaded,
            points: Arc::new(Mutex::new(Vec::new())),
            insert_calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.preloaded + self.points.lock().unwrap().len() as u64)
    }

    async fn insert_batch(&self, points: &[StoredPoint]) -> Result<()> {
        *self.insert_calls.lock().unwrap() += 1;
        self.points.lock().unwrap().extend_from_slice(points);
        Ok(())
    }

    async fn search(&self, _vector: &[f32], _limit: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

fn settings() -> Settings {
    Settings::from_value(
        r#"
[chunking]
default_size = 120
default_overlap = 20

[chunking.strategies.nolib.md]
strategy = "markdown"
size = 150
overlap = 0

[chunking.strategies.nolib.def]
strategy = "sentences"
"#
        .parse()
        .unwrap(),
    )
}

fn pipeline(
    loader: ScriptedLoader,
    store: RecordingStore,
    batch_size: usize,
    force: bool,
) -> IngestionPipeline {
    IngestionPipeline {
        loader: Box::new(loader),
        embedder: Arc::new(HashEmbedder),
        store: Box::new(store),
        settings: settings(),
        module: "nolib".to_string(),
        batch_size,
        force_refresh: force,
    }
}

const DOC_MD: &str = "# Intro\nSome introduction text here.\n# Detail\nA detailed section follows with more words.";
const DOC_TXT: &str = "First sentence of the note. Second sentence continues. Third one wraps it up.";

#[tokio::test]
async fn populated_store_skips_without_force() {
    let loader = ScriptedLoader::new(vec![("a.md", DOC_MD)], vec![]);
    let store = RecordingStore::new(3);
    let outcome = pipeline(loader, store.clone(), 10, false).run().await.unwrap();

    match outcome {
        RunOutcome::Skipped { existing } => assert_eq!(existing, 3),
        other => panic!("expected skip, got {:?}", other),
    }
    assert_eq!(*store.insert_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn force_refresh_ingests_over_populated_store() {
    let loader = ScriptedLoader::new(vec![("a.md", DOC_MD)], vec![]);
    let store = RecordingStore::new(3);
    let outcome = pipeline(loader, store.clone(), 10, true).run().await.unwrap();

    match outcome {
        RunOutcome::Completed(report) => {
            assert_eq!(report.files_processed, 1);
            assert!(report.chunks_loaded > 0);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(!store.points.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_source_is_skipped_not_fatal() {
    let loader = ScriptedLoader::new(
        vec![
            ("a.md", DOC_MD),
            ("b.txt", DOC_TXT),
            ("c.txt", "Another small document with a sentence."),
            ("d.txt", "Final document in the set, short and plain."),
        ],
        vec!["broken.pdf"],
    );
    let store = RecordingStore::new(0);
    let outcome = pipeline(loader, store.clone(), 10, false).run().await.unwrap();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(report.files_processed, 4);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.flush_failures, 0);

    let points = store.points.lock().unwrap();
    let sources: std::collections::BTreeSet<&str> = points
        .iter()
        .filter_map(|p| p.metadata.get("source").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(sources.len(), 4);
    assert!(!sources.contains("file://broken.pdf"));
}

#[tokio::test]
async fn batches_flush_at_capacity_and_at_end() {
    let loader = ScriptedLoader::new(vec![("a.md", DOC_MD), ("b.txt", DOC_TXT)], vec![]);
    let store = RecordingStore::new(0);
    let outcome = pipeline(loader, store.clone(), 1, false).run().await.unwrap();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completion, got {:?}", other),
    };
    // batch size 1: every chunk flushes as its own batch
    assert_eq!(report.batches_flushed, report.chunks_loaded);
    assert_eq!(
        *store.insert_calls.lock().unwrap(),
        report.batches_flushed
    );
}

#[tokio::test]
async fn stored_points_carry_payload_schema() {
    let loader = ScriptedLoader::new(vec![("b.txt", DOC_TXT)], vec![]);
    let store = RecordingStore::new(0);
    pipeline(loader, store.clone(), 10, false).run().await.unwrap();

    let points = store.points.lock().unwrap();
    assert!(!points.is_empty());
    for point in points.iter() {
        assert_eq!(point.vector.len(), 8);
        assert_eq!(
            point.metadata.get("phrase").and_then(|v| v.as_str()),
            Some(point.text.as_str())
        );
        let id = point
            .metadata
            .get("phrase_metadata_id")
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(id.len(), 64);
        assert_eq!(
            point.metadata.get("domain").and_then(|v| v.as_str()),
            Some("local")
        );
    }
}

#[tokio::test]
async fn reingesting_unchanged_corpus_reproduces_ids() {
    let docs = vec![("a.md", DOC_MD), ("b.txt", DOC_TXT)];

    let first_store = RecordingStore::new(0);
    pipeline(
        ScriptedLoader::new(docs.clone(), vec![]),
        first_store.clone(),
        10,
        false,
    )
    .run()
    .await
    .unwrap();

    let second_store = RecordingStore::new(0);
    pipeline(
        ScriptedLoader::new(docs, vec![]),
        second_store.clone(),
        10,
        false,
    )
    .run()
    .await
    .unwrap();

    let ids = |store: &RecordingStore| -> Vec<String> {
        store
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|p| {
                p.metadata
                    .get("phrase_metadata_id")
                    .and_then(|v| v.as_str())
                    .unwrap()
                    .to_string()
            })
            .collect()
    };
    assert_eq!(ids(&first_store), ids(&second_store));
}
