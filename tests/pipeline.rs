//! Integration tests for the end-to-end transform and summarize runs.
//!
//! Providers are replaced by in-process fakes so these tests exercise the
//! real splitter, processor, recombiner, hierarchy builder and both
//! provenance stores without any network access.

use anyhow::{bail, Result};
use async_trait::async_trait;
use narrative_chunker::cache::TransformCache;
use narrative_chunker::config::Config;
use narrative_chunker::db;
use narrative_chunker::migrate;
use narrative_chunker::pipeline::{lineage, recombine_results, summarize_text, transform_text};
use narrative_chunker::process::strip_context_prefix;
use narrative_chunker::sqlite_store::SqliteProvenanceStore;
use narrative_chunker_core::models::{ChunkType, TransformOutput, TransformParams};
use narrative_chunker_core::provenance::memory::InMemoryProvenanceStore;
use narrative_chunker_core::provenance::ProvenanceStore;
use narrative_chunker_core::recombine::FAILED_CHUNK_MARKER;
use narrative_chunker_core::traits::{Embedder, Summarizer, Transformer};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Upper-cases the chunk body; fails the chunk whose part marker matches.
struct ShoutTransformer {
    fail_part: Option<usize>,
    calls: AtomicUsize,
}

impl ShoutTransformer {
    fn new(fail_part: Option<usize>) -> Self {
        Self {
            fail_part,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transformer for ShoutTransformer {
    async fn transform(&self, input: &str, _params: &TransformParams) -> Result<TransformOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(part) = self.fail_part {
            if input.starts_with(&format!("[Part {} of", part)) {
                bail!("provider rejected part {}", part);
            }
        }
        Ok(TransformOutput::text(
            strip_context_prefix(input).to_uppercase(),
        ))
    }
}

/// Returns a short fixed-shape summary of each group.
struct CountingSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, combined_text: &str, _instruction: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "Summary {} of {} words.",
            n,
            combined_text.split_whitespace().count()
        ))
    }
}

fn summarizer() -> CountingSummarizer {
    CountingSummarizer {
        calls: AtomicUsize::new(0),
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed-3"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0, 0.0])
            .collect())
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

/// Declares four dimensions but returns three.
struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    fn model_name(&self) -> &str {
        "short"
    }

    fn dims(&self) -> usize {
        4
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.5]).collect())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Config whose budget puts every "Section N text." paragraph in its own
/// chunk (15 chars → 12 tokens; two sections → 24 tokens).
fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("data").join("nchunk.sqlite");
    config.chunking.safe_token_budget = 15;
    config.processing.max_parallel = 2;
    config.processing.batch_delay_ms = 0;
    config.summarize.group_size = 3;
    config.summarize.max_levels = 3;
    config
}

fn sections(n: usize) -> String {
    (0..n)
        .map(|i| format!("Section {} text.", i))
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn sqlite_store(config: &Config) -> SqliteProvenanceStore {
    let pool = db::connect(config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    SqliteProvenanceStore::new(pool)
}

// ─── Transform ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_transform_isolates_failed_chunk_and_keeps_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let transformer = ShoutTransformer::new(Some(3));

    let report = transform_text(
        &config,
        &transformer,
        &sections(5),
        &TransformParams::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.chunks.len(), 5);
    assert_eq!(transformer.calls.load(Ordering::SeqCst), 5);

    let result = &report.result;
    assert_eq!(result.chunk_count, 5);
    assert_eq!(result.successful_count, 4);
    assert!((result.success_rate - 0.8).abs() < 1e-9);

    let failed: Vec<_> = result
        .per_chunk_results
        .iter()
        .filter(|r| !r.success)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].index, 2);
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap()
        .contains("provider rejected part 3"));

    let text = &result.final_text;
    let positions: Vec<usize> = [
        "SECTION 0 TEXT.",
        "SECTION 1 TEXT.",
        FAILED_CHUNK_MARKER,
        "SECTION 3 TEXT.",
        "SECTION 4 TEXT.",
    ]
    .iter()
    .map(|needle| text.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(text.contains("Section 2 text."));
}

#[tokio::test]
async fn test_transform_reuses_cache_across_runs() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let transformer = ShoutTransformer::new(None);
    let cache = TransformCache::new(16);
    let params = TransformParams::new("narrator", "", "terse");

    let first = transform_text(&config, &transformer, &sections(3), &params, Some(&cache))
        .await
        .unwrap();
    assert_eq!(transformer.calls.load(Ordering::SeqCst), 3);

    let second = transform_text(&config, &transformer, &sections(3), &params, Some(&cache))
        .await
        .unwrap();
    assert_eq!(transformer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(first.result.final_text, second.result.final_text);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_transform_empty_text_reports_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let transformer = ShoutTransformer::new(None);

    let report = transform_text(&config, &transformer, "   \n\n ", &TransformParams::default(), None)
        .await
        .unwrap();

    assert!(report.chunks.is_empty());
    assert_eq!(report.result.chunk_count, 0);
    assert!(report.result.error.is_some());
    assert_eq!(transformer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recombine_results_rejects_inconsistent_input() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let transformer = ShoutTransformer::new(None);

    let report = transform_text(&config, &transformer, &sections(2), &TransformParams::default(), None)
        .await
        .unwrap();
    let mut results = report.result.per_chunk_results.clone();

    let again = recombine_results(&config, results.clone()).unwrap();
    assert_eq!(again.final_text, report.result.final_text);

    results[1].output = None;
    let err = recombine_results(&config, results).unwrap_err();
    assert!(err.to_string().contains("inconsistent"));
}

// ─── Summarize ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_summarize_in_memory_builds_two_levels() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = InMemoryProvenanceStore::new();

    let report = summarize_text(
        &config,
        &summarizer(),
        None,
        &store,
        &sections(6),
        Some("doc"),
    )
    .await
    .unwrap();

    assert_eq!(report.run_id, "doc");
    assert_eq!(report.chunk_count, 6);
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[0].created, 2);
    assert_eq!(report.levels[1].created, 1);
    assert_eq!(report.records_written, 9);
    assert_eq!(store.len(), 9);

    assert_eq!(report.top.len(), 1);
    assert_eq!(report.top[0].chunk_id, "doc:L2:0000");
    assert_eq!(report.top[0].level, 2);

    let top = store.get("doc:L2:0000").await.unwrap().unwrap();
    assert_eq!(
        top.record.parent_chunk_ids,
        vec!["doc:L1:0000".to_string(), "doc:L1:0001".to_string()]
    );
    let leaves = store.records().unwrap();
    let first = &leaves[0];
    let last = &leaves[5];
    assert_eq!(top.record.source_range.start, first.source_range.start);
    assert_eq!(top.record.source_range.end, last.source_range.end);
}

#[tokio::test]
async fn test_summarize_sqlite_lineage_and_embeddings() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = sqlite_store(&config).await;

    let report = summarize_text(
        &config,
        &summarizer(),
        Some(&FixedEmbedder as &dyn Embedder),
        &store,
        &sections(6),
        Some("doc"),
    )
    .await
    .unwrap();
    assert_eq!(report.records_written, 9);
    assert_eq!(report.embedded, 9);
    assert_eq!(report.embed_failures, 0);

    let leaf = lineage(&store, "doc:0004").await.unwrap().unwrap();
    assert_eq!(leaf.node.record.level, 0);
    assert_eq!(leaf.node.record.chunk_type, ChunkType::Adaptive);
    assert_eq!(leaf.node.content, "Section 4 text.");
    assert!(leaf.ancestors.is_empty());
    assert_eq!(leaf.children.len(), 1);
    assert_eq!(leaf.children[0].chunk_id, "doc:L1:0001");

    let embedding = leaf.node.embedding.expect("leaf should carry a vector");
    assert_eq!(embedding.model, "fixed-3");
    assert_eq!(embedding.vector, vec![15.0, 1.0, 0.0]);

    let top = lineage(&store, "doc:L2:0000").await.unwrap().unwrap();
    assert_eq!(top.ancestors.len(), 8);
    assert_eq!(top.ancestors[0].chunk_id, "doc:L1:0000");
    assert_eq!(top.ancestors[1].chunk_id, "doc:L1:0001");
    assert!(top.children.is_empty());

    assert!(lineage(&store, "doc:9999").await.unwrap().is_none());
}

#[tokio::test]
async fn test_summarize_rerun_with_same_run_id_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = sqlite_store(&config).await;

    summarize_text(&config, &summarizer(), None, &store, &sections(3), Some("doc"))
        .await
        .unwrap();
    let err = summarize_text(&config, &summarizer(), None, &store, &sections(3), Some("doc"))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("doc:0000"));
}

#[tokio::test]
async fn test_embedding_failure_is_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = InMemoryProvenanceStore::new();

    let report = summarize_text(
        &config,
        &summarizer(),
        Some(&BrokenEmbedder as &dyn Embedder),
        &store,
        &sections(4),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.embedded, 0);
    assert_eq!(report.embed_failures, report.records_written);
    assert_eq!(store.len(), report.records_written);
    let node = store
        .get(&report.top[0].chunk_id)
        .await
        .unwrap()
        .unwrap();
    assert!(node.embedding.is_none());
}

#[tokio::test]
async fn test_wrong_dimension_vectors_are_not_stored() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = InMemoryProvenanceStore::new();

    let report = summarize_text(
        &config,
        &summarizer(),
        Some(&ShortEmbedder as &dyn Embedder),
        &store,
        &sections(3),
        Some("doc"),
    )
    .await
    .unwrap();

    assert_eq!(report.records_written, 4);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.embed_failures, 4);
    let leaf = store.get("doc:0000").await.unwrap().unwrap();
    assert!(leaf.embedding.is_none());
}
