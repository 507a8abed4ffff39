//! End-to-end runs.
//!
//! ```text
//! transform_text: split ─▶ validate ─▶ annotate ─▶ process ─▶ recombine
//! summarize_text: split ─▶ store leaves ─▶ build hierarchy ─▶ store summaries ─▶ embed
//! ```
//!
//! Both entry points take their collaborators as trait objects so the CLI,
//! the HTTP server and tests can plug in real providers or fakes.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use narrative_chunker_core::chunk::ChunkSplitter;
use narrative_chunker_core::embedding::check_dims;
use narrative_chunker_core::models::{
    validate_sequence, Chunk, ChunkResult, ProvenanceRecord, RecombinedResult, TransformParams,
};
use narrative_chunker_core::overlap::annotate;
use narrative_chunker_core::provenance::{ProvenanceStore, StoredNode};
use narrative_chunker_core::recombine::ResultRecombiner;
use narrative_chunker_core::summarize::{HierarchicalSummarizer, HierarchyNode};
use narrative_chunker_core::traits::{Embedder, Summarizer, Transformer};

use crate::cache::TransformCache;
use crate::config::Config;
use crate::process::{ChunkProcessor, ProcessorSettings};

#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub run_id: String,
    pub chunks: Vec<Chunk>,
    pub result: RecombinedResult,
}

/// Per-level counts of a summarize run.
#[derive(Debug, Clone, Serialize)]
pub struct LevelStats {
    pub level: u32,
    pub created: usize,
    pub failed_groups: usize,
    pub nodes: usize,
}

/// A node of the final level, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TopNode {
    pub chunk_id: String,
    pub level: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub run_id: String,
    pub chunk_count: usize,
    pub levels: Vec<LevelStats>,
    pub top: Vec<TopNode>,
    pub records_written: usize,
    pub embedded: usize,
    pub embed_failures: usize,
}

/// A stored node with its lineage in both directions.
#[derive(Debug, Clone, Serialize)]
pub struct Lineage {
    pub node: StoredNode,
    pub ancestors: Vec<ProvenanceRecord>,
    pub children: Vec<ProvenanceRecord>,
}

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Split `text` with the configured estimator and budget, then check the
/// sequence invariants.
pub fn split_document(config: &Config, run_id: &str, text: &str) -> Result<Vec<Chunk>> {
    split_with_budget(config, run_id, text, config.chunking.safe_token_budget)
}

/// [`split_document`] with an explicit token budget.
pub fn split_with_budget(
    config: &Config,
    run_id: &str,
    text: &str,
    budget: usize,
) -> Result<Vec<Chunk>> {
    if budget == 0 {
        bail!("token budget must be > 0");
    }
    let splitter = ChunkSplitter::new(config.chunking.estimator(), budget);
    let chunks = splitter.split(run_id, text);
    validate_sequence(text, &chunks).context("chunk sequence failed validation")?;
    Ok(chunks)
}

pub async fn transform_text(
    config: &Config,
    transformer: &dyn Transformer,
    text: &str,
    params: &TransformParams,
    cache: Option<&TransformCache>,
) -> Result<TransformReport> {
    let run_id = new_run_id();
    let mut chunks = split_document(config, &run_id, text)?;
    annotate(&mut chunks, config.chunking.overlap_words);

    tracing::info!(run_id = %run_id, chunks = chunks.len(), "transforming");

    let processor = ChunkProcessor::new(
        transformer,
        ProcessorSettings::from_config(&config.processing),
    )
    .with_cache(cache);
    let results = processor.process_chunks(&chunks, params).await;
    let result = ResultRecombiner::new(config.recombine.policy()).recombine(results);

    if result.chunk_count > 0 && result.success_rate < 1.0 {
        tracing::warn!(
            run_id = %run_id,
            successful = result.successful_count,
            total = result.chunk_count,
            "transform run completed with failures"
        );
    }

    Ok(TransformReport {
        run_id,
        chunks,
        result,
    })
}

/// Recombine results produced elsewhere (e.g. loaded from JSON).
pub fn recombine_results(config: &Config, results: Vec<ChunkResult>) -> Result<RecombinedResult> {
    if let Some(bad) = results.iter().find(|r| !r.is_consistent()) {
        bail!(
            "chunk result {} is inconsistent: success={} but output/error do not match",
            bad.chunk_id,
            bad.success
        );
    }
    Ok(ResultRecombiner::new(config.recombine.policy()).recombine(results))
}

pub async fn summarize_text(
    config: &Config,
    summarizer: &dyn Summarizer,
    embedder: Option<&dyn Embedder>,
    store: &dyn ProvenanceStore,
    text: &str,
    run_id: Option<&str>,
) -> Result<SummaryReport> {
    let run_id = run_id.map(str::to_string).unwrap_or_else(new_run_id);
    let chunks = split_document(config, &run_id, text)?;

    let mut written: Vec<HierarchyNode> = Vec::new();
    for chunk in &chunks {
        let node = HierarchyNode::from_chunk(chunk);
        store
            .append(&node.record, &node.text)
            .await
            .with_context(|| format!("Failed to store chunk {}", node.record.chunk_id))?;
        written.push(node);
    }

    let settings = &config.summarize;
    let hierarchy = HierarchicalSummarizer::new(
        summarizer,
        config.chunking.estimator(),
        settings.max_group_tokens,
        &run_id,
    )
    .build_hierarchy(&chunks, settings.group_size, settings.max_levels)
    .await;

    for level in &hierarchy.levels {
        for node in level.created() {
            store
                .append(&node.record, &node.text)
                .await
                .with_context(|| format!("Failed to store summary {}", node.record.chunk_id))?;
            written.push(node.clone());
        }
    }

    let (embedded, embed_failures) = match embedder {
        Some(embedder) => embed_nodes(embedder, store, &written).await,
        None => (0, 0),
    };

    tracing::info!(
        run_id = %run_id,
        chunks = chunks.len(),
        levels = hierarchy.levels.len(),
        failed_groups = hierarchy.failed_groups(),
        "summarize run complete"
    );

    Ok(SummaryReport {
        chunk_count: chunks.len(),
        levels: hierarchy
            .levels
            .iter()
            .map(|l| LevelStats {
                level: l.level,
                created: l.created().count(),
                failed_groups: l.failed_groups,
                nodes: l.nodes.len(),
            })
            .collect(),
        top: hierarchy
            .top()
            .iter()
            .map(|n| TopNode {
                chunk_id: n.record.chunk_id.clone(),
                level: n.record.level,
                text: n.text.clone(),
            })
            .collect(),
        records_written: written.len(),
        embedded,
        embed_failures,
        run_id,
    })
}

/// Embed and attach vectors for `nodes`. Failures, including vectors whose
/// length differs from [`Embedder::dims`], are logged and counted.
async fn embed_nodes(
    embedder: &dyn Embedder,
    store: &dyn ProvenanceStore,
    nodes: &[HierarchyNode],
) -> (usize, usize) {
    if nodes.is_empty() {
        return (0, 0);
    }
    let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
    let vectors = match embedder.embed(&texts).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, nodes = nodes.len(), "embedding failed; nodes stored without vectors");
            return (0, nodes.len());
        }
    };

    let mut embedded = 0;
    let mut failures = 0;
    for (node, vector) in nodes.iter().zip(vectors.iter()) {
        if let Err(e) = check_dims(vector, embedder.dims()) {
            tracing::warn!(chunk_id = %node.record.chunk_id, error = %e, "skipping embedding");
            failures += 1;
            continue;
        }
        match store
            .attach_embedding(&node.record.chunk_id, embedder.model_name(), vector)
            .await
        {
            Ok(()) => embedded += 1,
            Err(e) => {
                tracing::warn!(chunk_id = %node.record.chunk_id, error = %e, "failed to store embedding");
                failures += 1;
            }
        }
    }
    failures += nodes.len().saturating_sub(vectors.len());
    (embedded, failures)
}

/// The node, its ancestors and its direct children. `None` for unknown ids.
pub async fn lineage(store: &dyn ProvenanceStore, chunk_id: &str) -> Result<Option<Lineage>> {
    let node = match store.get(chunk_id).await? {
        Some(n) => n,
        None => return Ok(None),
    };
    Ok(Some(Lineage {
        node,
        ancestors: store.ancestors(chunk_id).await?,
        children: store.children_of(chunk_id).await?,
    }))
}
