//! CLI command implementations.
//!
//! Each `run_*` function backs one `nchunk` subcommand and prints to
//! stdout: a human-readable layout by default, pretty JSON with `--json`.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use narrative_chunker_core::models::{ChunkResult, TransformParams};
use narrative_chunker_core::traits::Embedder;

use crate::cache::TransformCache;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::LlmClient;
use crate::migrate;
use crate::pipeline;
use crate::sqlite_store::SqliteProvenanceStore;

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}

fn llm_client(config: &Config) -> Result<LlmClient> {
    if !config.llm.is_enabled() {
        bail!("LLM provider is disabled; set [llm].provider in the config");
    }
    LlmClient::new(&config.llm)
}

async fn open_store(config: &Config) -> Result<SqliteProvenanceStore> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Ok(SqliteProvenanceStore::new(pool))
}

pub async fn run_split(
    config: &Config,
    path: &Path,
    budget: Option<usize>,
    run_id: Option<String>,
    json: bool,
) -> Result<()> {
    let text = read_input(path)?;
    let budget = budget.unwrap_or(config.chunking.safe_token_budget);
    let run_id = run_id.unwrap_or_else(pipeline::new_run_id);
    let chunks = pipeline::split_with_budget(config, &run_id, &text, budget)?;

    if json {
        return print_json(&chunks);
    }

    println!("run {}: {} chunks (budget {} tokens)", run_id, chunks.len(), budget);
    for chunk in &chunks {
        println!(
            "  [{}] {}  tokens={} words={} span={}..{} type={}{}",
            chunk.index,
            chunk.id,
            chunk.estimated_tokens,
            chunk.word_count,
            chunk.source_span.start,
            chunk.source_span.end,
            chunk.chunk_type.as_str(),
            if chunk.oversized { " OVERSIZED" } else { "" }
        );
        println!("      {}", preview(&chunk.content, 72));
    }
    Ok(())
}

pub async fn run_transform(
    config: &Config,
    path: &Path,
    params: &TransformParams,
    json: bool,
) -> Result<()> {
    let text = read_input(path)?;
    let llm = llm_client(config)?;
    let cache = TransformCache::new(config.processing.cache_capacity);

    let report = pipeline::transform_text(config, &llm, &text, params, Some(&cache)).await?;

    if json {
        return print_json(&report);
    }

    let result = &report.result;
    println!("{}", result.final_text);
    println!();
    println!("--- Run {} ---", report.run_id);
    println!(
        "chunks: {}  transformed: {}  success_rate: {:.2}",
        result.chunk_count, result.successful_count, result.success_rate
    );
    match result.coherence_score {
        Some(score) => println!("coherence: {:.2} (heuristic)", score),
        None => println!("coherence: n/a"),
    }
    for failed in result.per_chunk_results.iter().filter(|r| !r.success) {
        println!(
            "failed: {} ({})",
            failed.chunk_id,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub async fn run_recombine(config: &Config, path: &Path, json: bool) -> Result<()> {
    let raw = read_input(path)?;
    let results: Vec<ChunkResult> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse chunk results from {}", path.display()))?;
    let result = pipeline::recombine_results(config, results)?;

    if json {
        return print_json(&result);
    }

    println!("{}", result.final_text);
    println!();
    println!(
        "chunks: {}  successful: {}  success_rate: {:.2}",
        result.chunk_count, result.successful_count, result.success_rate
    );
    if let Some(score) = result.coherence_score {
        println!("coherence: {:.2} (heuristic)", score);
    }
    if let Some(err) = &result.error {
        println!("error: {}", err);
    }
    Ok(())
}

pub async fn run_summarize(
    config: &Config,
    path: &Path,
    run_id: Option<String>,
    json: bool,
) -> Result<()> {
    let text = read_input(path)?;
    let llm = llm_client(config)?;
    let embedder = create_embedder(&config.embedding)?;
    let store = open_store(config).await?;

    let report = pipeline::summarize_text(
        config,
        &llm,
        embedder.as_ref().map(|e| e as &dyn Embedder),
        &store,
        &text,
        run_id.as_deref(),
    )
    .await?;
    store.pool().close().await;

    if json {
        return print_json(&report);
    }

    println!("run {}: {} chunks", report.run_id, report.chunk_count);
    for level in &report.levels {
        println!(
            "  level {}: {} summaries, {} failed groups, {} nodes",
            level.level, level.created, level.failed_groups, level.nodes
        );
    }
    println!("records written: {}", report.records_written);
    if config.embedding.is_enabled() {
        println!(
            "embedded: {}  embed failures: {}",
            report.embedded, report.embed_failures
        );
    }
    println!();
    for node in &report.top {
        println!("[{} L{}]", node.chunk_id, node.level);
        println!("{}", node.text);
        println!();
    }
    Ok(())
}

pub async fn run_lineage(config: &Config, chunk_id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let lineage = pipeline::lineage(&store, chunk_id).await?;
    store.pool().close().await;

    let lineage = match lineage {
        Some(l) => l,
        None => bail!("No node with chunk id: {}", chunk_id),
    };

    if json {
        return print_json(&lineage);
    }

    let record = &lineage.node.record;
    println!("--- Node ---");
    println!("id:           {}", record.chunk_id);
    println!("run:          {}", record.run_id);
    println!("level:        {}", record.level);
    println!("type:         {}", record.chunk_type.as_str());
    println!(
        "source_range: {}..{}",
        record.source_range.start, record.source_range.end
    );
    println!("tokens:       {}", record.token_count);
    if let Some(e) = &lineage.node.embedding {
        println!("embedding:    {} ({} dims)", e.model, e.vector.len());
    }
    println!();
    println!("{}", lineage.node.content);
    println!();

    println!("--- Ancestors ({}) ---", lineage.ancestors.len());
    for a in &lineage.ancestors {
        println!("  {} (level {})", a.chunk_id, a.level);
    }
    println!("--- Children ({}) ---", lineage.children.len());
    for c in &lineage.children {
        println!("  {} (level {})", c.chunk_id, c.level);
    }
    Ok(())
}
