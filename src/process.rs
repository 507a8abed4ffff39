//! Bounded-concurrency chunk processing.
//!
//! Chunks are sent to the [`Transformer`] in sequential batches of at most
//! `max_parallel`. Every call in a batch runs concurrently on the current
//! task and the batch settles completely (success, error or timeout) before
//! the next one starts. Results are collected positionally, so the output
//! order always matches the input order.
//!
//! Each call's input is the chunk content prefixed with positional and
//! overlap context:
//!
//! ```text
//! [Part 2 of 5]
//!
//! [Previous context: ...]
//!
//! [Following context: ...]
//!
//! <chunk content>
//! ```

use std::time::Duration;

use futures::future::join_all;

use narrative_chunker_core::models::{Chunk, ChunkResult, TransformParams};
use narrative_chunker_core::traits::Transformer;

use crate::cache::TransformCache;
use crate::config::ProcessingConfig;

/// Concurrency and timing knobs for [`ChunkProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    pub max_parallel: usize,
    /// Pause between batches; not applied after the last one.
    pub batch_delay: Duration,
    /// Per-call limit. A call that exceeds it becomes a failed result.
    pub call_timeout: Duration,
}

impl ProcessorSettings {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

pub struct ChunkProcessor<'a> {
    transformer: &'a dyn Transformer,
    settings: ProcessorSettings,
    cache: Option<&'a TransformCache>,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(transformer: &'a dyn Transformer, settings: ProcessorSettings) -> Self {
        Self {
            transformer,
            settings,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a TransformCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Transform every chunk, returning one result per chunk in input order.
    pub async fn process_chunks(
        &self,
        chunks: &[Chunk],
        params: &TransformParams,
    ) -> Vec<ChunkResult> {
        if chunks.len() == 1 {
            return vec![self.process_one(&chunks[0], params).await];
        }

        let batch_size = self.settings.max_parallel.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);
        let mut results = Vec::with_capacity(chunks.len());

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            tracing::debug!(
                batch = batch_index + 1,
                of = batch_count,
                size = batch.len(),
                "processing batch"
            );
            let settled = join_all(batch.iter().map(|c| self.process_one(c, params))).await;
            results.extend(settled);

            if batch_index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        results
    }

    async fn process_one(&self, chunk: &Chunk, params: &TransformParams) -> ChunkResult {
        let input = compose_input(chunk);
        let call_params = params.for_chunk(chunk);

        let key = self.cache.map(|_| TransformCache::key(&input, params));
        if let (Some(cache), Some(key)) = (self.cache, key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!(chunk_id = %chunk.id, "transform cache hit");
                return ChunkResult::succeeded(chunk, hit);
            }
        }

        let call = self.transformer.transform(&input, &call_params);
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(Ok(output)) => {
                if let (Some(cache), Some(key)) = (self.cache, key) {
                    cache.insert(key, output.clone());
                }
                ChunkResult::succeeded(chunk, output)
            }
            Ok(Err(e)) => {
                tracing::warn!(chunk_id = %chunk.id, error = %e, "chunk transform failed");
                ChunkResult::failed(chunk, e.to_string())
            }
            Err(_) => {
                let message = format!("timed out after {:?}", self.settings.call_timeout);
                tracing::warn!(chunk_id = %chunk.id, "{}", message);
                ChunkResult::failed(chunk, message)
            }
        }
    }
}

/// Transformer input for `chunk`: part marker, overlap context, content.
pub fn compose_input(chunk: &Chunk) -> String {
    let mut parts = Vec::with_capacity(4);
    if chunk.total > 1 {
        parts.push(format!("[Part {} of {}]", chunk.index + 1, chunk.total));
    }
    if !chunk.context_before.is_empty() {
        parts.push(format!("[Previous context: {}]", chunk.context_before));
    }
    if !chunk.context_after.is_empty() {
        parts.push(format!("[Following context: {}]", chunk.context_after));
    }
    parts.push(chunk.content.clone());
    parts.join("\n\n")
}

/// Inverse of [`compose_input`]: drop the leading bracketed blocks.
pub fn strip_context_prefix(input: &str) -> &str {
    const PREFIXES: [&str; 3] = ["[Part ", "[Previous context: ", "[Following context: "];
    let mut rest = input;
    while PREFIXES.iter().any(|p| rest.starts_with(p)) {
        match rest.find("]\n\n") {
            Some(end) => rest = &rest[end + 3..],
            None => break,
        }
    }
    rest
}
