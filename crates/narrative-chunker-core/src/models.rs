//! Core data models that flow through the chunking pipeline.
//!
//! [`Chunk`]s are produced by the splitter and enriched by the overlap
//! annotator; [`ChunkResult`]s are produced per chunk by the processor and
//! merged into a [`RecombinedResult`]. [`ProvenanceRecord`]s are the nodes
//! of the summary lineage DAG.
//!
//! Records are plain structs with required fields separated from optional
//! ones. Invariants that span several records (index contiguity, span
//! monotonicity, provenance level ordering) are checked by
//! [`validate_sequence`] and [`ProvenanceRecord::summary`] rather than
//! trusted from callers.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChunkError;
use crate::token::{word_count, TokenEstimator};

/// Half-open byte interval `[start, end)` into the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both `self` and `other`.
    pub fn union(&self, other: &SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// How a chunk (or summary node) came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// The whole input fit the budget and was kept as one chunk.
    Original,
    /// Produced by the budget-driven split.
    Adaptive,
    /// Level 1 or 2 summary.
    Summary,
    /// Level 3+ summary.
    Distillation,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Original => "original",
            ChunkType::Adaptive => "adaptive",
            ChunkType::Summary => "summary",
            ChunkType::Distillation => "distillation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "original" => Some(ChunkType::Original),
            "adaptive" => Some(ChunkType::Adaptive),
            "summary" => Some(ChunkType::Summary),
            "distillation" => Some(ChunkType::Distillation),
            _ => None,
        }
    }

    /// Type assigned to a summary node produced at `level`.
    pub fn for_summary_level(level: u32) -> Self {
        if level >= 3 {
            ChunkType::Distillation
        } else {
            ChunkType::Summary
        }
    }
}

/// A contiguous span of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{parent_id}:{index:04}"`, unique within a run.
    pub id: String,
    /// Run identifier the chunk belongs to.
    pub parent_id: String,
    pub content: String,
    pub index: usize,
    /// Back-filled once splitting completes.
    pub total: usize,
    pub estimated_tokens: usize,
    pub word_count: usize,
    pub source_span: SourceSpan,
    /// Tail words of the previous chunk; empty for the first chunk.
    #[serde(default)]
    pub context_before: String,
    /// Head words of the next chunk; empty for the last chunk.
    #[serde(default)]
    pub context_after: String,
    pub chunk_type: ChunkType,
    /// Single sentence that alone exceeds the token budget.
    #[serde(default)]
    pub oversized: bool,
    /// SHA-256 of `content`.
    pub hash: String,
}

impl Chunk {
    pub fn new(
        parent_id: &str,
        index: usize,
        content: &str,
        source_span: SourceSpan,
        chunk_type: ChunkType,
        estimator: &TokenEstimator,
    ) -> Self {
        Self {
            id: chunk_id(parent_id, index),
            parent_id: parent_id.to_string(),
            content: content.to_string(),
            index,
            total: 0,
            estimated_tokens: estimator.estimate(content),
            word_count: word_count(content),
            source_span,
            context_before: String::new(),
            context_after: String::new(),
            chunk_type,
            oversized: false,
            hash: hash_text(content),
        }
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: self.id.clone(),
            index: self.index,
            total: self.total,
            estimated_tokens: self.estimated_tokens,
        }
    }
}

/// Identifier for the chunk at `index` within run `parent_id`.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{}:{:04}", parent_id, index)
}

/// Hex SHA-256 of a text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check the structural invariants of a chunk run against its source text.
///
/// - indices are exactly `0..len` in order, ids are unique
/// - every chunk's `total` equals the run length
/// - spans are non-inverted, non-overlapping, and increasing
/// - each chunk's `content` equals `text[span]`
pub fn validate_sequence(text: &str, chunks: &[Chunk]) -> Result<(), ChunkError> {
    let mut seen = HashSet::with_capacity(chunks.len());
    let mut previous_end = 0usize;

    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index != position {
            return Err(ChunkError::IndexGap {
                position,
                found: chunk.index,
            });
        }
        if chunk.total != chunks.len() {
            return Err(ChunkError::TotalMismatch {
                chunk_id: chunk.id.clone(),
                expected: chunks.len(),
                found: chunk.total,
            });
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(ChunkError::DuplicateId(chunk.id.clone()));
        }
        let span = chunk.source_span;
        if span.start > span.end || span.end > text.len() {
            return Err(ChunkError::InvertedSpan(chunk.id.clone()));
        }
        if position > 0 && span.start < previous_end {
            return Err(ChunkError::SpanOverlap {
                chunk_id: chunk.id.clone(),
                start: span.start,
                previous_end,
            });
        }
        if text.get(span.start..span.end) != Some(chunk.content.as_str()) {
            return Err(ChunkError::ContentMismatch(chunk.id.clone()));
        }
        previous_end = span.end;
    }

    Ok(())
}

/// Positional information handed to the transformer with each call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub index: usize,
    pub total: usize,
    pub estimated_tokens: usize,
}

/// Parameters for one transformation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformParams {
    pub persona: String,
    pub namespace: String,
    pub style: String,
    /// Set per call by the processor.
    #[serde(default)]
    pub chunk_metadata: Option<ChunkMetadata>,
}

impl TransformParams {
    pub fn new(persona: &str, namespace: &str, style: &str) -> Self {
        Self {
            persona: persona.to_string(),
            namespace: namespace.to_string(),
            style: style.to_string(),
            chunk_metadata: None,
        }
    }

    pub fn for_chunk(&self, chunk: &Chunk) -> Self {
        Self {
            chunk_metadata: Some(chunk.metadata()),
            ..self.clone()
        }
    }
}

/// What a transformer returns for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOutput {
    pub output_text: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TransformOutput {
    pub fn text(output_text: impl Into<String>) -> Self {
        Self {
            output_text: output_text.into(),
            metadata: None,
        }
    }
}

/// Outcome of processing one [`Chunk`].
///
/// Exactly one of `output` / `error` is set, matching `success`. Build
/// through [`ChunkResult::succeeded`] or [`ChunkResult::failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_id: String,
    pub index: usize,
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Always present; the recombiner falls back to it.
    pub original_content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ChunkResult {
    pub fn succeeded(chunk: &Chunk, output: TransformOutput) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            index: chunk.index,
            success: true,
            output: Some(output.output_text),
            error: None,
            original_content: chunk.content.clone(),
            metadata: output.metadata,
        }
    }

    pub fn failed(chunk: &Chunk, error: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            index: chunk.index,
            success: false,
            output: None,
            error: Some(error.into()),
            original_content: chunk.content.clone(),
            metadata: None,
        }
    }

    /// `true` when `output`/`error` agree with `success`.
    pub fn is_consistent(&self) -> bool {
        if self.success {
            self.output.is_some() && self.error.is_none()
        } else {
            self.output.is_none() && self.error.is_some()
        }
    }

    /// The transformed text, if this result is a consistent success.
    pub fn transformed(&self) -> Option<&str> {
        if self.success {
            self.output.as_deref()
        } else {
            None
        }
    }
}

/// Per-boundary classification counts behind a coherence score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReport {
    pub smooth: usize,
    pub adequate: usize,
    pub abrupt: usize,
}

impl TransitionReport {
    pub fn total(&self) -> usize {
        self.smooth + self.adequate + self.abrupt
    }
}

/// Merged output of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecombinedResult {
    pub final_text: String,
    pub chunk_count: usize,
    pub successful_count: usize,
    /// `successful_count / chunk_count`, in `[0, 1]`.
    pub success_rate: f64,
    /// Approximate readability signal; `None` on total failure.
    pub coherence_score: Option<f64>,
    #[serde(default)]
    pub transitions: Option<TransitionReport>,
    /// Set on total failure or empty input.
    #[serde(default)]
    pub error: Option<String>,
    /// Ordered by chunk index.
    pub per_chunk_results: Vec<ChunkResult>,
}

impl RecombinedResult {
    pub fn is_partial(&self) -> bool {
        self.chunk_count > 0 && self.successful_count < self.chunk_count
    }
}

/// A node in the summary lineage DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub chunk_id: String,
    pub run_id: String,
    /// 0 for original chunks, +1 per summarization pass.
    pub level: u32,
    /// Ids summarized to produce this node, in group order. Empty at level 0.
    pub parent_chunk_ids: Vec<String>,
    /// Union of the ancestors' source spans.
    pub source_range: SourceSpan,
    pub token_count: usize,
    pub chunk_type: ChunkType,
    pub created_at: DateTime<Utc>,
}

impl ProvenanceRecord {
    /// Leaf record for an original chunk.
    pub fn original(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            run_id: chunk.parent_id.clone(),
            level: 0,
            parent_chunk_ids: Vec::new(),
            source_range: chunk.source_span,
            token_count: chunk.estimated_tokens,
            chunk_type: chunk.chunk_type,
            created_at: Utc::now(),
        }
    }

    /// Record for a summary built from `parents` at `level`.
    ///
    /// Fails unless `level > 0`, at least one parent is given, and every
    /// parent sits at a strictly lower level.
    pub fn summary(
        chunk_id: &str,
        run_id: &str,
        level: u32,
        parents: &[&ProvenanceRecord],
        token_count: usize,
    ) -> Result<Self, ChunkError> {
        if level == 0 || parents.is_empty() {
            return Err(ChunkError::ParentShape {
                chunk_id: chunk_id.to_string(),
                level,
                parents: parents.len(),
            });
        }
        for parent in parents {
            if parent.level >= level {
                return Err(ChunkError::LevelOrder {
                    chunk_id: chunk_id.to_string(),
                    level,
                    parent_id: parent.chunk_id.clone(),
                    parent_level: parent.level,
                });
            }
        }
        let source_range = parents
            .iter()
            .skip(1)
            .fold(parents[0].source_range, |acc, p| acc.union(&p.source_range));

        Ok(Self {
            chunk_id: chunk_id.to_string(),
            run_id: run_id.to_string(),
            level,
            parent_chunk_ids: parents.iter().map(|p| p.chunk_id.clone()).collect(),
            source_range,
            token_count,
            chunk_type: ChunkType::for_summary_level(level),
            created_at: Utc::now(),
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}
