//! Invariant violations detected when validating chunk sequences and
//! provenance records.

use thiserror::Error;

/// Errors raised when a chunk run or provenance record breaks one of the
/// structural invariants the pipeline relies on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// Chunk at `position` carries index `found`.
    #[error("chunk index gap: position {position} has index {found}")]
    IndexGap { position: usize, found: usize },

    /// A chunk's `total` disagrees with the run length.
    #[error("chunk {chunk_id} has total {found}, run has {expected} chunks")]
    TotalMismatch {
        chunk_id: String,
        expected: usize,
        found: usize,
    },

    /// Spans must be strictly increasing and non-overlapping.
    #[error("chunk {chunk_id} span starts at {start}, before previous end {previous_end}")]
    SpanOverlap {
        chunk_id: String,
        start: usize,
        previous_end: usize,
    },

    #[error("chunk {0} has an inverted span")]
    InvertedSpan(String),

    /// `content` is not the text its span points at.
    #[error("chunk {0} content does not match its source span")]
    ContentMismatch(String),

    /// Two chunks in the same run share an id.
    #[error("duplicate chunk id: {0}")]
    DuplicateId(String),

    /// A provenance parent is unknown to the store.
    #[error("record {chunk_id} references unknown parent {parent_id}")]
    UnknownParent { chunk_id: String, parent_id: String },

    /// Provenance edges must point to strictly lower levels.
    #[error("record {chunk_id} at level {level} has parent {parent_id} at level {parent_level}")]
    LevelOrder {
        chunk_id: String,
        level: u32,
        parent_id: String,
        parent_level: u32,
    },

    /// Level-0 records are leaves; summaries need at least one parent.
    #[error("record {chunk_id} at level {level} has {parents} parents")]
    ParentShape {
        chunk_id: String,
        level: u32,
        parents: usize,
    },
}
