//! Append-only provenance storage.
//!
//! The [`ProvenanceStore`] trait persists [`ProvenanceRecord`]s together
//! with the text of the node they describe, keyed by chunk id. Records are
//! never updated or deleted; the only mutable attachment is the node's
//! embedding vector. Lineage is a first-class query: [`children_of`]
//! answers "what was built from this node" and [`ancestors`] walks back to
//! the original chunks.
//!
//! Appends are checked with [`check_append`] so every store enforces the
//! same DAG rules: ids are unique, level-0 records have no parents,
//! summaries have at least one parent, and every parent already exists at
//! a strictly lower level.
//!
//! [`children_of`]: ProvenanceStore::children_of
//! [`ancestors`]: ProvenanceStore::ancestors

pub mod memory;

use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChunkError;
use crate::models::ProvenanceRecord;

/// Embedding attached to a stored node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

/// A provenance record plus the text it describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNode {
    pub record: ProvenanceRecord,
    pub content: String,
    pub embedding: Option<StoredEmbedding>,
}

/// Abstract append-only lineage store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append`](ProvenanceStore::append) | Insert a new node (rejects duplicates and bad parents) |
/// | [`get`](ProvenanceStore::get) | Fetch a node by chunk id |
/// | [`children_of`](ProvenanceStore::children_of) | Records that list the id as a parent |
/// | [`attach_embedding`](ProvenanceStore::attach_embedding) | Store or replace a node's vector |
/// | [`ancestors`](ProvenanceStore::ancestors) | Breadth-first lineage walk |
#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    async fn append(&self, record: &ProvenanceRecord, content: &str) -> Result<()>;

    async fn get(&self, chunk_id: &str) -> Result<Option<StoredNode>>;

    /// Records whose `parent_chunk_ids` contain `parent_id`, in append order.
    async fn children_of(&self, parent_id: &str) -> Result<Vec<ProvenanceRecord>>;

    async fn attach_embedding(&self, chunk_id: &str, model: &str, vector: &[f32]) -> Result<()>;

    /// Every ancestor of `chunk_id`, nearest first, each listed once.
    async fn ancestors(&self, chunk_id: &str) -> Result<Vec<ProvenanceRecord>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> = match self.get(chunk_id).await? {
            Some(node) => node.record.parent_chunk_ids.into_iter().collect(),
            None => return Ok(out),
        };

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.get(&id).await? {
                queue.extend(node.record.parent_chunk_ids.iter().cloned());
                out.push(node.record);
            }
        }

        Ok(out)
    }
}

/// Validate a record against the DAG rules before appending.
///
/// `exists` reports whether an id is already stored; `level_of` returns a
/// stored record's level.
pub fn check_append(
    record: &ProvenanceRecord,
    exists: impl Fn(&str) -> bool,
    level_of: impl Fn(&str) -> Option<u32>,
) -> Result<(), ChunkError> {
    if exists(&record.chunk_id) {
        return Err(ChunkError::DuplicateId(record.chunk_id.clone()));
    }

    let leaf = record.is_leaf();
    if leaf != record.parent_chunk_ids.is_empty() {
        return Err(ChunkError::ParentShape {
            chunk_id: record.chunk_id.clone(),
            level: record.level,
            parents: record.parent_chunk_ids.len(),
        });
    }

    for parent_id in &record.parent_chunk_ids {
        match level_of(parent_id) {
            None => {
                return Err(ChunkError::UnknownParent {
                    chunk_id: record.chunk_id.clone(),
                    parent_id: parent_id.clone(),
                })
            }
            Some(parent_level) if parent_level >= record.level => {
                return Err(ChunkError::LevelOrder {
                    chunk_id: record.chunk_id.clone(),
                    level: record.level,
                    parent_id: parent_id.clone(),
                    parent_level,
                })
            }
            Some(_) => {}
        }
    }

    Ok(())
}
