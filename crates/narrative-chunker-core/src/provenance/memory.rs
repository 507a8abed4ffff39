//! In-memory [`ProvenanceStore`] for tests and WASM targets.
//!
//! Nodes live in a `HashMap` behind a `std::sync::RwLock`; a separate
//! insertion-ordered list keeps `children_of` results in append order.
//! Nothing is evicted: the store lives exactly as long as its owner.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ProvenanceRecord;

use super::{check_append, ProvenanceStore, StoredEmbedding, StoredNode};

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, StoredNode>,
    order: Vec<String>,
}

/// In-memory provenance store.
#[derive(Default)]
pub struct InMemoryProvenanceStore {
    inner: RwLock<Inner>,
}

impl InMemoryProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in append order.
    pub fn records(&self) -> Result<Vec<ProvenanceRecord>> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard
            .order
            .iter()
            .filter_map(|id| guard.nodes.get(id))
            .map(|n| n.record.clone())
            .collect())
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("provenance store lock poisoned")
}

#[async_trait]
impl ProvenanceStore for InMemoryProvenanceStore {
    async fn append(&self, record: &ProvenanceRecord, content: &str) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        check_append(
            record,
            |id| guard.nodes.contains_key(id),
            |id| guard.nodes.get(id).map(|n| n.record.level),
        )?;
        guard.nodes.insert(
            record.chunk_id.clone(),
            StoredNode {
                record: record.clone(),
                content: content.to_string(),
                embedding: None,
            },
        );
        guard.order.push(record.chunk_id.clone());
        Ok(())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<StoredNode>> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard.nodes.get(chunk_id).cloned())
    }

    async fn children_of(&self, parent_id: &str) -> Result<Vec<ProvenanceRecord>> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard
            .order
            .iter()
            .filter_map(|id| guard.nodes.get(id))
            .filter(|n| n.record.parent_chunk_ids.iter().any(|p| p == parent_id))
            .map(|n| n.record.clone())
            .collect())
    }

    async fn attach_embedding(&self, chunk_id: &str, model: &str, vector: &[f32]) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        let node = guard
            .nodes
            .get_mut(chunk_id)
            .ok_or_else(|| anyhow!("unknown chunk id: {}", chunk_id))?;
        node.embedding = Some(StoredEmbedding {
            model: model.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }
}
