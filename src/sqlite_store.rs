//! SQLite-backed [`ProvenanceStore`] implementation.
//!
//! Nodes live in `nodes`, DAG edges in `node_parents` (ordered by
//! `position`), and vectors in `node_embeddings`. Rows are inserted once and
//! never deleted; only the embedding row may be replaced.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use narrative_chunker_core::embedding::{blob_to_vec, vec_to_blob};
use narrative_chunker_core::models::{ChunkType, ProvenanceRecord, SourceSpan};
use narrative_chunker_core::provenance::{
    check_append, ProvenanceStore, StoredEmbedding, StoredNode,
};

/// SQLite implementation of the [`ProvenanceStore`] trait.
pub struct SqliteProvenanceStore {
    pool: SqlitePool,
}

impl SqliteProvenanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn parents_of(&self, chunk_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT parent_id FROM node_parents WHERE chunk_id = ? ORDER BY position",
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("parent_id")).collect())
    }

    async fn record_from_row(&self, row: &SqliteRow) -> Result<ProvenanceRecord> {
        let chunk_id: String = row.get("chunk_id");
        let chunk_type: String = row.get("chunk_type");
        let created_at: String = row.get("created_at");
        let parent_chunk_ids = self.parents_of(&chunk_id).await?;

        Ok(ProvenanceRecord {
            run_id: row.get("run_id"),
            level: row.get::<i64, _>("level") as u32,
            parent_chunk_ids,
            source_range: SourceSpan::new(
                row.get::<i64, _>("source_start") as usize,
                row.get::<i64, _>("source_end") as usize,
            ),
            token_count: row.get::<i64, _>("token_count") as usize,
            chunk_type: ChunkType::parse(&chunk_type)
                .ok_or_else(|| anyhow!("unknown chunk_type '{}' for {}", chunk_type, chunk_id))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("bad created_at for {}", chunk_id))?
                .with_timezone(&Utc),
            chunk_id,
        })
    }
}

#[async_trait]
impl ProvenanceStore for SqliteProvenanceStore {
    async fn append(&self, record: &ProvenanceRecord, content: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Levels of every id the checks need: the new id and its parents.
        let mut known: HashMap<String, u32> = HashMap::new();
        for id in std::iter::once(&record.chunk_id).chain(record.parent_chunk_ids.iter()) {
            let level: Option<i64> = sqlx::query_scalar("SELECT level FROM nodes WHERE chunk_id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(level) = level {
                known.insert(id.clone(), level as u32);
            }
        }
        check_append(
            record,
            |id| known.contains_key(id),
            |id| known.get(id).copied(),
        )?;

        sqlx::query(
            r#"
            INSERT INTO nodes (chunk_id, run_id, level, chunk_type, source_start,
                               source_end, token_count, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.chunk_id)
        .bind(&record.run_id)
        .bind(record.level as i64)
        .bind(record.chunk_type.as_str())
        .bind(record.source_range.start as i64)
        .bind(record.source_range.end as i64)
        .bind(record.token_count as i64)
        .bind(content)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, parent_id) in record.parent_chunk_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO node_parents (chunk_id, parent_id, position) VALUES (?, ?, ?)",
            )
            .bind(&record.chunk_id)
            .bind(parent_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<StoredNode>> {
        let row = sqlx::query(
            r#"
            SELECT n.chunk_id, n.run_id, n.level, n.chunk_type, n.source_start,
                   n.source_end, n.token_count, n.content, n.created_at,
                   e.model AS embedding_model, e.embedding
            FROM nodes n
            LEFT JOIN node_embeddings e ON e.chunk_id = n.chunk_id
            WHERE n.chunk_id = ?
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let record = self.record_from_row(&row).await?;
        let model: Option<String> = row.get("embedding_model");
        let blob: Option<Vec<u8>> = row.get("embedding");
        let embedding = match (model, blob) {
            (Some(model), Some(blob)) => Some(StoredEmbedding {
                model,
                vector: blob_to_vec(&blob),
            }),
            _ => None,
        };

        Ok(Some(StoredNode {
            record,
            content: row.get("content"),
            embedding,
        }))
    }

    async fn children_of(&self, parent_id: &str) -> Result<Vec<ProvenanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT n.chunk_id, n.run_id, n.level, n.chunk_type, n.source_start,
                   n.source_end, n.token_count, n.created_at
            FROM nodes n
            JOIN node_parents p ON p.chunk_id = n.chunk_id
            WHERE p.parent_id = ?
            ORDER BY n.rowid
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.record_from_row(row).await?);
        }
        Ok(out)
    }

    async fn attach_embedding(&self, chunk_id: &str, model: &str, vector: &[f32]) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM nodes WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            anyhow::bail!("unknown chunk id: {}", chunk_id);
        }

        sqlx::query(
            r#"
            INSERT INTO node_embeddings (chunk_id, model, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(chunk_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
