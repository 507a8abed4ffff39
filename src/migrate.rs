use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the provenance tables. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One row per chunk or summary node
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            chunk_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            chunk_type TEXT NOT NULL,
            source_start INTEGER NOT NULL,
            source_end INTEGER NOT NULL,
            token_count INTEGER NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ordered parent edges of the provenance DAG
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS node_parents (
            chunk_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (chunk_id, position),
            FOREIGN KEY (chunk_id) REFERENCES nodes(chunk_id),
            FOREIGN KEY (parent_id) REFERENCES nodes(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS node_embeddings (
            chunk_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES nodes(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_node_parents_parent ON node_parents(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_run ON nodes(run_id, level)")
        .execute(pool)
        .await?;

    Ok(())
}
