//! Brand Memory
//!
//! The `ContextStore` wraps the vector similarity store over historical
//! posts. It supports two retrieval modes: semantic nearest-neighbor search
//! for topic-matched context, and recency ordering for a representative,
//! unbiased sample (the wildcard case, where similarity against an empty
//! query is not meaningful).
//!
//! Records are immutable once ingested; the store is the sole owner of
//! `ContentRecord`s. Every query fails with `StoreNotReady` while the store
//! holds no records; fatal for the current request, not for the process.

use crate::llm::EmbeddingClient;
use chrono::{DateTime, TimeZone, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// An immutable historical post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub likes: i64,
    pub comments: i64,
    pub url: String,
}

/// Vector store over historical content
pub struct ContextStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingClient>,
}

impl ContextStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { pool, embedder }
    }

    /// Ingest a record with its precomputed embedding.
    ///
    /// Records are write-once: re-adding an existing id is rejected by the
    /// primary key, keeping history immutable.
    pub async fn add(
        &self,
        record: &ContentRecord,
        embedding: &[f32],
    ) -> Result<(), EngineError> {
        let hashtags = serde_json::to_string(&record.hashtags)
            .map_err(|e| EngineError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO posts (id, caption, hashtags, timestamp, likes, comments, url, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.caption)
        .bind(hashtags)
        .bind(record.timestamp.timestamp())
        .bind(record.likes)
        .bind(record.comments)
        .bind(&record.url)
        .bind(encode_embedding(embedding))
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(())
    }

    /// Number of ingested records
    pub async fn count(&self) -> Result<i64, EngineError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))
    }

    /// Nearest-neighbor retrieval by embedding similarity.
    ///
    /// Results are ordered by cosine similarity descending; ties break on
    /// record id ascending so identical inputs re-query identically.
    pub async fn semantic_query(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ContentRecord>, EngineError> {
        self.ensure_ready().await?;

        let query_embedding = self
            .embedder
            .embed(query_text)
            .await
            .map_err(|e| EngineError::GenerationFailed(e.to_string()))?;

        let rows = sqlx::query("SELECT * FROM posts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let mut scored: Vec<(f32, ContentRecord)> = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding = decode_embedding(row.get::<Vec<u8>, _>("embedding"));
            let score = cosine_similarity(&query_embedding, &embedding);
            scored.push((score, record_from_row(&row)?));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        debug!(
            "Semantic query returned {} of {} candidates",
            k.min(scored.len()),
            scored.len()
        );

        Ok(scored.into_iter().take(k).map(|(_, r)| r).collect())
    }

    /// The k most recent records, newest first.
    ///
    /// Ordering is strictly by timestamp, never similarity: this is the
    /// representative-sample path used when no topic bias is wanted.
    pub async fn recency_query(&self, k: usize) -> Result<Vec<ContentRecord>, EngineError> {
        self.ensure_ready().await?;

        let rows = sqlx::query("SELECT * FROM posts ORDER BY timestamp DESC, id ASC LIMIT ?")
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every record in the store, newest first
    pub async fn get_all(&self) -> Result<Vec<ContentRecord>, EngineError> {
        self.ensure_ready().await?;

        let rows = sqlx::query("SELECT * FROM posts ORDER BY timestamp DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.count().await? == 0 {
            return Err(EngineError::StoreNotReady);
        }
        Ok(())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ContentRecord, EngineError> {
    let hashtags: Vec<String> = serde_json::from_str(&row.get::<String, _>("hashtags"))
        .map_err(|e| EngineError::Database(e.to_string()))?;

    let timestamp = Utc
        .timestamp_opt(row.get::<i64, _>("timestamp"), 0)
        .single()
        .ok_or_else(|| EngineError::Database("Invalid timestamp in posts table".to_string()))?;

    Ok(ContentRecord {
        id: row.get("id"),
        caption: row.get("caption"),
        hashtags,
        timestamp,
        likes: row.get("likes"),
        comments: row.get("comments"),
        url: row.get("url"),
    })
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: Vec<u8>) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
