//! Data ingestion boundary adapter
//!
//! Reads historical posts from a JSONL export, embeds each caption through
//! the embedding boundary, and loads the records into the brand memory.
//! This is process-boundary plumbing: the core never calls into it.

use crate::llm::EmbeddingClient;
use crate::store::{ContentRecord, ContextStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// One line of the JSONL export
#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    caption: String,
    #[serde(default)]
    hashtags: Vec<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, alias = "likesCount")]
    likes: i64,
    #[serde(default, alias = "commentsCount")]
    comments: i64,
    #[serde(default)]
    url: String,
}

/// Ingest a JSONL file into the store. Returns the number of records added.
///
/// Lines without a caption are skipped; a line that fails to parse or embed
/// is logged and skipped rather than aborting the run.
pub async fn ingest_file(
    store: &ContextStore,
    embedder: &dyn EmbeddingClient,
    path: &Path,
) -> Result<usize> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut added = 0usize;
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: RawPost = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping line {}: invalid JSON: {}", line_no + 1, e);
                continue;
            }
        };

        if raw.caption.is_empty() {
            continue;
        }

        let record = ContentRecord {
            id: raw
                .id
                .unwrap_or_else(|| format!("post_{}", line_no)),
            caption: raw.caption,
            hashtags: raw.hashtags,
            timestamp: parse_timestamp(raw.timestamp.as_deref()),
            likes: raw.likes,
            comments: raw.comments,
            url: raw.url,
        };

        let embedding = match embedder.embed(&record.caption).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Skipping '{}': embedding failed: {}", record.id, e);
                continue;
            }
        };

        match store.add(&record, &embedding).await {
            Ok(()) => {
                added += 1;
                if added % 10 == 0 {
                    info!("Ingested {} posts", added);
                }
            }
            Err(e) => warn!("Skipping '{}': {}", record.id, e),
        }
    }

    info!("Ingestion complete: {} records from {}", added, path.display());
    Ok(added)
}

/// Parse the export's timestamp, accepting RFC 3339 and the `+0000` offset
/// variant. Missing or invalid timestamps land at the epoch so the record
/// sorts last rather than being dropped.
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
