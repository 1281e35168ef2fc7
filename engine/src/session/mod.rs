//! Session Persistence
//!
//! Stores the ordered conversation/tool-call history per named session.
//! Appends are serialized per session id so turn order always matches
//! invocation order; distinct sessions are fully independent. History is
//! never truncated implicitly: crossing the token budget requires an
//! explicit caller decision (see `BudgetResolution`).

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub mod pointer;

/// Average characters per token (rough estimate: 1 token ≈ 4 characters)
const CHARS_PER_TOKEN: usize = 4;

/// Fixed overhead per stored turn, in tokens
const TURN_OVERHEAD_TOKENS: usize = 10;

/// Role of a stored turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "assistant" => TurnRole::Assistant,
            "tool" => TurnRole::Tool,
            _ => TurnRole::User,
        }
    }
}

/// One turn in a session: a role-tagged message or tool invocation record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionTurn {
    pub role: TurnRole,
    pub content: String,

    /// Name of the invoked action, for tool turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Structured payload of the invocation, serialized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_payload: Option<String>,
}

impl SessionTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_name: None,
            tool_payload: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_name: None,
            tool_payload: None,
        }
    }

    pub fn tool(
        tool_name: impl Into<String>,
        content: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            role: TurnRole::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_payload: payload,
        }
    }

    fn estimate_tokens(&self) -> usize {
        let chars = self.content.len()
            + self.tool_name.as_deref().map_or(0, str::len)
            + self.tool_payload.as_deref().map_or(0, str::len);
        chars.div_ceil(CHARS_PER_TOKEN) + TURN_OVERHEAD_TOKENS
    }
}

/// Summary row for session listings
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: i64,
    pub ended_at: Option<i64>,
    pub turn_count: i64,
}

/// How the caller resolves a crossed token budget.
///
/// Absent a resolution, the invocation fails with `BudgetExceeded`; history
/// is never silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetResolution {
    /// Continue with the full history despite the size
    Proceed,
    /// Irreversibly clear the history, then continue
    ClearAndProceed,
    /// Continue under a fresh session id
    NewSession(String),
}

/// Repository for session history
pub struct SessionStore {
    pool: SqlitePool,

    /// Per-session append locks; appends within one session are serialized,
    /// sessions never block each other
    append_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.append_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Append a turn to the session, creating the session on first use.
    pub async fn append(&self, session_id: &str, turn: SessionTurn) -> Result<(), EngineError> {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let now = unix_now()?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?, ?)")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let next_order: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(turn_order), 0) + 1 FROM session_turns WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO session_turns \
             (session_id, turn_order, role, content, tool_name, tool_payload, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(next_order)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&turn.tool_name)
        .bind(&turn.tool_payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(())
    }

    /// Read every turn of the session in append order.
    pub async fn read(&self, session_id: &str) -> Result<Vec<SessionTurn>, EngineError> {
        let rows = sqlx::query(
            "SELECT role, content, tool_name, tool_payload FROM session_turns \
             WHERE session_id = ? ORDER BY turn_order ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| SessionTurn {
                role: TurnRole::from_str(&r.get::<String, _>("role")),
                content: r.get("content"),
                tool_name: r.get("tool_name"),
                tool_payload: r.get("tool_payload"),
            })
            .collect())
    }

    /// Irreversibly truncate the session's history. The session id remains
    /// usable afterwards.
    pub async fn clear(&self, session_id: &str) -> Result<(), EngineError> {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        sqlx::query("DELETE FROM session_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(())
    }

    /// Mark the session ended. History is retained; only the active pointer
    /// should move elsewhere.
    pub async fn end(&self, session_id: &str) -> Result<(), EngineError> {
        let now = unix_now()?;

        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(())
    }

    /// Estimated token count of the session's stored history.
    pub async fn token_count(&self, session_id: &str) -> Result<usize, EngineError> {
        let turns = self.read(session_id).await?;
        Ok(turns.iter().map(SessionTurn::estimate_tokens).sum())
    }

    /// Summaries of all known sessions, newest first.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, EngineError> {
        let rows = sqlx::query(
            "SELECT s.id, s.created_at, s.ended_at, \
             (SELECT COUNT(*) FROM session_turns t WHERE t.session_id = s.id) AS turn_count \
             FROM sessions s ORDER BY s.created_at DESC, s.id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| SessionSummary {
                id: r.get("id"),
                created_at: r.get("created_at"),
                ended_at: r.get("ended_at"),
                turn_count: r.get("turn_count"),
            })
            .collect())
    }
}

/// Render turns into a plain transcript for analysis prompts
pub fn render_transcript(turns: &[SessionTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        match &turn.tool_name {
            Some(tool) => {
                out.push_str(&format!("[tool {}]: {}\n", tool, turn.content));
            }
            None => {
                out.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.content));
            }
        }
    }
    out
}

fn unix_now() -> Result<i64, EngineError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| EngineError::Session(e.to_string()))?
        .as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn store() -> (SessionStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (SessionStore::new(db.pool().clone()), dir)
    }

    #[tokio::test]
    async fn test_append_then_read_preserves_order() {
        let (store, _dir) = store().await;

        store.append("s", SessionTurn::user("T1")).await.unwrap();
        store.append("s", SessionTurn::assistant("T2")).await.unwrap();
        store
            .append("s", SessionTurn::tool("query_brand_voice", "T3", None))
            .await
            .unwrap();

        let turns = store.read("s").await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["T1", "T2", "T3"]);
        assert_eq!(turns[2].tool_name.as_deref(), Some("query_brand_voice"));
    }

    #[tokio::test]
    async fn test_clear_empties_history() {
        let (store, _dir) = store().await;

        store.append("s", SessionTurn::user("T1")).await.unwrap();
        store.clear("s").await.unwrap();

        assert!(store.read("s").await.unwrap().is_empty());
        assert_eq!(store.token_count("s").await.unwrap(), 0);

        // Session id remains usable
        store.append("s", SessionTurn::user("T2")).await.unwrap();
        assert_eq!(store.read("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (store, _dir) = store().await;

        store.append("a", SessionTurn::user("in a")).await.unwrap();
        store.append("b", SessionTurn::user("in b")).await.unwrap();
        store.clear("a").await.unwrap();

        assert!(store.read("a").await.unwrap().is_empty());
        assert_eq!(store.read("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_count_grows_with_content() {
        let (store, _dir) = store().await;

        store.append("s", SessionTurn::user("hi")).await.unwrap();
        let small = store.token_count("s").await.unwrap();

        store
            .append("s", SessionTurn::user("a".repeat(4000)))
            .await
            .unwrap();
        let large = store.token_count("s").await.unwrap();

        assert!(small > 0);
        assert!(large >= small + 1000);
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize_per_session() {
        let (store, _dir) = store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append("s", SessionTurn::user(format!("turn {}", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let turns = store.read("s").await.unwrap();
        assert_eq!(turns.len(), 10);
        // turn_order assignment never collides: all contents are distinct
        let mut contents: Vec<String> =
            turns.iter().map(|t| t.content.clone()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 10);
    }

    #[tokio::test]
    async fn test_end_retains_history() {
        let (store, _dir) = store().await;

        store.append("s", SessionTurn::user("T1")).await.unwrap();
        store.end("s").await.unwrap();

        assert_eq!(store.read("s").await.unwrap().len(), 1);
        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].ended_at.is_some());
    }

    #[test]
    fn test_render_transcript_labels_tools() {
        let turns = vec![
            SessionTurn::user("write a caption"),
            SessionTurn::tool("write_post_caption", "the caption", None),
            SessionTurn::assistant("done"),
        ];
        let transcript = render_transcript(&turns);
        assert!(transcript.contains("user: write a caption"));
        assert!(transcript.contains("[tool write_post_caption]: the caption"));
        assert!(transcript.contains("assistant: done"));
    }
}
