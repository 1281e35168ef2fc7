//! Generation Service Boundary
//!
//! This module provides the abstract capabilities the engine needs from the
//! outside world: text generation (`GenerationClient`) and embeddings
//! (`EmbeddingClient`). The traits define the contract; `openai.rs` is the
//! concrete OpenAI-compatible HTTP client. Everything above this boundary is
//! provider-agnostic.

use async_trait::async_trait;

pub mod openai;

pub use openai::OpenAiClient;

/// Result type for generation service operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to the generation service
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A single generation request
///
/// `role_instructions` is the stage's standing persona and output contract;
/// `input` is the per-call structured payload rendered to text. Structured
/// outputs are requested in the instructions and parsed from the returned
/// text by the calling stage.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Role/system instructions for this call
    pub role_instructions: String,

    /// User-turn input payload
    pub input: String,

    /// Sampling temperature override; `None` uses the client default
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    /// Create a new request with default temperature
    pub fn new(role_instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            role_instructions: role_instructions.into(),
            input: input.into(),
            temperature: None,
        }
    }

    /// Override the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Sender half of the observability stream
///
/// Chunks delivered on this channel are incremental text for progress
/// display only. They are never parsed as the authoritative result; the
/// authoritative result is the value returned by the call itself.
pub type ChunkSender = tokio::sync::mpsc::UnboundedSender<String>;

/// Text generation capability
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Returns the name of the backing provider (e.g. "openai")
    fn name(&self) -> &str;

    /// Generate a response for the given request
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generate a response, emitting incremental chunks on `chunks`.
    ///
    /// The default implementation performs a regular call and emits the full
    /// text as a single chunk. Providers with native streaming override this.
    async fn generate_streamed(
        &self,
        request: &GenerationRequest,
        chunks: &ChunkSender,
    ) -> Result<String> {
        let text = self.generate(request).await?;
        let _ = chunks.send(text.clone());
        Ok(text)
    }
}

/// Embedding capability
///
/// Embeddings are opaque fixed-length vectors; the engine never inspects
/// individual dimensions beyond similarity scoring in the store.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text into a vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Extract the first JSON object or array embedded in model output.
///
/// Handles the formats models actually produce:
/// 1. The whole trimmed content is the JSON value
/// 2. Fenced JSON (with or without trailing prose): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: scans for the first `{` or `[` and takes the
///    balanced span
pub fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(span) = extract_balanced_json(trimmed) {
            return Some(span);
        }
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        let inner = inner.trim();
        if let Some(span) = extract_balanced_json(inner) {
            return Some(span);
        }
    }

    let start = trimmed.find(|c| c == '{' || c == '[')?;
    extract_balanced_json(&trimmed[start..])
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_block(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON value starting at position 0 of `s`.
///
/// Counts bracket depth, respecting string literals, to find the matching
/// close of the opening `{` or `[`.
fn extract_balanced_json(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
