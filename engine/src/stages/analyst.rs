//! History Analyst Stage
//!
//! Answers a query about what happened earlier in a session by reading the
//! stored transcript. A narrow lookup stage: it runs without brand context
//! and answers strictly from the transcript.

use crate::conductor::types::BrandContext;
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{GenerationStage, StageError, StageResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Input to the history analyst
#[derive(Debug, Clone)]
pub struct AnalystInput {
    /// What the caller wants to know about the session
    pub query: String,

    /// The session transcript, rendered turn by turn
    pub transcript: String,
}

pub struct HistoryAnalystStage {
    client: Arc<dyn GenerationClient>,
}

impl HistoryAnalystStage {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    fn role_instructions(&self) -> String {
        "You are a session history analyst. Read the provided conversation \
         transcript and answer the query using only information in it. If the \
         transcript asks for specific content (a caption, an idea), return that \
         content verbatim. If the information is not in the transcript, say so \
         plainly. Never invent or infer beyond the transcript."
            .to_string()
    }
}

#[async_trait]
impl GenerationStage for HistoryAnalystStage {
    type Input = AnalystInput;
    type Output = String;

    fn name(&self) -> &'static str {
        "history_analyst"
    }

    async fn run(
        &self,
        input: &Self::Input,
        _context: Option<&BrandContext>,
        _prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.query.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "history_analyst: query is required".to_string(),
            ));
        }

        let prompt_input = format!(
            "Query: {}\n\nSession transcript:\n---\n{}\n---",
            input.query,
            if input.transcript.is_empty() {
                "(empty session)"
            } else {
                &input.transcript
            }
        );

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let answer = self.client.generate(&request).await?;

        Ok(answer.trim().to_string())
    }
}
