//! Generation Stages
//!
//! Each stage is a stateless unit that turns structured input (plus the
//! brand context and optional revision feedback) into one typed artifact.
//! Stages validate their inputs before any network call, and convert every
//! generation-service failure into a typed `StageError` at their boundary;
//! nothing below here raises past the orchestrator.

use crate::conductor::types::BrandContext;
use crate::llm::{extract_json, LlmError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub mod analyst;
pub mod evaluator;
pub mod ideator;
pub mod planner;
pub mod reporter;
pub mod reviser;
pub mod visualizer;
pub mod writer;

pub use analyst::{AnalystInput, HistoryAnalystStage};
pub use evaluator::{EvaluationInput, EvaluatorStage};
pub use ideator::{IdeaInput, IdeatorStage};
pub use planner::{PlanInput, PlannerStage};
pub use reporter::ReporterStage;
pub use reviser::{ReviseInput, ReviserStage};
pub use visualizer::{VisualInput, VisualizerStage};
pub use writer::{CaptionInput, WriterStage};

/// Result type for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Errors raised at a stage boundary
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The caller passed an incomplete structured object. Never forwarded to
    /// the model; surfaced immediately.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The underlying generation call failed: transport error, timeout, or
    /// an unparseable structured response. Recoverable via retry or a
    /// pipeline-level fallback.
    #[error("Generation failed: {0}")]
    Generation(String),
}

impl From<LlmError> for StageError {
    fn from(err: LlmError) -> Self {
        StageError::Generation(err.to_string())
    }
}

impl From<StageError> for sdk::errors::EngineError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::MalformedInput(msg) => sdk::errors::EngineError::MalformedInput(msg),
            StageError::Generation(msg) => sdk::errors::EngineError::GenerationFailed(msg),
        }
    }
}

/// The generic stage contract.
///
/// `context` carries the mandatory brand context; creative stages reject
/// `None` as malformed input, while narrow lookup stages (history analysis,
/// report generation) accept it. `prior_feedback`, when present, instructs
/// the stage to replace its entire previous output, not patch fragments.
#[async_trait]
pub trait GenerationStage: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    /// Stage name used in logs and error messages
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output>;
}

/// Parse a typed value out of model output, extracting the first embedded
/// JSON object or array.
pub(crate) fn parse_structured<T: DeserializeOwned>(
    stage: &str,
    content: &str,
) -> StageResult<T> {
    let span = extract_json(content)
        .ok_or_else(|| StageError::Generation(format!("{}: no JSON in model output", stage)))?;

    serde_json::from_str(span)
        .map_err(|e| StageError::Generation(format!("{}: unparseable structured output: {}", stage, e)))
}

/// Render prior feedback into a revision block appended to the stage input.
pub(crate) fn revision_block(feedback: &str) -> String {
    format!(
        "\n\nFeedback for revision:\n{}\n\n\
         Your previous output was reviewed and needs changes. Rewrite the \
         entire output from scratch, addressing every point above. Do not \
         patch fragments of the old version.",
        feedback
    )
}

/// Resolve the mandatory brand context for a primary creative stage.
pub(crate) fn require_context<'a>(
    stage: &str,
    context: Option<&'a BrandContext>,
) -> StageResult<&'a BrandContext> {
    context.ok_or_else(|| {
        StageError::MalformedInput(format!("{}: brand context is required", stage))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::conductor::types::{BrandContext, BrandVoiceReport, PillarDetail};
    use crate::llm::{GenerationClient, GenerationRequest, LlmError};
    use crate::store::ContentRecord;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generation client fed from a script of canned responses.
    ///
    /// Records every request so tests can assert on prompt contents and
    /// call counts. An exhausted script yields a timeout error.
    pub(crate) struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        pub(crate) requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(
                    responses.into_iter().map(|r| Ok(r.to_string())).collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub(crate) fn request_inputs(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.input.clone())
                .collect()
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Timeout))
        }
    }

    pub(crate) fn sample_record(id: &str, caption: &str) -> ContentRecord {
        ContentRecord {
            id: id.to_string(),
            caption: caption.to_string(),
            hashtags: vec!["#maker".to_string()],
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
            likes: 42,
            comments: 7,
            url: format!("https://example.com/{}", id),
        }
    }

    pub(crate) fn sample_context() -> BrandContext {
        BrandContext {
            report: BrandVoiceReport {
                executive_summary: "Warm, educational voice for makers.".to_string(),
                pillars: vec![
                    PillarDetail {
                        name: "Pricing".to_string(),
                        description: "Pricing handmade work with confidence".to_string(),
                    },
                    PillarDetail {
                        name: "Humor".to_string(),
                        description: "Light studio-life jokes".to_string(),
                    },
                ],
                audience_persona: "Independent makers".to_string(),
                tone_analysis: "Friendly and didactic".to_string(),
                language_style: "Colloquial, emoji-forward".to_string(),
                locale_notes: "English, US".to_string(),
                hashtag_strategy: "Community tags plus one brand tag".to_string(),
            },
            samples: vec![
                sample_record("s1", "How to price a custom order"),
                sample_record("s2", "Studio humor: the glue gun betrayal"),
            ],
        }
    }
}
