//! Evaluator Stage
//!
//! Judges a candidate artifact against the brand's principles and returns an
//! approve/revise verdict with actionable feedback. The verdict is transient:
//! it lives for exactly one evaluation-loop iteration.

use crate::config::BrandConfig;
use crate::conductor::types::{ArtifactKind, BrandContext, EvaluationVerdict};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{parse_structured, GenerationStage, StageError, StageResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Input to the evaluator
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    /// The candidate artifact, serialized to text
    pub candidate: String,

    /// What kind of artifact is under review
    pub artifact: ArtifactKind,

    /// Quality notes gathered by the orchestrator (e.g. detected theme
    /// repetition), surfaced for the verdict rather than pre-judged
    pub notes: Vec<String>,
}

pub struct EvaluatorStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    score: RawScore,
    #[serde(default)]
    feedback: String,
}

#[derive(Debug, Deserialize)]
enum RawScore {
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "needs-revision", alias = "needs_revision")]
    NeedsRevision,
}

impl EvaluatorStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        format!(
            "You are the quality evaluator for '{}'. {}\n\
             Judge whether the candidate artifact is on-brand, on-audience, and \
             delivers real value, using the brand principles in the provided context.\n\
             Return ONLY a JSON object with 'score' (\"approved\" or \
             \"needs-revision\") and 'feedback' (specific, actionable notes; required \
             when the score is \"needs-revision\").",
            self.brand.name, self.brand.summary
        )
    }
}

#[async_trait]
impl GenerationStage for EvaluatorStage {
    type Input = EvaluationInput;
    type Output = EvaluationVerdict;

    fn name(&self) -> &'static str {
        "evaluator"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        _prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.candidate.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "evaluator: candidate is empty".to_string(),
            ));
        }

        let mut prompt_input = format!(
            "Artifact under review: {}\n\nCandidate:\n---\n{}\n---\n",
            input.artifact, input.candidate
        );

        if !input.notes.is_empty() {
            prompt_input.push_str("\nQuality notes from the orchestrator:\n");
            for note in &input.notes {
                prompt_input.push_str(&format!("- {}\n", note));
            }
        }

        // Brand principles come from the assembled context when available,
        // with the configured profile as the narrow fallback
        match context {
            Some(ctx) => prompt_input.push_str(&format!("\n{}", ctx.render_for_prompt())),
            None => prompt_input.push_str(&format!(
                "\nBrand principles: {} Audience: {}\n",
                self.brand.summary, self.brand.audience
            )),
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let response = self.client.generate(&request).await?;

        let raw: RawVerdict = parse_structured(self.name(), &response)?;

        Ok(EvaluationVerdict {
            score: match raw.score {
                RawScore::Approved => crate::conductor::types::VerdictScore::Approved,
                RawScore::NeedsRevision => crate::conductor::types::VerdictScore::NeedsRevision,
            },
            feedback: raw.feedback,
        })
    }
}
