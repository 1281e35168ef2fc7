//! Reviser Stage
//!
//! Revises an existing piece of content (caption or image prompt) against
//! user feedback, keeping what was already right. The user feedback here is
//! part of the structured input; loop feedback from the Evaluator arrives
//! through `prior_feedback` like every other stage.

use crate::config::BrandConfig;
use crate::conductor::types::BrandContext;
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    require_context, revision_block, GenerationStage, StageError, StageResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Input to the reviser
#[derive(Debug, Clone)]
pub struct ReviseInput {
    /// What is being revised, e.g. "caption" or "image prompt"
    pub component: String,

    /// The original content to revise
    pub original: String,

    /// The user's refinement instructions
    pub user_feedback: String,
}

pub struct ReviserStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

impl ReviserStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        format!(
            "You are the reviewer for '{}'. {}\n\
             Perform a precise, targeted revision of the given content based on the \
             user's feedback. Preserve the parts that were already correct; do not \
             regenerate from scratch. Keep the brand voice from the provided context.\n\
             Return ONLY the complete revised content.",
            self.brand.name, self.brand.summary
        )
    }
}

#[async_trait]
impl GenerationStage for ReviserStage {
    type Input = ReviseInput;
    type Output = String;

    fn name(&self) -> &'static str {
        "reviser"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.original.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "reviser: original content is required".to_string(),
            ));
        }
        if input.user_feedback.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "reviser: user feedback is required".to_string(),
            ));
        }

        let context = require_context(self.name(), context)?;

        let mut prompt_input = format!(
            "Component: {}\n\nOriginal content to revise:\n---\n{}\n---\n\n\
             User feedback:\n---\n{}\n---\n\n{}",
            input.component,
            input.original,
            input.user_feedback,
            context.render_for_prompt()
        );
        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let revised = self.client.generate(&request).await?;

        let revised = revised.trim().to_string();
        if revised.is_empty() {
            return Err(StageError::Generation(
                "reviser: model returned empty content".to_string(),
            ));
        }

        Ok(revised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{sample_context, ScriptedClient};

    fn input() -> ReviseInput {
        ReviseInput {
            component: "caption".to_string(),
            original: "Original caption text.".to_string(),
            user_feedback: "Make the call to action more prominent.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_revision_includes_original_and_feedback() {
        let client = Arc::new(ScriptedClient::new(vec!["Revised caption text."]));
        let stage = ReviserStage::new(client.clone(), BrandConfig::default());

        let revised = stage
            .run(&input(), Some(&sample_context()), None)
            .await
            .unwrap();
        assert_eq!(revised, "Revised caption text.");

        let sent = client.request_inputs().pop().unwrap();
        assert!(sent.contains("Original caption text."));
        assert!(sent.contains("more prominent"));
    }

    #[tokio::test]
    async fn test_empty_original_is_malformed() {
        let client = Arc::new(ScriptedClient::new(vec!["revised"]));
        let stage = ReviserStage::new(client.clone(), BrandConfig::default());

        let mut bad = input();
        bad.original = "  ".to_string();
        assert!(matches!(
            stage.run(&bad, Some(&sample_context()), None).await,
            Err(StageError::MalformedInput(_))
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_feedback_is_malformed() {
        let client = Arc::new(ScriptedClient::new(vec!["revised"]));
        let stage = ReviserStage::new(client, BrandConfig::default());

        let mut bad = input();
        bad.user_feedback = String::new();
        assert!(matches!(
            stage.run(&bad, Some(&sample_context()), None).await,
            Err(StageError::MalformedInput(_))
        ));
    }
}
