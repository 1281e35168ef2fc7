//! Writer Stage
//!
//! Writes the post caption for a selected idea, in the brand's voice.
//! Output is free text; the caption is the whole returned artifact.

use crate::config::BrandConfig;
use crate::conductor::types::{BrandContext, PostIdea};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    require_context, revision_block, GenerationStage, StageError, StageResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Input to the writer
#[derive(Debug, Clone)]
pub struct CaptionInput {
    pub idea: PostIdea,
}

pub struct WriterStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

impl WriterStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        let cta_site = if self.brand.site_url.is_empty() {
            String::new()
        } else {
            format!(
                " End the call to action with a pointer to {} (link in bio).",
                self.brand.site_url
            )
        };

        format!(
            "You are the copywriter for '{}'. {}\n\
             Write one compelling caption for the given post idea, addressed to {}.\n\
             Structure: open with a hook on a real pain point or feeling, develop the \
             body to educate and provide value, connect the problem to the brand, and \
             close with a clear call to action.{}\n\
             Match the tone, emoji usage, and style shown in the brand context.\n\
             Return ONLY the caption text, with no preamble or commentary.",
            self.brand.name, self.brand.summary, self.brand.audience, cta_site
        )
    }
}

#[async_trait]
impl GenerationStage for WriterStage {
    type Input = CaptionInput;
    type Output = String;

    fn name(&self) -> &'static str {
        "writer"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.idea.title.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "writer: idea title is required".to_string(),
            ));
        }
        if input.idea.defense.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "writer: idea defense is required".to_string(),
            ));
        }

        let context = require_context(self.name(), context)?;

        let mut prompt_input = format!(
            "Idea title: \"{}\"\nIdea defense: \"{}\"\nExpected outcome: \"{}\"\n\n{}",
            input.idea.title,
            input.idea.defense,
            input.idea.expected_outcome,
            context.render_for_prompt()
        );
        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let caption = self.client.generate(&request).await?;

        let caption = caption.trim().to_string();
        if caption.is_empty() {
            return Err(StageError::Generation(
                "writer: model returned an empty caption".to_string(),
            ));
        }

        Ok(caption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{sample_context, ScriptedClient};

    fn idea() -> PostIdea {
        PostIdea {
            title: "The real cost of a mug".to_string(),
            pillar: "Pricing".to_string(),
            defense: "Demystifies material costs".to_string(),
            expected_outcome: "High saves".to_string(),
            suggested_format: None,
        }
    }

    #[tokio::test]
    async fn test_caption_is_trimmed_response() {
        let client = Arc::new(ScriptedClient::new(vec!["  A caption with heart. \n"]));
        let stage = WriterStage::new(client, BrandConfig::default());

        let caption = stage
            .run(&CaptionInput { idea: idea() }, Some(&sample_context()), None)
            .await
            .unwrap();
        assert_eq!(caption, "A caption with heart.");
    }

    #[tokio::test]
    async fn test_missing_title_is_malformed() {
        let client = Arc::new(ScriptedClient::new(vec!["caption"]));
        let stage = WriterStage::new(client.clone(), BrandConfig::default());

        let mut bad = idea();
        bad.title = String::new();
        let err = stage
            .run(&CaptionInput { idea: bad }, Some(&sample_context()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_caption_is_generation_failure() {
        let client = Arc::new(ScriptedClient::new(vec!["   "]));
        let stage = WriterStage::new(client, BrandConfig::default());

        let err = stage
            .run(&CaptionInput { idea: idea() }, Some(&sample_context()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
    }

    #[tokio::test]
    async fn test_idea_fields_flow_into_prompt() {
        let client = Arc::new(ScriptedClient::new(vec!["caption"]));
        let stage = WriterStage::new(client.clone(), BrandConfig::default());

        stage
            .run(&CaptionInput { idea: idea() }, Some(&sample_context()), None)
            .await
            .unwrap();

        let sent = client.request_inputs().pop().unwrap();
        assert!(sent.contains("The real cost of a mug"));
        assert!(sent.contains("Demystifies material costs"));
    }
}
