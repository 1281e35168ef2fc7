//! Visualizer Stage
//!
//! Translates a post concept and caption into a series of single-paragraph
//! image-generation prompts. The stage owns the closing contract: the final
//! element of every returned set is the call-to-action slide, appended here
//! rather than trusted to the model, and the set never exceeds the slide
//! bound.

use crate::config::BrandConfig;
use crate::conductor::types::{BrandContext, ImagePromptSet, MAX_IMAGE_PROMPTS};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    parse_structured, require_context, revision_block, GenerationStage, StageError, StageResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Input to the visualizer
#[derive(Debug, Clone)]
pub struct VisualInput {
    /// The post concept (usually the idea title)
    pub concept: String,

    /// The final caption the slides accompany
    pub caption: String,

    /// Number of content prompts to produce; `None` lets the stage size the
    /// set to the content's complexity
    pub content_prompts: Option<usize>,
}

pub struct VisualizerStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

/// The model may return either a bare array of strings or an object with a
/// 'prompts' array of {prompt} items.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrompts {
    Object { prompts: Vec<RawPrompt> },
    Strings(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    prompt: String,
}

impl RawPrompts {
    fn into_strings(self) -> Vec<String> {
        match self {
            RawPrompts::Object { prompts } => prompts.into_iter().map(|p| p.prompt).collect(),
            RawPrompts::Strings(strings) => strings,
        }
    }
}

impl VisualizerStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self, count: Option<usize>) -> String {
        let sizing = match count {
            Some(n) => format!("Produce exactly {} content prompts.", n),
            None => format!(
                "Choose how many content prompts the post needs from its complexity, \
                 up to {}.",
                MAX_IMAGE_PROMPTS - 1
            ),
        };

        format!(
            "You are the art director for '{}'. {}\n\
             Translate the post concept and caption into prompts for an image \
             generation model.\n\
             Every prompt must be a single paragraph in English. Be highly specific: \
             describe the scene, environment, lighting, props, and any human element \
             with their action and expression. Text to render on the image goes in \
             double quotes with its position and font style.\n\
             {}\n\
             Do NOT include a closing call-to-action slide; it is appended separately.\n\
             Return ONLY a JSON object with a 'prompts' key holding an array of \
             {{'prompt'}} objects, in slide order.",
            self.brand.name, self.brand.summary, sizing
        )
    }

    /// The standard closing slide, built from the brand profile
    fn cta_prompt(&self) -> String {
        let site = if self.brand.site_url.is_empty() {
            "the link in bio".to_string()
        } else {
            format!("\"{}\"", self.brand.site_url)
        };

        format!(
            "Closing call-to-action slide for {}: a clean branded graphic in the \
             brand's palette, with a short invitation to comment, save and share \
             overlaid in a large friendly title, and a final pointer to {} at the \
             bottom in a smaller script font.",
            self.brand.name, site
        )
    }
}

#[async_trait]
impl GenerationStage for VisualizerStage {
    type Input = VisualInput;
    type Output = ImagePromptSet;

    fn name(&self) -> &'static str {
        "visualizer"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.concept.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "visualizer: post concept is required".to_string(),
            ));
        }
        if input.caption.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "visualizer: caption is required".to_string(),
            ));
        }
        if let Some(n) = input.content_prompts {
            if n == 0 || n > MAX_IMAGE_PROMPTS - 1 {
                return Err(StageError::MalformedInput(format!(
                    "visualizer: content prompt count must be within 1..={}",
                    MAX_IMAGE_PROMPTS - 1
                )));
            }
        }

        let context = require_context(self.name(), context)?;

        let mut prompt_input = format!(
            "Post concept: \"{}\"\nCaption:\n{}\n\n{}",
            input.concept,
            input.caption,
            context.render_for_prompt()
        );
        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request =
            GenerationRequest::new(self.role_instructions(input.content_prompts), prompt_input);
        let response = self.client.generate(&request).await?;

        let raw: RawPrompts = parse_structured(self.name(), &response)?;
        let content: Vec<String> = raw
            .into_strings()
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if content.is_empty() {
            return Err(StageError::Generation(
                "visualizer: model returned no prompts".to_string(),
            ));
        }

        Ok(ImagePromptSet::new(content, self.cta_prompt()))
    }
}
