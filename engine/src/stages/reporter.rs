//! Reporter Stage
//!
//! Performs a holistic analysis of a sample of historical posts and produces
//! the `BrandVoiceReport`. This stage is the producer of brand context, so
//! it is the one stage that runs without it.

use crate::config::BrandConfig;
use crate::conductor::types::{BrandContext, BrandVoiceReport};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    parse_structured, revision_block, GenerationStage, StageError, StageResult,
};
use crate::store::ContentRecord;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ReporterStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

impl ReporterStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        format!(
            "You are a brand strategist for '{}'. {}\n\
             Analyze the sampled posts and return ONLY a JSON object with these keys:\n\
             'executive_summary' (string), \
             'pillars' (array of {{'name', 'description'}} for each recurring content category), \
             'audience_persona' (string), 'tone_analysis' (string), \
             'language_style' (string covering emoji, colloquialisms and calls to action), \
             'locale_notes' (string: country and language the content is written in), \
             'hashtag_strategy' (string).\n\
             Populate every field with analysis grounded in the samples.",
            self.brand.name, self.brand.summary
        )
    }

    /// Render the sample set into the analysis payload
    pub fn render_samples(samples: &[ContentRecord]) -> String {
        let mut out = String::from("Sampled posts for analysis:\n");
        for record in samples {
            out.push_str(&format!(
                "- Caption: {}\n  Hashtags: {}\n  Posted: {}\n  Engagement: {} likes, {} comments\n",
                record.caption,
                record.hashtags.join(" "),
                record.timestamp.format("%Y-%m-%d"),
                record.likes,
                record.comments
            ));
        }
        out
    }
}

#[async_trait]
impl GenerationStage for ReporterStage {
    type Input = Vec<ContentRecord>;
    type Output = BrandVoiceReport;

    fn name(&self) -> &'static str {
        "reporter"
    }

    async fn run(
        &self,
        input: &Self::Input,
        _context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.is_empty() {
            return Err(StageError::MalformedInput(
                "reporter: sample set is empty".to_string(),
            ));
        }

        let mut prompt_input = Self::render_samples(input);
        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let response = self.client.generate(&request).await?;

        parse_structured(self.name(), &response)
    }
}
