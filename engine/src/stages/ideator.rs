//! Ideator Stage
//!
//! Brainstorms on-brand post concepts for a content pillar. Ideas come back
//! as an ordered set; an optional wildcard angle constrains the brainstorm
//! toward an unconventional take.

use crate::config::BrandConfig;
use crate::conductor::types::{BrandContext, PostIdea};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    parse_structured, require_context, revision_block, GenerationStage, StageError, StageResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Input to the ideator
#[derive(Debug, Clone)]
pub struct IdeaInput {
    /// Content pillar to brainstorm within
    pub pillar: String,

    /// How many ideas to produce
    pub count: usize,

    /// Strategic reasoning from the plan slot, when ideating from a plan
    pub plan_reasoning: Option<String>,

    /// Unconventional creative constraint, when one was generated
    pub wildcard_angle: Option<String>,
}

pub struct IdeatorStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

#[derive(Debug, Deserialize)]
struct RawIdea {
    title: String,
    #[serde(alias = "content_pillar")]
    pillar: Option<String>,
    #[serde(alias = "defense_of_idea")]
    defense: String,
    #[serde(alias = "expected_results")]
    expected_outcome: String,
    #[serde(default)]
    suggested_format: Option<String>,
}

impl IdeatorStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        format!(
            "You are the creative director for '{}'. {}\n\
             Brainstorm new, on-brand post ideas for the given content pillar.\n\
             Return ONLY a JSON array of idea objects, each with: 'title' (catchy and \
             engaging), 'pillar' (the strategic category), 'defense' (why this idea is \
             relevant and valuable to the audience), 'expected_outcome' (the desired \
             result of the post), and optionally 'suggested_format'.\n\
             Ideas must be creative, relevant to {}, and aligned with the brand voice \
             in the provided context.",
            self.brand.name, self.brand.summary, self.brand.audience
        )
    }
}

#[async_trait]
impl GenerationStage for IdeatorStage {
    type Input = IdeaInput;
    type Output = Vec<PostIdea>;

    fn name(&self) -> &'static str {
        "ideator"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if input.pillar.trim().is_empty() {
            return Err(StageError::MalformedInput(
                "ideator: pillar is required".to_string(),
            ));
        }
        if input.count == 0 {
            return Err(StageError::MalformedInput(
                "ideator: idea count must be at least 1".to_string(),
            ));
        }

        let context = require_context(self.name(), context)?;

        let mut prompt_input = format!(
            "Content pillar: '{}'\nNumber of ideas: {}\n",
            input.pillar, input.count
        );
        if let Some(reasoning) = &input.plan_reasoning {
            prompt_input.push_str(&format!("Strategic reasoning: {}\n", reasoning));
        }
        if let Some(angle) = &input.wildcard_angle {
            prompt_input.push_str(&format!(
                "Wildcard creative constraint to build on: {}\n",
                angle
            ));
        }
        prompt_input.push('\n');
        prompt_input.push_str(&context.render_for_prompt());

        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let response = self.client.generate(&request).await?;

        let raw: Vec<RawIdea> = parse_structured(self.name(), &response)?;
        if raw.is_empty() {
            return Err(StageError::Generation(
                "ideator: model returned no ideas".to_string(),
            ));
        }

        Ok(raw
            .into_iter()
            .take(input.count)
            .map(|idea| PostIdea {
                title: idea.title,
                // The model occasionally omits the pillar; the request's
                // pillar is authoritative in that case
                pillar: idea
                    .pillar
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| input.pillar.clone()),
                defense: idea.defense,
                expected_outcome: idea.expected_outcome,
                suggested_format: idea.suggested_format,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{sample_context, ScriptedClient};

    const IDEAS_JSON: &str = r#"[
        {"title": "The real cost of a mug", "pillar": "Pricing",
         "defense": "Demystifies material costs", "expected_outcome": "High saves"},
        {"title": "Price it like you mean it", "defense": "Confidence builder",
         "expected_outcome": "Engagement", "suggested_format": "carousel"}
    ]"#;

    fn input(pillar: &str, count: usize) -> IdeaInput {
        IdeaInput {
            pillar: pillar.to_string(),
            count,
            plan_reasoning: None,
            wildcard_angle: None,
        }
    }

    #[tokio::test]
    async fn test_ideas_parse_with_aliases_and_pillar_backfill() {
        let client = Arc::new(ScriptedClient::new(vec![IDEAS_JSON]));
        let stage = IdeatorStage::new(client, BrandConfig::default());

        let ideas = stage
            .run(&input("Pricing", 2), Some(&sample_context()), None)
            .await
            .unwrap();

        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].pillar, "Pricing");
        // Second idea omitted the pillar; the request's pillar fills it
        assert_eq!(ideas[1].pillar, "Pricing");
        assert_eq!(ideas[1].suggested_format.as_deref(), Some("carousel"));
    }

    #[tokio::test]
    async fn test_surplus_ideas_truncated_to_count() {
        let client = Arc::new(ScriptedClient::new(vec![IDEAS_JSON]));
        let stage = IdeatorStage::new(client, BrandConfig::default());

        let ideas = stage
            .run(&input("Pricing", 1), Some(&sample_context()), None)
            .await
            .unwrap();
        assert_eq!(ideas.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_pillar_is_malformed() {
        let client = Arc::new(ScriptedClient::new(vec![IDEAS_JSON]));
        let stage = IdeatorStage::new(client.clone(), BrandConfig::default());

        let err = stage
            .run(&input("  ", 1), Some(&sample_context()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wildcard_angle_rendered_into_prompt() {
        let client = Arc::new(ScriptedClient::new(vec![IDEAS_JSON]));
        let stage = IdeatorStage::new(client.clone(), BrandConfig::default());

        let mut idea_input = input("Pricing", 2);
        idea_input.wildcard_angle = Some("explain pricing as a cake recipe".to_string());
        stage
            .run(&idea_input, Some(&sample_context()), None)
            .await
            .unwrap();

        let sent = client.request_inputs().pop().unwrap();
        assert!(sent.contains("cake recipe"));
    }

    #[tokio::test]
    async fn test_empty_idea_array_is_generation_failure() {
        let client = Arc::new(ScriptedClient::new(vec!["[]"]));
        let stage = IdeatorStage::new(client, BrandConfig::default());

        let err = stage
            .run(&input("Pricing", 2), Some(&sample_context()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
    }
}
