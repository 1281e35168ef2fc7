//! Planner Stage
//!
//! Turns a plan request (a post count or a time frame) into an ordered
//! `ContentPlan`. The cardinality contract is enforced here, after the model
//! call: slot labels are rewritten deterministically, surplus items are
//! truncated, and under-delivery is a generation failure, so the plan a caller
//! receives always satisfies the requested shape.

use crate::config::BrandConfig;
use crate::conductor::types::{BrandContext, ContentPlan, PlanRequest, PlannedItem};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    parse_structured, require_context, revision_block, GenerationStage, StageError, StageResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

/// Input to the planner
#[derive(Debug, Clone)]
pub struct PlanInput {
    pub request: PlanRequest,

    /// Themes used recently; candidates duplicating these are a quality
    /// defect surfaced to the Evaluator, not a hard failure here
    pub recent_themes: Vec<String>,
}

pub struct PlannerStage {
    client: Arc<dyn GenerationClient>,
    brand: BrandConfig,
}

/// Intermediate deserialization type for model JSON output
#[derive(Debug, Deserialize)]
struct RawPlan {
    plan: Vec<RawPlannedItem>,
}

#[derive(Debug, Deserialize)]
struct RawPlannedItem {
    #[serde(alias = "day_or_sequence")]
    slot: Option<String>,
    pillar: String,
    #[serde(default)]
    reasoning: String,
}

impl PlannerStage {
    pub fn new(client: Arc<dyn GenerationClient>, brand: BrandConfig) -> Self {
        Self { client, brand }
    }

    fn role_instructions(&self) -> String {
        format!(
            "You are the content planner for '{}'. {}\n\
             Create a strategic content plan from the provided brand context.\n\
             Return ONLY a JSON object with a 'plan' key holding an array of items, \
             each with: 'slot' (a weekday name or \"Post N\"), 'pillar' (the strategic \
             content category), and 'reasoning' (why this pillar in this slot).\n\
             If a number of posts is requested, return exactly that many items. \
             If a single day is requested, return exactly one item. \
             If a week is requested, cover several days including the weekend. \
             If a month is requested, sequence themes across the whole month.\n\
             Review the recent themes listed in the request and avoid repeating them.",
            self.brand.name, self.brand.summary
        )
    }

    fn render_input(&self, input: &PlanInput, context: &BrandContext) -> String {
        let request_params = match input.request {
            PlanRequest::Count { posts } => format!("Number of posts: {}", posts),
            PlanRequest::SingleDay { date } => {
                format!("Time frame: single day\nDate: {}", date)
            }
            PlanRequest::Week { start } => {
                format!("Time frame: week\nWeek starting: {}", start)
            }
            PlanRequest::Month { start } => {
                format!("Time frame: month\nMonth starting: {}", start)
            }
        };

        let variety = if input.recent_themes.is_empty() {
            "none".to_string()
        } else {
            input.recent_themes.join(", ")
        };

        format!(
            "Request:\n{}\n\nAvoid these recent themes: {}\n\n{}",
            request_params,
            variety,
            context.render_for_prompt()
        )
    }
}

#[async_trait]
impl GenerationStage for PlannerStage {
    type Input = PlanInput;
    type Output = ContentPlan;

    fn name(&self) -> &'static str {
        "planner"
    }

    async fn run(
        &self,
        input: &Self::Input,
        context: Option<&BrandContext>,
        prior_feedback: Option<&str>,
    ) -> StageResult<Self::Output> {
        if let PlanRequest::Count { posts } = input.request {
            if posts == 0 {
                return Err(StageError::MalformedInput(
                    "planner: post count must be at least 1".to_string(),
                ));
            }
        }

        let context = require_context(self.name(), context)?;

        let mut prompt_input = self.render_input(input, context);
        if let Some(feedback) = prior_feedback {
            prompt_input.push_str(&revision_block(feedback));
        }

        let request = GenerationRequest::new(self.role_instructions(), prompt_input);
        let response = self.client.generate(&request).await?;

        let raw: RawPlan = parse_structured(self.name(), &response)?;
        let items = enforce_cardinality(input.request, raw.plan)?;

        Ok(ContentPlan { items })
    }
}

/// Weekday name for a date, e.g. 2024-06-10 -> "Monday"
pub fn weekday_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Normalize a parsed plan against the request's cardinality contract.
///
/// Surplus items are truncated; too few items means the model did not
/// deliver the requested structure and the call counts as failed. Labels for
/// count and single-day plans are rewritten here rather than trusted.
fn enforce_cardinality(
    request: PlanRequest,
    raw: Vec<RawPlannedItem>,
) -> StageResult<Vec<PlannedItem>> {
    if raw.is_empty() {
        return Err(StageError::Generation(
            "planner: model returned an empty plan".to_string(),
        ));
    }

    match request {
        PlanRequest::Count { posts } => {
            if raw.len() < posts {
                return Err(StageError::Generation(format!(
                    "planner: model returned {} items, expected {}",
                    raw.len(),
                    posts
                )));
            }
            Ok(raw
                .into_iter()
                .take(posts)
                .enumerate()
                .map(|(i, item)| PlannedItem {
                    slot: format!("Post {}", i + 1),
                    pillar: item.pillar,
                    reasoning: item.reasoning,
                    position: Some(i as i64 + 1),
                })
                .collect())
        }

        PlanRequest::SingleDay { date } => {
            let first = raw.into_iter().next().expect("checked non-empty");
            Ok(vec![PlannedItem {
                slot: weekday_name(date),
                pillar: first.pillar,
                reasoning: first.reasoning,
                position: None,
            }])
        }

        PlanRequest::Week { .. } => {
            if raw.len() < 2 {
                return Err(StageError::Generation(
                    "planner: a weekly plan needs more than one item".to_string(),
                ));
            }
            Ok(raw.into_iter().map(planned_from_raw).collect())
        }

        PlanRequest::Month { .. } => Ok(raw.into_iter().map(planned_from_raw).collect()),
    }
}

fn planned_from_raw(item: RawPlannedItem) -> PlannedItem {
    PlannedItem {
        slot: item.slot.unwrap_or_default().trim().to_string(),
        pillar: item.pillar,
        reasoning: item.reasoning,
        position: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{sample_context, ScriptedClient};

    fn plan_json(n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| {
                format!(
                    r#"{{"slot": "Day {i}", "pillar": "Pillar {i}", "reasoning": "because {i}"}}"#
                )
            })
            .collect();
        format!(r#"{{"plan": [{}]}}"#, items.join(","))
    }

    #[tokio::test]
    async fn test_count_mode_relabels_sequentially() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(5)]));
        let stage = PlannerStage::new(client, BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 3 },
            recent_themes: vec![],
        };
        let plan = stage
            .run(&input, Some(&sample_context()), None)
            .await
            .unwrap();

        assert_eq!(plan.items.len(), 3);
        let labels: Vec<&str> = plan.items.iter().map(|i| i.slot.as_str()).collect();
        assert_eq!(labels, vec!["Post 1", "Post 2", "Post 3"]);
        assert_eq!(plan.items[0].position, Some(1));
        assert_eq!(plan.items[2].position, Some(3));
    }

    #[tokio::test]
    async fn test_count_mode_exact_for_every_n_in_range() {
        // The model always over-delivers 20 items; every requested count in
        // [1, 20] must come back exactly sized and labeled
        for n in 1..=20usize {
            let client = Arc::new(ScriptedClient::new(vec![&plan_json(20)]));
            let stage = PlannerStage::new(client, BrandConfig::default());

            let input = PlanInput {
                request: PlanRequest::Count { posts: n },
                recent_themes: vec![],
            };
            let plan = stage
                .run(&input, Some(&sample_context()), None)
                .await
                .unwrap();

            assert_eq!(plan.items.len(), n);
            for (i, item) in plan.items.iter().enumerate() {
                assert_eq!(item.slot, format!("Post {}", i + 1));
            }
        }
    }

    #[tokio::test]
    async fn test_count_mode_under_delivery_fails() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(2)]));
        let stage = PlannerStage::new(client, BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 4 },
            recent_themes: vec![],
        };
        let err = stage
            .run(&input, Some(&sample_context()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
    }

    #[tokio::test]
    async fn test_single_day_uses_weekday_name() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(3)]));
        let stage = PlannerStage::new(client, BrandConfig::default());

        // 2024-06-10 is a Monday
        let input = PlanInput {
            request: PlanRequest::SingleDay {
                date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            },
            recent_themes: vec![],
        };
        let plan = stage
            .run(&input, Some(&sample_context()), None)
            .await
            .unwrap();

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].slot, "Monday");
    }

    #[tokio::test]
    async fn test_week_mode_requires_multiple_items() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(1)]));
        let stage = PlannerStage::new(client, BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Week {
                start: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            },
            recent_themes: vec![],
        };
        assert!(stage.run(&input, Some(&sample_context()), None).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_context_is_malformed_input() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(1)]));
        let stage = PlannerStage::new(client.clone(), BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 1 },
            recent_themes: vec![],
        };
        let err = stage.run(&input, None, None).await.unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
        // Never forwarded to the model
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_count_is_malformed_input() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(1)]));
        let stage = PlannerStage::new(client.clone(), BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 0 },
            recent_themes: vec![],
        };
        assert!(matches!(
            stage.run(&input, Some(&sample_context()), None).await,
            Err(StageError::MalformedInput(_))
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_feedback_requests_whole_artifact_revision() {
        let client = Arc::new(ScriptedClient::new(vec![&plan_json(2)]));
        let stage = PlannerStage::new(client.clone(), BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 2 },
            recent_themes: vec!["pricing".to_string()],
        };
        stage
            .run(&input, Some(&sample_context()), Some("too repetitive"))
            .await
            .unwrap();

        let sent = client.request_inputs().pop().unwrap();
        assert!(sent.contains("too repetitive"));
        assert!(sent.contains("Rewrite the entire output"));
        assert!(sent.contains("pricing"));
    }

    #[tokio::test]
    async fn test_fenced_output_with_reasoning_prose_parses() {
        let response = format!(
            "Thinking out loud: variety matters here.\n```json\n{}\n```",
            plan_json(2)
        );
        let client = Arc::new(ScriptedClient::new(vec![&response]));
        let stage = PlannerStage::new(client, BrandConfig::default());

        let input = PlanInput {
            request: PlanRequest::Count { posts: 2 },
            recent_themes: vec![],
        };
        let plan = stage
            .run(&input, Some(&sample_context()), None)
            .await
            .unwrap();
        assert_eq!(plan.items.len(), 2);
    }

    #[test]
    fn test_weekday_name() {
        assert_eq!(
            weekday_name(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()),
            "Monday"
        );
        assert_eq!(
            weekday_name(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()),
            "Saturday"
        );
    }
}
