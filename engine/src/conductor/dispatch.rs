//! Action Registry
//!
//! Every orchestrator capability is registered here as an independently
//! addressable action with a declared name, parameter schema, and return
//! schema. The registry is built once at startup; dispatch selects by name
//! with an explicit match, never runtime introspection. The Conductor plans
//! over `specs()` and executes through `dispatch()`.

use crate::conductor::pipeline::{render_report_markdown, PipelineOrchestrator};
use crate::conductor::types::{PlanRequest, PostIdea};
use crate::llm::GenerationClient;
use crate::session::{render_transcript, SessionStore};
use crate::stages::{AnalystInput, GenerationStage, HistoryAnalystStage};
use chrono::NaiveDate;
use sdk::errors::EngineError;
use sdk::types::{ActionError, ActionInput, ActionOutput, ActionSpec};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Actions that author content. The Conductor must have brand context built
/// before the first of these runs in a plan.
const CREATIVE_ACTIONS: &[&str] = &[
    "propose_content_plan",
    "generate_creative_ideas",
    "write_post_caption",
    "create_image_prompts",
    "refine_creative_content",
    "propose_wildcard_angle",
];

/// Registry of invocable actions
pub struct ToolRegistry {
    pipeline: Arc<PipelineOrchestrator>,
    analyst: HistoryAnalystStage,
    sessions: Arc<SessionStore>,
    brand_name: String,
    specs: Vec<ActionSpec>,
}

impl ToolRegistry {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        pipeline: Arc<PipelineOrchestrator>,
        sessions: Arc<SessionStore>,
        brand_name: String,
    ) -> Self {
        Self {
            pipeline,
            analyst: HistoryAnalystStage::new(client),
            sessions,
            brand_name,
            specs: build_specs(),
        }
    }

    /// The declared contracts of every registered action
    pub fn specs(&self) -> &[ActionSpec] {
        &self.specs
    }

    /// Whether `name` is a registered action
    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }

    /// Whether `name` is a primary creative action
    pub fn is_creative(name: &str) -> bool {
        CREATIVE_ACTIONS.contains(&name)
    }

    /// Invoke an action by name.
    ///
    /// Output data is the verbatim structured result of the action; failures
    /// are typed `EngineError`s, never free-text stand-ins.
    pub async fn dispatch(&self, input: &ActionInput) -> Result<ActionOutput, EngineError> {
        info!("Dispatching action '{}'", input.action);

        match input.action.as_str() {
            "query_brand_voice" => {
                let query_text = param(input.param_str("query_text"))?;
                let n = input.param_i64_opt("n_results").map(|n| n.max(1) as usize);
                let records = self.pipeline.query_brand_voice(&query_text, n).await?;
                Ok(ActionOutput::json(to_json(&records)?))
            }

            "get_specialized_context" => {
                let context_type = param(input.param_str("context_type"))?;
                let query = param(input.param_str("query"))?;
                let n = input.param_i64_opt("num_samples").map(|n| n.max(1) as usize);
                let captions = self
                    .pipeline
                    .specialized_context(&context_type, &query, n)
                    .await?;
                Ok(ActionOutput::json(to_json(&captions)?))
            }

            "build_brand_context" => {
                let sample_size = input.param_i64_opt("sample_size").map(|n| n.max(1) as usize);
                let context = self.pipeline.build_brand_context(sample_size).await?;
                Ok(ActionOutput::json(to_json(&context)?))
            }

            "propose_content_plan" => {
                let request = plan_request_from_params(input)?;
                let recent_themes = string_list(input, "recent_themes");
                let reviewed = self.pipeline.propose_plan(request, recent_themes).await?;
                Ok(ActionOutput::json(json!({
                    "status": reviewed.status(),
                    "plan": to_json(reviewed.value())?,
                })))
            }

            "generate_brand_voice_report" => {
                let sample_size = input.param_i64_opt("sample_size").map(|n| n.max(1) as usize);
                let report = self.pipeline.generate_report(sample_size).await?;
                let markdown = render_report_markdown(&self.brand_name, &report);
                Ok(ActionOutput::json(json!({
                    "report": to_json(&report)?,
                    "markdown": markdown,
                })))
            }

            "generate_creative_ideas" => {
                let pillar = param(input.param_str("pillar"))?;
                let count = input.param_i64_opt("count").map_or(3, |n| n.max(1) as usize);
                let reasoning = input.param_str_opt("reasoning");
                let wildcard = input.param_str_opt("wildcard_angle");
                let reviewed = self
                    .pipeline
                    .generate_ideas(&pillar, count, reasoning, wildcard)
                    .await?;
                Ok(ActionOutput::json(json!({
                    "status": reviewed.status(),
                    "ideas": to_json(reviewed.value())?,
                })))
            }

            "write_post_caption" => {
                let idea: PostIdea =
                    serde_json::from_value(param(input.param_json("idea"))?.clone()).map_err(
                        |e| EngineError::MalformedInput(format!("invalid 'idea' object: {}", e)),
                    )?;
                let reviewed = self.pipeline.write_caption(&idea).await?;
                Ok(ActionOutput::json(json!({
                    "status": reviewed.status(),
                    "caption": reviewed.value(),
                })))
            }

            "create_image_prompts" => {
                let concept = param(input.param_str("concept"))?;
                let caption = param(input.param_str("caption"))?;
                let n = input
                    .param_i64_opt("content_prompts")
                    .map(|n| n.max(1) as usize);
                let reviewed = self
                    .pipeline
                    .create_image_prompts(&concept, &caption, n)
                    .await?;
                Ok(ActionOutput::json(json!({
                    "status": reviewed.status(),
                    "prompts": reviewed.value().as_slice(),
                })))
            }

            "refine_creative_content" => {
                let component = input
                    .param_str_opt("component")
                    .unwrap_or_else(|| "content".to_string());
                let original = param(input.param_str("original"))?;
                let feedback = param(input.param_str("feedback"))?;
                let reviewed = self
                    .pipeline
                    .refine_content(&component, &original, &feedback)
                    .await?;
                Ok(ActionOutput::json(json!({
                    "status": reviewed.status(),
                    "revised": reviewed.value(),
                })))
            }

            "query_session_history" => {
                let query = param(input.param_str("query"))?;
                let session_id = param(input.param_str("session_id"))?;
                let turns = self.sessions.read(&session_id).await?;
                let analyst_input = AnalystInput {
                    query,
                    transcript: render_transcript(&turns),
                };
                let answer = self.analyst.run(&analyst_input, None, None).await?;
                Ok(ActionOutput::json(json!({ "answer": answer })))
            }

            "propose_wildcard_angle" => {
                let pillar = param(input.param_str("pillar"))?;
                let angle = self.pipeline.propose_wildcard_angle(&pillar).await?;
                Ok(ActionOutput::json(json!({ "angle": angle })))
            }

            other => Err(EngineError::UnknownAction(other.to_string())),
        }
    }
}

fn param<T>(result: Result<T, ActionError>) -> Result<T, EngineError> {
    result.map_err(|e| EngineError::MalformedInput(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Database(e.to_string()))
}

fn string_list(input: &ActionInput, key: &str) -> Vec<String> {
    input
        .param_json_opt(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Derive the plan request from action parameters: either `num_posts`, or a
/// `time_frame` of "day" / "week" / "month" with an optional ISO `date`.
fn plan_request_from_params(input: &ActionInput) -> Result<PlanRequest, EngineError> {
    let num_posts = input.param_i64_opt("num_posts");
    let time_frame = input.param_str_opt("time_frame");

    match (num_posts, time_frame) {
        (Some(_), Some(_)) => Err(EngineError::MalformedInput(
            "pass either 'num_posts' or 'time_frame', not both".to_string(),
        )),
        (Some(n), None) => {
            if n < 1 {
                return Err(EngineError::MalformedInput(
                    "'num_posts' must be at least 1".to_string(),
                ));
            }
            Ok(PlanRequest::Count { posts: n as usize })
        }
        (None, Some(frame)) => {
            let date = match input.param_str_opt("date") {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                    EngineError::MalformedInput(format!("invalid 'date': {}", raw))
                })?,
                None => chrono::Utc::now().date_naive(),
            };
            match frame.as_str() {
                "day" => Ok(PlanRequest::SingleDay { date }),
                "week" => Ok(PlanRequest::Week { start: date }),
                "month" => Ok(PlanRequest::Month { start: date }),
                other => Err(EngineError::MalformedInput(format!(
                    "unknown time frame '{}'; expected day, week, or month",
                    other
                ))),
            }
        }
        (None, None) => Err(EngineError::MalformedInput(
            "one of 'num_posts' or 'time_frame' is required".to_string(),
        )),
    }
}

fn build_specs() -> Vec<ActionSpec> {
    vec![
        ActionSpec {
            name: "query_brand_voice".to_string(),
            description: "Semantic search over historical posts for content relevant to a query"
                .to_string(),
            parameters: json!({
                "query_text": {"type": "string", "required": true},
                "n_results": {"type": "integer", "required": false}
            }),
            returns: json!({"type": "array", "items": "content record"}),
        },
        ActionSpec {
            name: "get_specialized_context".to_string(),
            description:
                "Fetch focused, topic-specific caption examples for a creative task"
                    .to_string(),
            parameters: json!({
                "context_type": {"type": "string", "required": true},
                "query": {"type": "string", "required": true},
                "num_samples": {"type": "integer", "required": false}
            }),
            returns: json!({"type": "array", "items": "string"}),
        },
        ActionSpec {
            name: "build_brand_context".to_string(),
            description:
                "Assemble the brand context (voice report plus representative samples) \
                 required before creative work"
                    .to_string(),
            parameters: json!({
                "sample_size": {"type": "integer", "required": false}
            }),
            returns: json!({"type": "object", "shape": "brand context"}),
        },
        ActionSpec {
            name: "propose_content_plan".to_string(),
            description: "Generate a strategic content plan for a post count or time frame"
                .to_string(),
            parameters: json!({
                "num_posts": {"type": "integer", "required": false},
                "time_frame": {"type": "string", "enum": ["day", "week", "month"], "required": false},
                "date": {"type": "string", "format": "YYYY-MM-DD", "required": false},
                "recent_themes": {"type": "array", "items": "string", "required": false}
            }),
            returns: json!({"type": "object", "shape": "{status, plan}"}),
        },
        ActionSpec {
            name: "generate_brand_voice_report".to_string(),
            description: "Analyze recent posts and produce the brand voice report".to_string(),
            parameters: json!({
                "sample_size": {"type": "integer", "required": false}
            }),
            returns: json!({"type": "object", "shape": "{report, markdown}"}),
        },
        ActionSpec {
            name: "generate_creative_ideas".to_string(),
            description: "Brainstorm on-brand post ideas for a content pillar".to_string(),
            parameters: json!({
                "pillar": {"type": "string", "required": true},
                "count": {"type": "integer", "required": false},
                "reasoning": {"type": "string", "required": false},
                "wildcard_angle": {"type": "string", "required": false}
            }),
            returns: json!({"type": "object", "shape": "{status, ideas}"}),
        },
        ActionSpec {
            name: "write_post_caption".to_string(),
            description: "Write the caption for a post idea. Pass the full idea object \
                          from generate_creative_ideas, not a summary of it"
                .to_string(),
            parameters: json!({
                "idea": {"type": "object", "shape": "post idea", "required": true}
            }),
            returns: json!({"type": "object", "shape": "{status, caption}"}),
        },
        ActionSpec {
            name: "create_image_prompts".to_string(),
            description:
                "Translate a post concept and caption into image generation prompts; \
                 the final prompt is always the call-to-action slide"
                    .to_string(),
            parameters: json!({
                "concept": {"type": "string", "required": true},
                "caption": {"type": "string", "required": true},
                "content_prompts": {"type": "integer", "required": false}
            }),
            returns: json!({"type": "object", "shape": "{status, prompts}"}),
        },
        ActionSpec {
            name: "refine_creative_content".to_string(),
            description: "Revise existing content against user feedback".to_string(),
            parameters: json!({
                "component": {"type": "string", "required": false},
                "original": {"type": "string", "required": true},
                "feedback": {"type": "string", "required": true}
            }),
            returns: json!({"type": "object", "shape": "{status, revised}"}),
        },
        ActionSpec {
            name: "query_session_history".to_string(),
            description:
                "Answer a question about earlier turns of the conversation from the \
                 stored transcript"
                    .to_string(),
            parameters: json!({
                "query": {"type": "string", "required": true}
            }),
            returns: json!({"type": "object", "shape": "{answer}"}),
        },
        ActionSpec {
            name: "propose_wildcard_angle".to_string(),
            description:
                "Generate an unconventional creative angle for a pillar to diversify \
                 ideation"
                    .to_string(),
            parameters: json!({
                "pillar": {"type": "string", "required": true}
            }),
            returns: json!({"type": "object", "shape": "{angle}"}),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrandConfig, PipelineConfig};
    use crate::db::Database;
    use crate::llm::EmbeddingClient;
    use crate::stages::test_support::ScriptedClient;
    use crate::store::tests::{record, StubEmbedder};
    use crate::store::ContextStore;
    use tempfile::TempDir;

    const REPORT_JSON: &str = r#"{
        "executive_summary": "Practical warmth.",
        "pillars": [{"name": "Pricing", "description": "Price with confidence"}],
        "audience_persona": "Makers",
        "tone_analysis": "Friendly",
        "language_style": "Colloquial",
        "locale_notes": "English",
        "hashtag_strategy": "Community tags"
    }"#;

    async fn registry(
        responses: Vec<&str>,
    ) -> (ToolRegistry, Arc<ScriptedClient>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let store = Arc::new(ContextStore::new(
            db.pool().clone(),
            Arc::new(StubEmbedder),
        ));

        for (id, caption, epoch) in [
            ("p1", "pricing a custom order", 300),
            ("p2", "humor in the studio", 200),
        ] {
            let rec = record(id, caption, epoch);
            let embedding = StubEmbedder.embed(caption).await.unwrap();
            store.add(&rec, &embedding).await.unwrap();
        }

        let client = Arc::new(ScriptedClient::new(responses));
        let pipeline = Arc::new(PipelineOrchestrator::new(
            client.clone(),
            store,
            BrandConfig::default(),
            PipelineConfig::default(),
            1.1,
        ));
        let sessions = Arc::new(SessionStore::new(db.pool().clone()));
        let registry = ToolRegistry::new(client.clone(), pipeline, sessions, "Muse".to_string());

        (registry, client, dir)
    }

    #[tokio::test]
    async fn test_specs_are_built_at_startup() {
        let (registry, _client, _dir) = registry(vec![]).await;

        assert!(registry.contains("query_brand_voice"));
        assert!(registry.contains("propose_wildcard_angle"));
        assert!(!registry.contains("no_such_action"));
        assert!(ToolRegistry::is_creative("write_post_caption"));
        assert!(!ToolRegistry::is_creative("query_brand_voice"));
    }

    #[tokio::test]
    async fn test_unknown_action_is_typed_error() {
        let (registry, _client, _dir) = registry(vec![]).await;

        let input = ActionInput::new("transmute_lead");
        assert!(matches!(
            registry.dispatch(&input).await,
            Err(EngineError::UnknownAction(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_required_param_is_malformed() {
        let (registry, client, _dir) = registry(vec![]).await;

        let input = ActionInput::new("query_brand_voice");
        assert!(matches!(
            registry.dispatch(&input).await,
            Err(EngineError::MalformedInput(_))
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_query_brand_voice_returns_records() {
        let (registry, _client, _dir) = registry(vec![]).await;

        let input = ActionInput::new("query_brand_voice")
            .with_param("query_text", json!("pricing"))
            .with_param("n_results", json!(1));
        let output = registry.dispatch(&input).await.unwrap();

        assert!(output.success);
        let records = output.data.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0]["caption"].as_str().unwrap().contains("pricing"));
    }

    #[tokio::test]
    async fn test_propose_content_plan_count_mode() {
        let plan_json = r#"{"plan": [
            {"slot": "x", "pillar": "Pricing", "reasoning": "r1"},
            {"slot": "y", "pillar": "Humor", "reasoning": "r2"}
        ]}"#;
        let (registry, _client, _dir) =
            registry(vec![REPORT_JSON, plan_json, r#"{"score": "approved"}"#]).await;

        let input = ActionInput::new("propose_content_plan").with_param("num_posts", json!(2));
        let output = registry.dispatch(&input).await.unwrap();

        assert_eq!(output.data["status"], "approved");
        let items = output.data["plan"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["slot"], "Post 1");
    }

    #[tokio::test]
    async fn test_plan_params_are_mutually_exclusive() {
        let (registry, _client, _dir) = registry(vec![]).await;

        let both = ActionInput::new("propose_content_plan")
            .with_param("num_posts", json!(2))
            .with_param("time_frame", json!("week"));
        assert!(matches!(
            registry.dispatch(&both).await,
            Err(EngineError::MalformedInput(_))
        ));

        let neither = ActionInput::new("propose_content_plan");
        assert!(matches!(
            registry.dispatch(&neither).await,
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_write_post_caption_takes_full_idea_object() {
        let (registry, client, _dir) = registry(vec![
            REPORT_JSON,
            "A caption about mugs.",
            r#"{"score": "approved"}"#,
        ])
        .await;

        let idea = json!({
            "title": "The real cost of a mug",
            "pillar": "Pricing",
            "defense": "Demystifies costs",
            "expected_outcome": "Saves"
        });
        let input = ActionInput::new("write_post_caption").with_param("idea", idea);
        let output = registry.dispatch(&input).await.unwrap();

        assert_eq!(output.data["caption"], "A caption about mugs.");
        // The full idea reached the writer, not a summary
        let writer_input = client.request_inputs()[1].clone();
        assert!(writer_input.contains("The real cost of a mug"));
        assert!(writer_input.contains("Demystifies costs"));
    }

    #[tokio::test]
    async fn test_query_session_history_reads_stored_turns() {
        let (registry, _client, _dir) = registry(vec!["The caption was about mugs."]).await;

        registry
            .sessions
            .append(
                "chat",
                crate::session::SessionTurn::tool(
                    "write_post_caption",
                    "A caption about mugs.",
                    None,
                ),
            )
            .await
            .unwrap();

        let input = ActionInput::new("query_session_history")
            .with_param("query", json!("what was the caption?"))
            .with_param("session_id", json!("chat"));
        let output = registry.dispatch(&input).await.unwrap();

        assert_eq!(output.data["answer"], "The caption was about mugs.");
    }

    #[tokio::test]
    async fn test_plan_request_date_parsing() {
        let input = ActionInput::new("propose_content_plan")
            .with_param("time_frame", json!("day"))
            .with_param("date", json!("2024-06-10"));
        let request = plan_request_from_params(&input).unwrap();
        assert_eq!(
            request,
            PlanRequest::SingleDay {
                date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
            }
        );

        let bad = ActionInput::new("propose_content_plan")
            .with_param("time_frame", json!("fortnight"));
        assert!(plan_request_from_params(&bad).is_err());
    }
}
