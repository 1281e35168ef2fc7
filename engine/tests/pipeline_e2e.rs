//! End-to-end pipeline scenario against a scripted generation service:
//! plan -> context -> ideate, with data fidelity preserved across stages.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use muse_engine::config::{BrandConfig, PipelineConfig};
use muse_engine::conductor::{PipelineOrchestrator, PlanRequest};
use muse_engine::db::Database;
use muse_engine::llm::{
    EmbeddingClient, GenerationClient, GenerationRequest, LlmError,
};
use muse_engine::store::{ContentRecord, ContextStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Generation client that replays a canned script in call order
struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::Timeout)
    }
}

/// Embedder keyed on a single topic axis
struct TopicEmbedder;

#[async_trait]
impl EmbeddingClient for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let pricing = if text.to_lowercase().contains("pricing") {
            1.0
        } else {
            0.0
        };
        Ok(vec![pricing, 0.1])
    }
}

const REPORT_JSON: &str = r#"{
    "executive_summary": "A brand about honest pricing.",
    "pillars": [{"name": "Pricing Confidence", "description": "Price without guilt"}],
    "audience_persona": "Makers",
    "tone_analysis": "Encouraging",
    "language_style": "Plainspoken",
    "locale_notes": "English",
    "hashtag_strategy": "A few community tags"
}"#;

const PLAN_JSON: &str = r#"{"plan": [
    {"slot": "anything", "pillar": "Pricing Confidence", "reasoning": "strongest engagement"}
]}"#;

// Ideas deliberately omit the pillar: the requested pillar is authoritative
const IDEAS_JSON: &str = r#"[
    {"title": "What a fair price really covers",
     "defense": "Shows the hidden costs makers forget",
     "expected_outcome": "High saves"}
]"#;

const APPROVED: &str = r#"{"score": "approved"}"#;

fn pricing_record(id: &str, epoch: i64) -> ContentRecord {
    ContentRecord {
        id: id.to_string(),
        caption: format!("pricing note {}", id),
        hashtags: vec!["#pricing".to_string()],
        timestamp: Utc.timestamp_opt(epoch, 0).single().unwrap(),
        likes: 12,
        comments: 3,
        url: format!("https://example.com/{}", id),
    }
}

#[tokio::test]
async fn plan_context_ideate_preserves_pillar_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("e2e.db")).await.unwrap();
    let store = Arc::new(ContextStore::new(
        db.pool().clone(),
        Arc::new(TopicEmbedder),
    ));

    // Seed the store with 3 records about pricing
    for (id, epoch) in [("r1", 100), ("r2", 200), ("r3", 300)] {
        let record = pricing_record(id, epoch);
        let embedding = TopicEmbedder.embed(&record.caption).await.unwrap();
        store.add(&record, &embedding).await.unwrap();
    }

    let client = Arc::new(ScriptedClient::new(vec![
        // propose_plan: context report, plan, verdict
        REPORT_JSON,
        PLAN_JSON,
        APPROVED,
        // explicit build_brand_context
        REPORT_JSON,
        // generate_ideas: context report, ideas, verdict
        REPORT_JSON,
        IDEAS_JSON,
        APPROVED,
    ]));

    let pipeline = PipelineOrchestrator::new(
        client,
        store,
        BrandConfig::default(),
        PipelineConfig::default(),
        1.1,
    );

    // 1. A one-post plan
    let plan = pipeline
        .propose_plan(PlanRequest::Count { posts: 1 }, vec![])
        .await
        .unwrap()
        .into_value();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].slot, "Post 1");
    let planned_pillar = plan.items[0].pillar.clone();
    assert_eq!(planned_pillar, "Pricing Confidence");

    // 2. Brand context over the seeded records
    let context = pipeline.build_brand_context(Some(3)).await.unwrap();
    assert_eq!(context.samples.len(), 3);
    assert_eq!(context.samples[0].id, "r3");
    assert_eq!(context.report.pillars[0].name, "Pricing Confidence");

    // 3. Ideate on the plan's pillar: the pillar survives verbatim into the
    // resulting idea, never renamed or dropped
    let ideas = pipeline
        .generate_ideas(&planned_pillar, 1, Some(plan.items[0].reasoning.clone()), None)
        .await
        .unwrap()
        .into_value();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].pillar, planned_pillar);
    assert_eq!(ideas[0].title, "What a fair price really covers");
}
