//! Command handlers
//!
//! Wires CLI commands onto the registry actions and pipeline workflows, and
//! owns the process-boundary concerns: reading the active-session pointer
//! once per invocation, turning budget overruns into a user choice, and
//! printing executed outputs verbatim.

use crate::cli::SessionAction;
use crate::conductor::types::{PlanRequest, PostIdea};
use crate::conductor::{Conductor, ConductorEvent, PipelineOrchestrator, ToolRegistry};
use crate::config::Config;
use crate::db::Database;
use crate::ingest;
use crate::llm::{EmbeddingClient, GenerationClient, OpenAiClient};
use crate::session::{pointer, render_transcript, BudgetResolution, SessionStore};
use crate::store::ContextStore;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::debug;

/// Fully wired engine for one CLI invocation
pub struct Engine {
    pub config: Config,
    pub client: Arc<OpenAiClient>,
    pub store: Arc<ContextStore>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub sessions: Arc<SessionStore>,
    pub conductor: Conductor,
}

impl Engine {
    /// Construct the engine from configuration. Fails with
    /// `MissingCredentials` before touching the network or the database
    /// when the API key is absent.
    pub async fn init(config: Config) -> Result<Self, EngineError> {
        let api_key = config.api_key()?;
        let client = Arc::new(OpenAiClient::new(config.llm.clone(), api_key));

        let db = Database::new(&config.database_path())
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
        let pool = db.pool().clone();

        let embedder: Arc<dyn EmbeddingClient> = client.clone();
        let store = Arc::new(ContextStore::new(pool.clone(), embedder));

        let generation: Arc<dyn GenerationClient> = client.clone();
        let pipeline = Arc::new(PipelineOrchestrator::new(
            Arc::clone(&generation),
            Arc::clone(&store),
            config.brand.clone(),
            config.pipeline.clone(),
            config.llm.wildcard_temperature,
        ));

        let sessions = Arc::new(SessionStore::new(pool));
        let registry = Arc::new(ToolRegistry::new(
            Arc::clone(&generation),
            Arc::clone(&pipeline),
            Arc::clone(&sessions),
            config.brand.name.clone(),
        ));
        let conductor = Conductor::new(
            generation,
            registry,
            Arc::clone(&sessions),
            config.session.token_limit,
        );

        Ok(Self {
            config,
            client,
            store,
            pipeline,
            sessions,
            conductor,
        })
    }
}

pub async fn handle_ingest(engine: &Engine, file: &std::path::Path) -> Result<()> {
    let added = ingest::ingest_file(&engine.store, engine.client.as_ref(), file).await?;
    println!("Ingested {} posts into the brand memory.", added);
    Ok(())
}

pub async fn handle_ask(engine: &Engine, query: &str, results: usize) -> Result<()> {
    let records = engine
        .pipeline
        .query_brand_voice(query, Some(results))
        .await?;

    if records.is_empty() {
        println!("No relevant content found.");
        return Ok(());
    }

    println!("--- Relevant Brand Content ---");
    for record in records {
        println!("Caption: {}", record.caption);
        println!("Hashtags: {}", record.hashtags.join(" "));
        println!("Likes: {}, Comments: {}", record.likes, record.comments);
        println!("URL: {}", record.url);
        println!("---");
    }
    Ok(())
}

pub async fn handle_report(engine: &Engine, samples: Option<usize>) -> Result<()> {
    let report = engine.pipeline.generate_report(samples).await?;
    let markdown =
        crate::conductor::pipeline::render_report_markdown(&engine.config.brand.name, &report);
    println!("{}", markdown);
    Ok(())
}

/// Resolve the mutually exclusive plan shape flags into a request
pub fn plan_request_from_flags(
    time_frame: Option<&str>,
    num: Option<usize>,
    date: Option<&str>,
) -> Result<PlanRequest> {
    if time_frame.is_some() && num.is_some() {
        bail!("Only one of --for or --num can be used at a time.");
    }

    let anchor = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}'; expected YYYY-MM-DD", raw))?,
        None => chrono::Utc::now().date_naive(),
    };

    match (time_frame, num) {
        (None, Some(n)) => Ok(PlanRequest::Count { posts: n }),
        (Some("day"), None) => Ok(PlanRequest::SingleDay { date: anchor }),
        (Some("week"), None) => Ok(PlanRequest::Week { start: anchor }),
        (Some("month"), None) => Ok(PlanRequest::Month { start: anchor }),
        (Some(other), None) => bail!("Unknown time frame '{}'; expected day, week, or month.", other),
        (None, None) => bail!("One of --for or --num must be provided."),
        // Unreachable: the `time_frame.is_some() && num.is_some()` guard above bails first.
        (Some(_), Some(_)) => unreachable!("both --for and --num handled by earlier guard"),
    }
}

pub async fn handle_plan(
    engine: &Engine,
    time_frame: Option<&str>,
    num: Option<usize>,
    date: Option<&str>,
    avoid_themes: Vec<String>,
) -> Result<()> {
    let request = plan_request_from_flags(time_frame, num, date)?;
    let reviewed = engine.pipeline.propose_plan(request, avoid_themes).await?;

    if !reviewed.is_approved() {
        println!("(quality review: {})", reviewed.status());
    }
    println!("--- Strategic Content Plan ---");
    for item in &reviewed.value().items {
        println!("{}", item.slot);
        println!("  Pillar: {}", item.pillar);
        println!("  Reasoning: {}", item.reasoning);
        println!("---");
    }
    Ok(())
}

pub async fn handle_ideas(
    engine: &Engine,
    pillar: &str,
    num: usize,
    wildcard: bool,
) -> Result<()> {
    let angle = if wildcard {
        let angle = engine.pipeline.propose_wildcard_angle(pillar).await?;
        println!("Wildcard angle: {}\n", angle);
        Some(angle)
    } else {
        None
    };

    let reviewed = engine
        .pipeline
        .generate_ideas(pillar, num, None, angle)
        .await?;

    if !reviewed.is_approved() {
        println!("(quality review: {})", reviewed.status());
    }
    print_ideas(reviewed.value());
    Ok(())
}

fn print_ideas(ideas: &[PostIdea]) {
    println!("--- Generated Ideas ---");
    for (i, idea) in ideas.iter().enumerate() {
        println!("Idea {}:", i + 1);
        println!("  Title: {}", idea.title);
        println!("  Pillar: {}", idea.pillar);
        println!("  Defense: {}", idea.defense);
        println!("  Expected Outcome: {}", idea.expected_outcome);
        if let Some(format) = &idea.suggested_format {
            println!("  Suggested Format: {}", format);
        }
        println!("---");
    }
}

pub async fn handle_develop(
    engine: &Engine,
    title: &str,
    pillar: &str,
    defense: &str,
    outcome: &str,
    num_images: Option<usize>,
) -> Result<()> {
    let idea = PostIdea {
        title: title.to_string(),
        pillar: pillar.to_string(),
        defense: defense.to_string(),
        expected_outcome: outcome.to_string(),
        suggested_format: None,
    };

    let post = engine.pipeline.develop_post(idea, num_images).await?;

    println!("--- Developed Post ---");
    println!("Caption:\n{}\n", post.caption);
    println!("Image Prompts:");
    for (i, prompt) in post.image_prompts.iter().enumerate() {
        println!("  Prompt {}: {}", i + 1, prompt);
    }
    Ok(())
}

pub async fn handle_plan_and_develop(
    engine: &Engine,
    time_frame: Option<&str>,
    num: Option<usize>,
) -> Result<()> {
    let request = plan_request_from_flags(time_frame, num, None)?;
    let developed = engine.pipeline.plan_and_develop(request, vec![]).await?;

    if developed.is_empty() {
        println!("No content was developed.");
        return Ok(());
    }

    println!("--- Developed Content Calendar ---");
    for (i, post) in developed.iter().enumerate() {
        println!("--- Post {}: {} ---", i + 1, post.idea.title);
        println!("Pillar: {}", post.idea.pillar);
        println!("\nCaption:\n{}\n", post.caption);
        println!("Image Prompts:");
        for (j, prompt) in post.image_prompts.iter().enumerate() {
            println!("  Prompt {}: {}", j + 1, prompt);
        }
        println!("\n{}\n", "=".repeat(40));
    }
    Ok(())
}

pub async fn handle_refine(
    engine: &Engine,
    component: &str,
    original: &str,
    feedback: &str,
) -> Result<()> {
    let reviewed = engine
        .pipeline
        .refine_content(component, original, feedback)
        .await?;

    if !reviewed.is_approved() {
        println!("(quality review: {})", reviewed.status());
    }
    println!("--- Revised {} ---", component);
    println!("{}", reviewed.value());
    Ok(())
}

pub async fn handle_wildcard(engine: &Engine, pillar: &str) -> Result<()> {
    let angle = engine.pipeline.propose_wildcard_angle(pillar).await?;
    println!("{}", angle);
    Ok(())
}

fn parse_budget_choice(raw: &str) -> Result<BudgetResolution> {
    match raw {
        "proceed" => Ok(BudgetResolution::Proceed),
        "clear" => Ok(BudgetResolution::ClearAndProceed),
        "new" => Ok(BudgetResolution::NewSession(
            uuid::Uuid::new_v4().to_string(),
        )),
        other => bail!(
            "Unknown --on-budget choice '{}'; expected proceed, clear, or new.",
            other
        ),
    }
}

pub async fn handle_run(
    engine: &Engine,
    request: &str,
    session: Option<String>,
    on_budget: Option<String>,
) -> Result<()> {
    let pointer_path = engine.config.session_pointer_path();
    let session_id = session
        .or_else(|| pointer::read_active(&pointer_path))
        .unwrap_or_else(|| "default".to_string());

    let resolution = on_budget.as_deref().map(parse_budget_choice).transpose()?;

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ConductorEvent::PlanProposed(plan) => {
                    let names: Vec<&str> = plan.iter().map(|s| s.action.as_str()).collect();
                    println!("Plan: {}", names.join(" -> "));
                }
                ConductorEvent::ActionStarted { index, action } => {
                    println!("[{}] {} ...", index, action);
                }
                ConductorEvent::ActionFinished { index, action } => {
                    println!("[{}] {} done", index, action);
                }
                ConductorEvent::Chunk(chunk) => {
                    debug!("stream chunk: {}", chunk);
                }
                ConductorEvent::Completed => {}
            }
        }
    });

    let result = engine
        .conductor
        .run(&session_id, request, resolution, Some(events_tx))
        .await;
    printer.await.ok();

    let report = match result {
        Ok(report) => report,
        Err(EngineError::BudgetExceeded { used, limit }) => {
            println!(
                "Session '{}' holds ~{} tokens, over the {}-token budget.",
                session_id, used, limit
            );
            println!("Choose how to continue and re-run with --on-budget:");
            println!("  --on-budget proceed   keep the full history");
            println!("  --on-budget clear     clear this session's history");
            println!("  --on-budget new       continue in a fresh session");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Record the session the turns actually landed in
    pointer::write_active(&pointer_path, &report.session_id)?;

    println!();
    match &report.failure {
        Some(failure) => println!("Stopped early: {}", failure),
        None => println!("Completed {} actions.", report.executed.len()),
    }
    for action in &report.executed {
        println!("\n=== {} ===", action.action);
        println!("{}", serde_json::to_string_pretty(&action.output)?);
    }
    Ok(())
}

pub async fn handle_session(engine: &Engine, action: &SessionAction) -> Result<()> {
    let pointer_path = engine.config.session_pointer_path();

    match action {
        SessionAction::New { id } => {
            let id = id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            pointer::write_active(&pointer_path, &id)?;
            println!("Active session: {}", id);
        }

        SessionAction::Show => {
            let Some(id) = pointer::read_active(&pointer_path) else {
                println!("No active session.");
                return Ok(());
            };
            let turns = engine.sessions.read(&id).await?;
            let tokens = engine.sessions.token_count(&id).await?;
            println!("Session '{}' ({} turns, ~{} tokens):", id, turns.len(), tokens);
            print!("{}", render_transcript(&turns));
        }

        SessionAction::Clear => {
            let Some(id) = pointer::read_active(&pointer_path) else {
                println!("No active session.");
                return Ok(());
            };
            engine.sessions.clear(&id).await?;
            println!("Cleared session '{}'.", id);
        }

        SessionAction::End => {
            let Some(id) = pointer::read_active(&pointer_path) else {
                println!("No active session.");
                return Ok(());
            };
            engine.sessions.end(&id).await?;
            pointer::clear_active(&pointer_path)?;
            println!("Ended session '{}'. History is retained.", id);
        }

        SessionAction::List => {
            let sessions = engine.sessions.list().await?;
            if sessions.is_empty() {
                println!("No sessions yet.");
                return Ok(());
            }
            let active = pointer::read_active(&pointer_path);
            for summary in sessions {
                let marker = if active.as_deref() == Some(summary.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let status = if summary.ended_at.is_some() {
                    "ended"
                } else {
                    "open"
                };
                println!(
                    "{} {} ({} turns, {})",
                    marker, summary.id, summary.turn_count, status
                );
            }
        }
    }
    Ok(())
}
