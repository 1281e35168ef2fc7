//! Conductor
//!
//! The top-level stage that composes registry actions per user request.
//! It works in two phases: first it states its intent as an ordered list of
//! action invocations, then it executes that list in order, passing one
//! action's verbatim output into another's parameters where the plan says
//! so. The Conductor never authors content itself: every creative artifact
//! comes from a registered action, and the final report reproduces executed
//! outputs verbatim.
//!
//! Streamed chunks and progress events are observability only; the returned
//! report is the single authoritative result.

use crate::conductor::dispatch::ToolRegistry;
use crate::llm::{extract_json, GenerationClient, GenerationRequest};
use crate::session::{BudgetResolution, SessionStore, SessionTurn};
use sdk::errors::EngineError;
use sdk::types::ActionInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress events emitted while a request runs
#[derive(Debug, Clone)]
pub enum ConductorEvent {
    /// The stated plan, before any action runs
    PlanProposed(Vec<PlannedAction>),
    ActionStarted { index: usize, action: String },
    /// Incremental model output (observability only, never parsed)
    Chunk(String),
    ActionFinished { index: usize, action: String },
    Completed,
}

/// Sender half of the progress event channel
pub type EventSender = tokio::sync::mpsc::UnboundedSender<ConductorEvent>;

/// One step of stated intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedAction {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

/// One executed step with its verbatim output
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedAction {
    pub action: String,
    pub params: serde_json::Map<String, Value>,
    pub output: Value,
}

/// The authoritative result of one Conductor run.
///
/// `executed` holds every action's full output; rendering layers may lay
/// them out but never paraphrase them.
#[derive(Debug, Serialize)]
pub struct ConductorReport {
    /// The session the turns were appended to (differs from the requested
    /// id after a `NewSession` budget resolution)
    pub session_id: String,
    pub request: String,
    pub planned: Vec<PlannedAction>,
    pub executed: Vec<ExecutedAction>,
    /// Which action failed and why, when the run stopped early
    pub failure: Option<String>,
}

pub struct Conductor {
    client: Arc<dyn GenerationClient>,
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    token_limit: usize,
}

impl Conductor {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        token_limit: usize,
    ) -> Self {
        Self {
            client,
            registry,
            sessions,
            token_limit,
        }
    }

    /// Handle one user request against a session.
    ///
    /// When the session's stored history exceeds the token budget, the
    /// caller must have supplied a `BudgetResolution`; without one the run
    /// fails with `BudgetExceeded` and nothing is appended or truncated.
    pub async fn run(
        &self,
        session_id: &str,
        request: &str,
        resolution: Option<BudgetResolution>,
        events: Option<EventSender>,
    ) -> Result<ConductorReport, EngineError> {
        let session_id = self.gate_budget(session_id, resolution).await?;

        let history = self.sessions.read(&session_id).await?;
        self.sessions
            .append(&session_id, SessionTurn::user(request))
            .await?;

        let plan = self.plan(request, &history, events.as_ref()).await?;

        emit(&events, ConductorEvent::PlanProposed(plan.clone()));
        self.sessions
            .append(
                &session_id,
                SessionTurn::assistant(format!(
                    "Planned actions: {}",
                    serde_json::to_string(&plan)
                        .map_err(|e| EngineError::GenerationFailed(e.to_string()))?
                )),
            )
            .await?;

        let report = self.execute(&session_id, request, plan, &events).await?;

        emit(&events, ConductorEvent::Completed);
        Ok(report)
    }

    /// Apply the token-budget policy, returning the effective session id.
    async fn gate_budget(
        &self,
        session_id: &str,
        resolution: Option<BudgetResolution>,
    ) -> Result<String, EngineError> {
        let used = self.sessions.token_count(session_id).await?;
        if used <= self.token_limit {
            return Ok(session_id.to_string());
        }

        match resolution {
            None => Err(EngineError::BudgetExceeded {
                used,
                limit: self.token_limit,
            }),
            Some(BudgetResolution::Proceed) => {
                info!(
                    "Session '{}' over budget ({} tokens); proceeding on request",
                    session_id, used
                );
                Ok(session_id.to_string())
            }
            Some(BudgetResolution::ClearAndProceed) => {
                info!("Session '{}' over budget; clearing history", session_id);
                self.sessions.clear(session_id).await?;
                Ok(session_id.to_string())
            }
            Some(BudgetResolution::NewSession(new_id)) => {
                info!(
                    "Session '{}' over budget; continuing in new session '{}'",
                    session_id, new_id
                );
                Ok(new_id)
            }
        }
    }

    /// Produce the stated plan: an ordered list of action invocations.
    async fn plan(
        &self,
        request: &str,
        history: &[SessionTurn],
        events: Option<&EventSender>,
    ) -> Result<Vec<PlannedAction>, EngineError> {
        let instructions = self.planning_instructions();
        let input = format!(
            "Conversation so far:\n{}\nUser request: {}",
            crate::session::render_transcript(history),
            request
        );
        let gen_request = GenerationRequest::new(instructions, input);

        let response = match events {
            Some(events_tx) => {
                let (chunk_tx, mut chunk_rx) =
                    tokio::sync::mpsc::unbounded_channel::<String>();
                let forward = events_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(chunk) = chunk_rx.recv().await {
                        let _ = forward.send(ConductorEvent::Chunk(chunk));
                    }
                });

                let result = self.client.generate_streamed(&gen_request, &chunk_tx).await;
                drop(chunk_tx);
                let _ = forwarder.await;
                result
            }
            None => self.client.generate(&gen_request).await,
        }
        .map_err(|e| EngineError::GenerationFailed(e.to_string()))?;

        let span = extract_json(&response).ok_or_else(|| {
            EngineError::GenerationFailed("conductor: no action plan in model output".to_string())
        })?;
        let plan: Vec<PlannedAction> = serde_json::from_str(span).map_err(|e| {
            EngineError::GenerationFailed(format!("conductor: unparseable action plan: {}", e))
        })?;

        if plan.is_empty() {
            return Err(EngineError::GenerationFailed(
                "conductor: model planned no actions".to_string(),
            ));
        }
        for step in &plan {
            if !self.registry.contains(&step.action) {
                return Err(EngineError::GenerationFailed(format!(
                    "conductor: planned unknown action '{}'",
                    step.action
                )));
            }
        }

        debug!("Conductor planned {} actions", plan.len());
        Ok(plan)
    }

    fn planning_instructions(&self) -> String {
        let specs = serde_json::to_string_pretty(self.registry.specs()).unwrap_or_default();
        format!(
            "You are the conductor of a content studio. You understand the user's \
             request, deconstruct it into a logical sequence of steps, and execute \
             that plan by calling registered actions.\n\
             Rules:\n\
             - Delegate, don't do: never author content yourself; every creative \
             artifact must come from an action.\n\
             - Gather context before creating: schedule 'build_brand_context' (or a \
             context lookup) ahead of creative actions.\n\
             - To pass one action's output into another, use the string \"$step_N\" \
             as a parameter value, optionally with a path into the output, e.g. \
             \"$step_1.ideas.0\". The referenced output is passed whole and \
             unchanged.\n\
             Available actions:\n{}\n\
             Respond with ONLY a JSON array of steps, each {{\"action\": <name>, \
             \"params\": {{...}}}}, in execution order.",
            specs
        )
    }

    /// Execute the plan in order, feeding outputs forward as stated.
    async fn execute(
        &self,
        session_id: &str,
        request: &str,
        plan: Vec<PlannedAction>,
        events: &Option<EventSender>,
    ) -> Result<ConductorReport, EngineError> {
        let mut executed: Vec<ExecutedAction> = Vec::new();
        // Outputs aligned with the stated plan's 1-based numbering, so
        // "$step_N" references stay valid even when a context prologue runs
        let mut planned_outputs: Vec<Option<Value>> = vec![None; plan.len()];
        let mut context_built = false;
        let mut failure: Option<String> = None;

        for (index, step) in plan.iter().enumerate() {
            // Precondition: brand context exists before the first primary
            // creative action, whether or not the plan scheduled it
            if ToolRegistry::is_creative(&step.action) && !context_built {
                debug!("Building brand context ahead of '{}'", step.action);
                match self
                    .registry
                    .dispatch(&ActionInput::new("build_brand_context"))
                    .await
                {
                    Ok(output) => {
                        executed.push(ExecutedAction {
                            action: "build_brand_context".to_string(),
                            params: serde_json::Map::new(),
                            output: output.data,
                        });
                        context_built = true;
                    }
                    Err(e) => {
                        failure = Some(format!("action 'build_brand_context' failed: {}", e));
                        break;
                    }
                }
            }
            if step.action == "build_brand_context" {
                context_built = true;
            }

            emit(
                events,
                ConductorEvent::ActionStarted {
                    index: index + 1,
                    action: step.action.clone(),
                },
            );

            let params = match resolve_params(&step.params, &planned_outputs) {
                Ok(params) => params,
                Err(e) => {
                    failure = Some(format!("action '{}' failed: {}", step.action, e));
                    break;
                }
            };

            let mut input = ActionInput::new(step.action.clone());
            for (key, value) in &params {
                input = input.with_param(key.clone(), value.clone());
            }
            // Session-scoped actions receive the session they run in
            if step.action == "query_session_history" {
                input = input.with_param("session_id", Value::String(session_id.to_string()));
            }

            match self.registry.dispatch(&input).await {
                Ok(output) => {
                    self.sessions
                        .append(
                            session_id,
                            SessionTurn::tool(
                                step.action.clone(),
                                output.data.to_string(),
                                serde_json::to_string(&params).ok(),
                            ),
                        )
                        .await?;

                    planned_outputs[index] = Some(output.data.clone());
                    executed.push(ExecutedAction {
                        action: step.action.clone(),
                        params,
                        output: output.data,
                    });

                    emit(
                        events,
                        ConductorEvent::ActionFinished {
                            index: index + 1,
                            action: step.action.clone(),
                        },
                    );
                }
                Err(e) => {
                    warn!("Action '{}' failed: {}", step.action, e);
                    failure = Some(format!("action '{}' failed: {}", step.action, e));
                    break;
                }
            }
        }

        let summary = match &failure {
            Some(msg) => format!("Stopped: {}", msg),
            None => format!(
                "Executed plan: {}",
                executed
                    .iter()
                    .map(|a| a.action.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            ),
        };
        self.sessions
            .append(session_id, SessionTurn::assistant(summary))
            .await?;

        Ok(ConductorReport {
            session_id: session_id.to_string(),
            request: request.to_string(),
            planned: plan,
            executed,
            failure,
        })
    }
}

fn emit(events: &Option<EventSender>, event: ConductorEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Replace `"$step_N"` (optionally with a dotted path, e.g.
/// `"$step_1.ideas.0"`) with the referenced step's verbatim output.
fn resolve_params(
    params: &serde_json::Map<String, Value>,
    planned_outputs: &[Option<Value>],
) -> Result<serde_json::Map<String, Value>, EngineError> {
    let mut resolved = serde_json::Map::new();
    for (key, value) in params {
        resolved.insert(key.clone(), resolve_value(value, planned_outputs)?);
    }
    Ok(resolved)
}

fn resolve_value(
    value: &Value,
    planned_outputs: &[Option<Value>],
) -> Result<Value, EngineError> {
    match value {
        Value::String(s) if s.starts_with("$step_") => {
            let mut segments = s.trim_start_matches("$step_").split('.');
            let step: usize = segments
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| {
                    EngineError::MalformedInput(format!("invalid step reference '{}'", s))
                })?;

            let output = planned_outputs
                .get(step.checked_sub(1).ok_or_else(|| {
                    EngineError::MalformedInput(format!("invalid step reference '{}'", s))
                })?)
                .and_then(|o| o.as_ref())
                .ok_or_else(|| {
                    EngineError::MalformedInput(format!(
                        "step reference '{}' points at an unexecuted step",
                        s
                    ))
                })?;

            let mut current = output;
            for segment in segments {
                current = match current {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i)),
                    _ => None,
                }
                .ok_or_else(|| {
                    EngineError::MalformedInput(format!(
                        "step reference '{}' has no '{}' in the output",
                        s, segment
                    ))
                })?;
            }

            Ok(current.clone())
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| resolve_value(v, planned_outputs))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, planned_outputs)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}
