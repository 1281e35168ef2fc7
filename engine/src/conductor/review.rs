//! Evaluation Loop
//!
//! Wraps a generation stage in a bounded generate/evaluate cycle. The two
//! states strictly alternate; a revision attempt always carries the verdict
//! feedback from the immediately preceding evaluation, never stale feedback.
//!
//! Outcomes distinguish three degraded-success shapes explicitly:
//! an approved candidate, a candidate delivered after retries ran out, and a
//! candidate that was never judged because the Evaluator itself failed. All
//! three deliver usable content; a failed generation aborts the artifact.

use crate::conductor::types::{ArtifactKind, BrandContext, VerdictScore};
use crate::stages::{EvaluationInput, EvaluatorStage, GenerationStage, StageResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default bound on generate/evaluate attempts
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// Outcome of a reviewed generation
#[derive(Debug, Clone, PartialEq)]
pub enum Reviewed<T> {
    /// The Evaluator approved the candidate
    Approved { value: T, attempts: usize },

    /// Retries ran out while the verdict was still needs-revision; the last
    /// generated candidate is delivered as a degraded success
    Exhausted {
        value: T,
        last_feedback: String,
        attempts: usize,
    },

    /// The Evaluator itself failed, so the candidate was never judged
    Unreviewed { value: T },
}

impl<T> Reviewed<T> {
    pub fn value(&self) -> &T {
        match self {
            Reviewed::Approved { value, .. }
            | Reviewed::Exhausted { value, .. }
            | Reviewed::Unreviewed { value } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Reviewed::Approved { value, .. }
            | Reviewed::Exhausted { value, .. }
            | Reviewed::Unreviewed { value } => value,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Reviewed::Approved { .. })
    }

    /// Short status label for logs and reports
    pub fn status(&self) -> &'static str {
        match self {
            Reviewed::Approved { .. } => "approved",
            Reviewed::Exhausted { .. } => "exhausted",
            Reviewed::Unreviewed { .. } => "unreviewed",
        }
    }
}

/// Bounded quality-control cycle around a generation stage
pub struct EvaluationLoop {
    evaluator: Arc<EvaluatorStage>,
    max_attempts: usize,
}

impl EvaluationLoop {
    pub fn new(evaluator: Arc<EvaluatorStage>, max_attempts: usize) -> Self {
        Self {
            evaluator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `stage`, judging each candidate and feeding revision feedback
    /// back until approval or the attempt bound.
    ///
    /// `notes` derives per-candidate quality notes (e.g. detected theme
    /// repetition) that are surfaced to the Evaluator alongside the
    /// candidate. A `GenerationFailed` from the wrapped stage aborts the
    /// loop with an error, fatal for this artifact but not the process.
    pub async fn evaluate_and_refine<S, N>(
        &self,
        stage: &S,
        input: &S::Input,
        context: Option<&BrandContext>,
        artifact: ArtifactKind,
        notes: N,
    ) -> StageResult<Reviewed<S::Output>>
    where
        S: GenerationStage,
        S::Output: Serialize,
        N: Fn(&S::Output) -> Vec<String>,
    {
        let mut feedback: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            debug!(
                "{}: generate attempt {}/{}",
                stage.name(),
                attempt,
                self.max_attempts
            );

            let candidate = stage.run(input, context, feedback.as_deref()).await?;

            let evaluation = EvaluationInput {
                candidate: render_candidate(&candidate),
                artifact,
                notes: notes(&candidate),
            };

            let verdict = match self.evaluator.run(&evaluation, context, None).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        "{}: evaluator failed ({}), delivering unreviewed candidate",
                        stage.name(),
                        e
                    );
                    return Ok(Reviewed::Unreviewed { value: candidate });
                }
            };

            match verdict.score {
                VerdictScore::Approved => {
                    debug!("{}: approved on attempt {}", stage.name(), attempt);
                    return Ok(Reviewed::Approved {
                        value: candidate,
                        attempts: attempt,
                    });
                }
                VerdictScore::NeedsRevision => {
                    if attempt == self.max_attempts {
                        warn!(
                            "{}: attempts exhausted, delivering last candidate",
                            stage.name()
                        );
                        return Ok(Reviewed::Exhausted {
                            value: candidate,
                            last_feedback: verdict.feedback,
                            attempts: attempt,
                        });
                    }
                    debug!("{}: needs revision: {}", stage.name(), verdict.feedback);
                    feedback = Some(verdict.feedback);
                }
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}

/// Serialize a candidate for evaluation. String artifacts are passed as-is;
/// structured artifacts go as pretty JSON.
fn render_candidate<T: Serialize>(candidate: &T) -> String {
    match serde_json::to_value(candidate) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(e) => format!("<unserializable candidate: {}>", e),
    }
}
