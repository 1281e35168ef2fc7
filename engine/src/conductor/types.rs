//! Conductor domain types
//!
//! The typed artifacts that flow between stages: plans, ideas, captions,
//! image-prompt sets, evaluation verdicts, and the composite brand context.
//! All of these are transient values: each stage receives an immutable
//! snapshot and returns a new value; nothing here is mutated in place.

use crate::store::ContentRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What kind of plan the caller asked for.
///
/// Cardinality contracts per variant are enforced by the Planner stage:
/// - `Count`: exactly `posts` items labeled "Post 1".."Post N"
/// - `SingleDay`: exactly one item labeled with the weekday name of `date`
/// - `Week`: more than one item across the week
/// - `Month`: themes covering the month, no fixed count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRequest {
    Count { posts: usize },
    SingleDay { date: NaiveDate },
    Week { start: NaiveDate },
    Month { start: NaiveDate },
}

impl PlanRequest {
    /// The date the plan is anchored on, when the variant carries one
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        match self {
            PlanRequest::Count { .. } => None,
            PlanRequest::SingleDay { date } => Some(*date),
            PlanRequest::Week { start } | PlanRequest::Month { start } => Some(*start),
        }
    }
}

/// One slot in a content plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedItem {
    /// Slot label: a weekday name or "Post N"
    pub slot: String,

    /// Strategic content pillar for this slot
    pub pillar: String,

    /// Why this pillar in this slot
    pub reasoning: String,

    /// Sequence position for count-based plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// An ordered content plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPlan {
    pub items: Vec<PlannedItem>,
}

/// A brainstormed post concept
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostIdea {
    /// Catchy title for the idea
    pub title: String,

    /// Strategic pillar the post belongs to
    pub pillar: String,

    /// Creative brief: why this idea is relevant and valuable
    pub defense: String,

    /// Desired outcome (saves, engagement, conversions, ...)
    pub expected_outcome: String,

    /// Suggested format (carousel, reel, single image)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_format: Option<String>,
}

/// Ordered image-generation prompts for one post.
///
/// Invariant: 1..=20 prompts, and the final element is always the
/// call-to-action slide. `new` is the only constructor, so the invariant
/// holds by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImagePromptSet {
    prompts: Vec<String>,
}

/// Upper bound on slides per post, CTA included
pub const MAX_IMAGE_PROMPTS: usize = 20;

impl ImagePromptSet {
    /// Build a set from content prompts plus the CTA slide.
    ///
    /// Content prompts beyond `MAX_IMAGE_PROMPTS - 1` are dropped so the CTA
    /// always fits inside the bound.
    pub fn new(content_prompts: Vec<String>, cta_prompt: String) -> Self {
        let mut prompts: Vec<String> = content_prompts
            .into_iter()
            .take(MAX_IMAGE_PROMPTS - 1)
            .collect();
        prompts.push(cta_prompt);
        Self { prompts }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// The call-to-action slide (always the last element)
    pub fn cta(&self) -> &str {
        self.prompts
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.prompts.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.prompts
    }
}

/// One named content pillar with its description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PillarDetail {
    pub name: String,
    pub description: String,
}

/// Derived, regenerable summary of the brand's voice.
///
/// Recomputed on demand from a sample of records; the samples are the source
/// of truth, the report never is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandVoiceReport {
    pub executive_summary: String,
    pub pillars: Vec<PillarDetail>,
    pub audience_persona: String,
    pub tone_analysis: String,
    pub language_style: String,
    pub locale_notes: String,
    pub hashtag_strategy: String,
}

/// The composite context consumed by every creative stage:
/// the derived report plus the exact sample set it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandContext {
    pub report: BrandVoiceReport,
    pub samples: Vec<ContentRecord>,
}

impl BrandContext {
    /// Render the context into prompt text for a stage input
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();

        out.push_str("Brand Voice Report:\n");
        out.push_str(&format!("- Summary: {}\n", self.report.executive_summary));
        out.push_str("- Content Pillars:\n");
        for pillar in &self.report.pillars {
            out.push_str(&format!("  - {}: {}\n", pillar.name, pillar.description));
        }
        out.push_str(&format!("- Audience: {}\n", self.report.audience_persona));
        out.push_str(&format!("- Tone: {}\n", self.report.tone_analysis));
        out.push_str(&format!(
            "- Language & Style: {}\n",
            self.report.language_style
        ));
        out.push_str(&format!("- Locale: {}\n", self.report.locale_notes));
        out.push_str(&format!(
            "- Hashtag Strategy: {}\n",
            self.report.hashtag_strategy
        ));

        out.push_str("\nRepresentative Posts:\n");
        for sample in &self.samples {
            out.push_str(&format!(
                "- Caption: {}\n  Hashtags: {}\n  Engagement: {} likes, {} comments\n",
                sample.caption,
                sample.hashtags.join(" "),
                sample.likes,
                sample.comments
            ));
        }

        out
    }
}

/// Verdict from the Evaluator stage.
///
/// Transient: produced and consumed within one evaluation-loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationVerdict {
    pub score: VerdictScore,
    pub feedback: String,
}

/// Evaluation outcome for a candidate artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictScore {
    Approved,
    NeedsRevision,
}

/// The kind of artifact under evaluation, named for the Evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Plan,
    IdeaSet,
    Caption,
    ImagePrompts,
    Revision,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Plan => write!(f, "content plan"),
            ArtifactKind::IdeaSet => write!(f, "post idea set"),
            ArtifactKind::Caption => write!(f, "caption"),
            ArtifactKind::ImagePrompts => write!(f, "image prompt set"),
            ArtifactKind::Revision => write!(f, "revised content"),
        }
    }
}

/// A fully developed post: the idea plus every generated artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevelopedPost {
    pub idea: PostIdea,
    pub caption: String,
    pub image_prompts: ImagePromptSet,
}
