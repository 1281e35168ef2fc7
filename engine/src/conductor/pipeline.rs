//! Pipeline Orchestrator
//!
//! Sequences stages into the end-to-end workflows: plan, ideate, draft,
//! art-direct, refine. Every creative workflow assembles the mandatory brand
//! context first and threads it unchanged through the stages it drives.
//! Quality control wraps each creative stage in the bounded evaluation loop;
//! quality defects (theme repetition, missing weekend coverage) are surfaced
//! to the Evaluator as notes, never rejected here.

use crate::config::{BrandConfig, PipelineConfig};
use crate::conductor::context::ContextAssembler;
use crate::conductor::review::{EvaluationLoop, Reviewed};
use crate::conductor::types::{
    ArtifactKind, BrandContext, BrandVoiceReport, ContentPlan, DevelopedPost, ImagePromptSet,
    PlanRequest, PostIdea,
};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::stages::{
    CaptionInput, EvaluatorStage, IdeaInput, IdeatorStage, PlanInput, PlannerStage,
    ReporterStage, ReviseInput, ReviserStage, VisualInput, VisualizerStage, WriterStage,
};
use crate::store::{ContentRecord, ContextStore};
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PipelineOrchestrator {
    client: Arc<dyn GenerationClient>,
    store: Arc<ContextStore>,
    assembler: ContextAssembler,
    planner: PlannerStage,
    ideator: IdeatorStage,
    writer: WriterStage,
    visualizer: VisualizerStage,
    reviser: ReviserStage,
    review: EvaluationLoop,
    brand: BrandConfig,
    settings: PipelineConfig,

    /// Raised sampling temperature for wildcard-angle generation
    wildcard_temperature: f64,
}

impl PipelineOrchestrator {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<ContextStore>,
        brand: BrandConfig,
        settings: PipelineConfig,
        wildcard_temperature: f64,
    ) -> Self {
        let reporter = Arc::new(ReporterStage::new(Arc::clone(&client), brand.clone()));
        let evaluator = Arc::new(EvaluatorStage::new(Arc::clone(&client), brand.clone()));

        Self {
            assembler: ContextAssembler::new(Arc::clone(&store), reporter),
            planner: PlannerStage::new(Arc::clone(&client), brand.clone()),
            ideator: IdeatorStage::new(Arc::clone(&client), brand.clone()),
            writer: WriterStage::new(Arc::clone(&client), brand.clone()),
            visualizer: VisualizerStage::new(Arc::clone(&client), brand.clone()),
            reviser: ReviserStage::new(Arc::clone(&client), brand.clone()),
            review: EvaluationLoop::new(evaluator, settings.max_review_attempts),
            client,
            store,
            brand,
            settings,
            wildcard_temperature,
        }
    }

    /// Assemble the mandatory brand context. `sample_size` defaults to the
    /// configured retrieval size.
    pub async fn build_brand_context(
        &self,
        sample_size: Option<usize>,
    ) -> Result<BrandContext, EngineError> {
        self.assembler
            .build_brand_context(sample_size.unwrap_or(self.settings.sample_size))
            .await
    }

    /// Semantic lookup over the brand memory
    pub async fn query_brand_voice(
        &self,
        query_text: &str,
        n_results: Option<usize>,
    ) -> Result<Vec<ContentRecord>, EngineError> {
        self.store
            .semantic_query(query_text, n_results.unwrap_or(self.settings.context_results))
            .await
    }

    /// Focused, topic-specific caption examples: the narrow lookup path
    /// that is allowed to run on partial context.
    pub async fn specialized_context(
        &self,
        context_type: &str,
        query: &str,
        num_samples: Option<usize>,
    ) -> Result<Vec<String>, EngineError> {
        let specialized_query = format!(
            "Find examples of '{}' related to the topic: '{}'",
            context_type, query
        );
        let records = self
            .store
            .semantic_query(
                &specialized_query,
                num_samples.unwrap_or(self.settings.context_results),
            )
            .await?;
        Ok(records.into_iter().map(|r| r.caption).collect())
    }

    /// Regenerate the brand voice report from a fresh recency sample.
    pub async fn generate_report(
        &self,
        sample_size: Option<usize>,
    ) -> Result<BrandVoiceReport, EngineError> {
        Ok(self.build_brand_context(sample_size).await?.report)
    }

    /// Generate a content plan satisfying the request's cardinality
    /// contract, quality-checked by the Evaluator.
    pub async fn propose_plan(
        &self,
        request: PlanRequest,
        recent_themes: Vec<String>,
    ) -> Result<Reviewed<ContentPlan>, EngineError> {
        let context = self.build_brand_context(None).await?;

        let input = PlanInput {
            request,
            recent_themes: recent_themes.clone(),
        };

        let reviewed = self
            .review
            .evaluate_and_refine(
                &self.planner,
                &input,
                Some(&context),
                ArtifactKind::Plan,
                |plan| plan_quality_notes(plan, request, &recent_themes),
            )
            .await?;

        info!("Content plan generated ({})", reviewed.status());
        Ok(reviewed)
    }

    /// Brainstorm post ideas for a pillar.
    pub async fn generate_ideas(
        &self,
        pillar: &str,
        count: usize,
        plan_reasoning: Option<String>,
        wildcard_angle: Option<String>,
    ) -> Result<Reviewed<Vec<PostIdea>>, EngineError> {
        let context = self.build_brand_context(None).await?;
        self.ideas_with_context(&context, pillar, count, plan_reasoning, wildcard_angle)
            .await
    }

    async fn ideas_with_context(
        &self,
        context: &BrandContext,
        pillar: &str,
        count: usize,
        plan_reasoning: Option<String>,
        wildcard_angle: Option<String>,
    ) -> Result<Reviewed<Vec<PostIdea>>, EngineError> {
        let input = IdeaInput {
            pillar: pillar.to_string(),
            count,
            plan_reasoning,
            wildcard_angle,
        };

        let reviewed = self
            .review
            .evaluate_and_refine(
                &self.ideator,
                &input,
                Some(context),
                ArtifactKind::IdeaSet,
                |_| vec![],
            )
            .await?;

        Ok(reviewed)
    }

    /// Write the caption for an idea.
    pub async fn write_caption(&self, idea: &PostIdea) -> Result<Reviewed<String>, EngineError> {
        let context = self.build_brand_context(None).await?;
        self.caption_with_context(&context, idea).await
    }

    async fn caption_with_context(
        &self,
        context: &BrandContext,
        idea: &PostIdea,
    ) -> Result<Reviewed<String>, EngineError> {
        let input = CaptionInput { idea: idea.clone() };
        let reviewed = self
            .review
            .evaluate_and_refine(
                &self.writer,
                &input,
                Some(context),
                ArtifactKind::Caption,
                |_| vec![],
            )
            .await?;
        Ok(reviewed)
    }

    /// Generate the image-prompt set for a concept and caption.
    pub async fn create_image_prompts(
        &self,
        concept: &str,
        caption: &str,
        content_prompts: Option<usize>,
    ) -> Result<Reviewed<ImagePromptSet>, EngineError> {
        let context = self.build_brand_context(None).await?;
        self.prompts_with_context(&context, concept, caption, content_prompts)
            .await
    }

    async fn prompts_with_context(
        &self,
        context: &BrandContext,
        concept: &str,
        caption: &str,
        content_prompts: Option<usize>,
    ) -> Result<Reviewed<ImagePromptSet>, EngineError> {
        let input = VisualInput {
            concept: concept.to_string(),
            caption: caption.to_string(),
            content_prompts,
        };
        let reviewed = self
            .review
            .evaluate_and_refine(
                &self.visualizer,
                &input,
                Some(context),
                ArtifactKind::ImagePrompts,
                |_| vec![],
            )
            .await?;
        Ok(reviewed)
    }

    /// Develop a full post from a selected idea: caption, then image
    /// prompts, over one shared brand context.
    pub async fn develop_post(
        &self,
        idea: PostIdea,
        content_prompts: Option<usize>,
    ) -> Result<DevelopedPost, EngineError> {
        let context = self.build_brand_context(None).await?;
        self.develop_with_context(&context, idea, content_prompts)
            .await
    }

    async fn develop_with_context(
        &self,
        context: &BrandContext,
        idea: PostIdea,
        content_prompts: Option<usize>,
    ) -> Result<DevelopedPost, EngineError> {
        info!("Developing post for idea: '{}'", idea.title);

        let caption = self.caption_with_context(context, &idea).await?;
        if !caption.is_approved() {
            warn!("Caption for '{}' delivered {}", idea.title, caption.status());
        }
        let caption = caption.into_value();

        let prompts = self
            .prompts_with_context(
                context,
                &idea.title,
                &caption,
                content_prompts.or(Some(self.settings.default_image_prompts)),
            )
            .await?;
        if !prompts.is_approved() {
            warn!(
                "Image prompts for '{}' delivered {}",
                idea.title,
                prompts.status()
            );
        }

        Ok(DevelopedPost {
            idea,
            caption,
            image_prompts: prompts.into_value(),
        })
    }

    /// Autonomously plan a calendar and develop every planned item.
    ///
    /// Items are processed in planned order over one shared context; a
    /// failed item stops advancing that artifact only, and the rest of the
    /// calendar still comes back.
    pub async fn plan_and_develop(
        &self,
        request: PlanRequest,
        recent_themes: Vec<String>,
    ) -> Result<Vec<DevelopedPost>, EngineError> {
        let plan = self.propose_plan(request, recent_themes).await?.into_value();
        let context = self.build_brand_context(None).await?;

        let mut developed = Vec::with_capacity(plan.items.len());
        for item in &plan.items {
            let result = async {
                let ideas = self
                    .ideas_with_context(
                        &context,
                        &item.pillar,
                        1,
                        Some(item.reasoning.clone()),
                        None,
                    )
                    .await?
                    .into_value();

                let idea = ideas.into_iter().next().ok_or_else(|| {
                    EngineError::GenerationFailed(format!(
                        "no idea generated for slot '{}'",
                        item.slot
                    ))
                })?;

                self.develop_with_context(&context, idea, None).await
            }
            .await;

            match result {
                Ok(post) => developed.push(post),
                Err(e) => {
                    warn!("Slot '{}' failed and was skipped: {}", item.slot, e);
                }
            }
        }

        Ok(developed)
    }

    /// Refine an existing piece of content against user feedback.
    pub async fn refine_content(
        &self,
        component: &str,
        original: &str,
        user_feedback: &str,
    ) -> Result<Reviewed<String>, EngineError> {
        let context = self.build_brand_context(None).await?;

        let input = ReviseInput {
            component: component.to_string(),
            original: original.to_string(),
            user_feedback: user_feedback.to_string(),
        };

        let reviewed = self
            .review
            .evaluate_and_refine(
                &self.reviser,
                &input,
                Some(&context),
                ArtifactKind::Revision,
                |_| vec![],
            )
            .await?;

        Ok(reviewed)
    }

    /// Generate an unconventional creative angle for a pillar.
    ///
    /// Chained operation: sample the memory, derive the voice report, then
    /// ask for the angle with the report as grounding, at the higher
    /// wildcard temperature.
    pub async fn propose_wildcard_angle(&self, pillar: &str) -> Result<String, EngineError> {
        if pillar.trim().is_empty() {
            return Err(EngineError::MalformedInput(
                "wildcard angle: pillar is required".to_string(),
            ));
        }

        let context = self.build_brand_context(None).await?;
        let report_json = serde_json::to_string_pretty(&context.report)
            .map_err(|e| EngineError::GenerationFailed(e.to_string()))?;

        let instructions = format!(
            "You are a highly creative, slightly eccentric strategist for '{}'. {}\n\
             Propose a \"wildcard\" angle for a social media post: an unexpected, \
             clever, or metaphorical way to approach the topic that is surprising but still \
             relevant and true to the brand's character described in the report.\n\
             Return only a single sentence describing the angle.",
            self.brand.name, self.brand.summary
        );
        let input = format!(
            "Brand voice report:\n---\n{}\n---\n\nGenerate a new wildcard angle for \
             the pillar: \"{}\".",
            report_json, pillar
        );

        let request =
            GenerationRequest::new(instructions, input).with_temperature(self.wildcard_temperature);
        let angle = self
            .client
            .generate(&request)
            .await
            .map_err(|e| EngineError::GenerationFailed(e.to_string()))?;

        Ok(angle.trim().to_string())
    }
}

/// Quality notes for a candidate plan: theme repetition against recent
/// themes (case-insensitive substring match) and, for weekly plans, missing
/// weekend coverage. Defects, not failures; the Evaluator decides.
fn plan_quality_notes(
    plan: &ContentPlan,
    request: PlanRequest,
    recent_themes: &[String],
) -> Vec<String> {
    let mut notes = Vec::new();

    for item in &plan.items {
        let pillar = item.pillar.to_lowercase();
        for theme in recent_themes {
            let theme_lower = theme.to_lowercase();
            if pillar.contains(&theme_lower) || theme_lower.contains(&pillar) {
                notes.push(format!(
                    "slot '{}' repeats the recent theme '{}'",
                    item.slot, theme
                ));
            }
        }
    }

    if matches!(request, PlanRequest::Week { .. }) {
        let has_weekend = plan.items.iter().any(|item| {
            let slot = item.slot.to_lowercase();
            slot.contains("saturday") || slot.contains("sunday")
        });
        if !has_weekend {
            notes.push("weekly plan covers no weekend day".to_string());
        }
    }

    notes
}

/// Render a brand voice report as a human-readable Markdown document.
/// Layout only; every field is reproduced verbatim.
pub fn render_report_markdown(brand_name: &str, report: &BrandVoiceReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {} Brand Voice Report\n\n", brand_name));
    out.push_str("## 1. Executive Summary\n");
    out.push_str(&format!("{}\n\n", report.executive_summary));

    out.push_str("## 2. Key Content Pillars\n");
    for pillar in &report.pillars {
        out.push_str(&format!("- **{}:** {}\n", pillar.name, pillar.description));
    }
    out.push('\n');

    out.push_str("## 3. Audience Persona\n");
    out.push_str(&format!("{}\n\n", report.audience_persona));

    out.push_str("## 4. Tone of Voice Analysis\n");
    out.push_str(&format!("{}\n\n", report.tone_analysis));

    out.push_str("## 5. Language & Style Details\n");
    out.push_str(&format!("{}\n\n", report.language_style));

    out.push_str("## 6. Locale Notes\n");
    out.push_str(&format!("{}\n\n", report.locale_notes));

    out.push_str("## 7. Hashtag Strategy Summary\n");
    out.push_str(&format!("{}\n", report.hashtag_strategy));

    out.trim_end().to_string()
}
