//! Conductor System
//!
//! Orchestrates context assembly, planning, staged generation with bounded
//! quality review, and dynamic action composition per user request.

pub mod context;
pub mod dispatch;
pub mod maestro;
pub mod pipeline;
pub mod review;
pub mod types;

pub use context::ContextAssembler;
pub use dispatch::ToolRegistry;
pub use maestro::{Conductor, ConductorEvent, ConductorReport, EventSender, PlannedAction};
pub use pipeline::PipelineOrchestrator;
pub use review::{EvaluationLoop, Reviewed, DEFAULT_MAX_ATTEMPTS};
pub use types::{
    ArtifactKind, BrandContext, BrandVoiceReport, ContentPlan, DevelopedPost, EvaluationVerdict,
    ImagePromptSet, PlanRequest, PlannedItem, PostIdea, VerdictScore,
};
