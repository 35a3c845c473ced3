//! Agent Pipeline Orchestrator
//!
//! The stage state machine, immutable per-stage snapshots, stage output
//! contracts, prompt templates and the orchestrator that drives them.

pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod snapshot;
pub mod stages;
pub mod state;

pub use orchestrator::{FailureReport, Orchestrator, PipelineOutcome, PublishedRun, StageObserver, StepOutcome};
pub use snapshot::{PipelineState, StageOutput, StageSnapshot};
pub use stages::{Draft, EditedDraft, Fact, Outline, OutlineSection, ResearchBrief, SeoPackage, StageRules};
pub use state::{PipelineStage, StageEvent};
