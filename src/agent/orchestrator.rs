//! Pipeline orchestrator
//!
//! Runs one generation request through the stage machine:
//! - retrieval under a shared read lock on the store
//! - each generative stage in order, with bounded corrective retries
//! - editorial review of the edited draft, sending EDIT back with feedback
//!   for a bounded number of rounds
//! - post validation, then a collision-safe publish
//!
//! Stage outputs are appended to an immutable `PipelineState`, which also
//! makes single-stage replay a matter of restoring an earlier prefix.

use super::prompts;
use super::snapshot::{PipelineState, StageOutput, StageSnapshot};
use super::stages::{Draft, EditedDraft, Outline, ResearchBrief, ReviewVerdict, SeoPackage, StageRules};
use super::state::{PipelineStage, StageEvent};
use crate::config::{ForgeConfig, GenerationConfig, SeoConfig};
use crate::context::Prompt;
use crate::embedding::Embedder;
use crate::errors::{ForgeError, Result};
use crate::gateway::{GenerationParams, LlmGateway};
use crate::publish::{PostValidator, Publisher, ValidationReport};
use crate::rag::{QueryExpander, RetrievalEngine};
use crate::store::SharedStore;
use crate::types::{GeneratedPost, GenerationRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output tokens reserved for the JSON stages
const STRUCTURED_OUTPUT_TOKENS: usize = 2048;

/// Called with each stage and attempt number as it starts
pub type StageObserver = Arc<dyn Fn(PipelineStage, u32) + Send + Sync>;

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub stage: PipelineStage,
    pub attempts: u32,
    /// Machine-readable reason, e.g. `word_count_below_minimum`
    pub reason: String,
    pub last_error: String,
    /// Everything completed before the failing stage
    pub state: PipelineState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRun {
    pub post: GeneratedPost,
    /// `None` for dry runs
    pub path: Option<PathBuf>,
    pub report: ValidationReport,
    pub state: PipelineState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Published(Box<PublishedRun>),
    Failed(Box<FailureReport>),
}

impl PipelineOutcome {
    pub fn terminal_stage(&self) -> PipelineStage {
        match self {
            PipelineOutcome::Published(_) => PipelineStage::Published,
            PipelineOutcome::Failed(_) => PipelineStage::Failed,
        }
    }

    pub fn published(&self) -> Option<&PublishedRun> {
        match self {
            PipelineOutcome::Published(run) => Some(run),
            PipelineOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            PipelineOutcome::Failed(report) => Some(report),
            PipelineOutcome::Published(_) => None,
        }
    }
}

/// Result of running a single stage
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced(PipelineState),
    Failed(Box<FailureReport>),
}

pub struct Orchestrator {
    gateway: LlmGateway,
    retrieval: RetrievalEngine,
    store: SharedStore,
    publisher: Publisher,
    generation: GenerationConfig,
    seo: SeoConfig,
    dry_run: bool,
    observer: Option<StageObserver>,
}

impl Orchestrator {
    pub fn new(
        gateway: LlmGateway,
        retrieval: RetrievalEngine,
        store: SharedStore,
        publisher: Publisher,
        generation: GenerationConfig,
        seo: SeoConfig,
    ) -> Self {
        Self {
            gateway,
            retrieval,
            store,
            publisher,
            generation,
            seo,
            dry_run: false,
            observer: None,
        }
    }

    /// Wire retrieval and publishing from configuration around a gateway
    pub fn from_config(
        config: &ForgeConfig,
        gateway: LlmGateway,
        embedder: Arc<dyn Embedder>,
        store: SharedStore,
    ) -> Result<Self> {
        let expander = QueryExpander::new(
            gateway.clone(),
            config.retrieval.expansions,
            config.retrieval.expansion_temperature,
        )?;
        let retrieval = RetrievalEngine::new(embedder, expander, &config.retrieval);
        Ok(Self::new(
            gateway,
            retrieval,
            store,
            Publisher::from_config(config),
            config.generation.clone(),
            config.seo.clone(),
        ))
    }

    /// Validate but do not write the post
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Run a request from retrieval to a terminal stage. Fatal errors are
    /// returned as `Err`; exhausted stages end in `PipelineOutcome::Failed`.
    pub async fn run(&self, request: GenerationRequest) -> Result<PipelineOutcome> {
        info!(topic = %request.topic(), model = %self.gateway.model(), "Generation started");

        // held for the whole run so ingestion cannot mutate the store mid-request
        let guard = self.store.read().await;
        let context = self.retrieval.retrieve_for(&**guard, &request).await?;

        let outcome = self.resume(PipelineState::new(request, context)).await;
        drop(guard);
        outcome
    }

    /// Run the remaining stages of `state`, then validate and publish
    pub async fn resume(&self, mut state: PipelineState) -> Result<PipelineOutcome> {
        while !state.is_complete() {
            let stage = state.next_stage();
            match self.run_step(&state, stage).await? {
                StepOutcome::Advanced(next) => state = next,
                StepOutcome::Failed(report) => return Ok(terminate(report)),
            }
        }
        self.finish(state)
    }

    /// Restore the state preceding `stage` and rerun only that stage. Later
    /// outputs are discarded; `resume` recomputes them.
    pub async fn replay_stage(&self, state: &PipelineState, stage: PipelineStage) -> Result<StepOutcome> {
        let restored = state.truncate_before(stage)?;
        info!(stage = %stage, discarded = state.len() - restored.len(), "Replaying stage");
        self.run_step(&restored, stage).await
    }

    /// One stage; EDIT additionally goes through editorial review
    async fn run_step(&self, state: &PipelineState, stage: PipelineStage) -> Result<StepOutcome> {
        match self.run_stage(state, stage, None).await? {
            StepOutcome::Advanced(next) if stage == PipelineStage::Edit && self.generation.review_rounds > 0 => {
                self.review_edit(next).await
            }
            outcome => Ok(outcome),
        }
    }

    /// Review the edited draft; each rejection with rounds left replays EDIT
    /// with the feedback. When rounds run out, or a revision breaks its own
    /// contract, the last edit that passed its contract is kept.
    async fn review_edit(&self, mut state: PipelineState) -> Result<StepOutcome> {
        let rounds = self.generation.review_rounds;
        let mut history: Vec<ReviewVerdict> = Vec::new();

        for round in 1..=rounds {
            let edited = state.edited().ok_or_else(|| missing(PipelineStage::Edit))?;
            let prompt = prompts::review(state.request(), edited, &self.rules(state.request()));
            let params = GenerationParams::new(self.generation.temperatures.review, STRUCTURED_OUTPUT_TOKENS);

            let verdict = match self.gateway.generate(prompt, params).await {
                Ok(raw) => ReviewVerdict::parse(&raw),
                Err(e @ ForgeError::RetriesExhausted { .. }) => {
                    warn!(round, error = %e, "Review retries exhausted");
                    let before = state.truncate_before(PipelineStage::Edit)?;
                    return Ok(self.fail(&before, PipelineStage::Edit, round, &e));
                }
                Err(e) => return Err(e),
            };
            history.push(verdict.clone());
            state = state.with_reviews(history.clone())?;

            if verdict.approved {
                info!(round, "Edited draft approved");
                return Ok(StepOutcome::Advanced(state));
            }
            warn!(round, rounds, feedback = %verdict.feedback, "Edited draft rejected");
            if round == rounds {
                warn!(rounds, "Review rounds exhausted, keeping the last edit");
                break;
            }

            let before = state.truncate_before(PipelineStage::Edit)?;
            match self.run_stage(&before, PipelineStage::Edit, Some(&verdict)).await? {
                StepOutcome::Advanced(revised) => state = revised.with_reviews(history.clone())?,
                StepOutcome::Failed(report) => {
                    warn!(reason = %report.reason, "Revision rejected, keeping the previous edit");
                    break;
                }
            }
        }
        Ok(StepOutcome::Advanced(state))
    }

    async fn run_stage(
        &self,
        state: &PipelineState,
        stage: PipelineStage,
        feedback: Option<&ReviewVerdict>,
    ) -> Result<StepOutcome> {
        let rules = self.rules(state.request());
        let (mut base_prompt, params) = self.stage_prompt(state, stage, &rules)?;
        if let Some(verdict) = feedback {
            debug!(stage = %stage, "Applying review feedback");
            base_prompt = prompts::with_review_feedback(base_prompt, verdict);
        }
        let max_attempts = self.generation.max_stage_attempts.max(1);
        let mut last_error: Option<ForgeError> = None;

        for attempt in 1..=max_attempts {
            if let Some(observer) = &self.observer {
                observer(stage, attempt);
            }
            info!(stage = %stage, attempt, "Stage started");

            let prompt = match &last_error {
                Some(err) => prompts::with_correction(base_prompt.clone(), err),
                None => base_prompt.clone(),
            };

            let raw = match self.gateway.generate(prompt, params).await {
                Ok(raw) => raw,
                Err(e @ ForgeError::RetriesExhausted { .. }) => {
                    warn!(stage = %stage, attempt, error = %e, "Gateway retries exhausted");
                    return Ok(self.fail(state, stage, attempt, &e));
                }
                Err(e) => return Err(e),
            };

            match parse_stage(stage, &raw, state, &rules) {
                Ok(output) => {
                    info!(stage = %stage, attempts = attempt, "Stage completed");
                    let next = state.with_snapshot(StageSnapshot::new(output, attempt))?;
                    return Ok(StepOutcome::Advanced(next));
                }
                Err(e @ ForgeError::Validation { .. }) => {
                    warn!(stage = %stage, attempt, code = %e.reason_code(), error = %e, "Stage output rejected");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_error.unwrap_or_else(|| ForgeError::validation("no_attempts", "stage never ran"));
        Ok(self.fail(state, stage, max_attempts, &err))
    }

    fn fail(&self, state: &PipelineState, stage: PipelineStage, attempts: u32, err: &ForgeError) -> StepOutcome {
        StepOutcome::Failed(failure_report(state, stage, attempts, err))
    }

    /// VALIDATE: assemble the post, check it, then publish unless dry run
    fn finish(&self, state: PipelineState) -> Result<PipelineOutcome> {
        if let Some(observer) = &self.observer {
            observer(PipelineStage::Validate, 1);
        }
        let request = state.request();
        let rules = self.rules(request);
        let taken = self.publisher.existing_slugs()?;
        let post = self.assemble_post(&state, &taken)?;

        let validator = PostValidator::new(rules.word_bounds, &self.seo, self.generation.keyword_density_target)?;
        let report = validator.validate(&post, request.keywords(), &taken);
        for warning in &report.warnings {
            warn!(code = %warning.code, detail = %warning.detail, "Validation warning");
        }

        if let Some(err) = report.first_error() {
            return Ok(terminate(failure_report(&state, PipelineStage::Validate, 1, &err)));
        }

        if self.dry_run {
            info!(slug = %post.slug, words = post.word_count(), "Dry run, post not written");
            return Ok(PipelineOutcome::Published(Box::new(PublishedRun {
                post,
                path: None,
                report,
                state,
            })));
        }

        let published = self.publisher.publish(post)?;
        Ok(PipelineOutcome::Published(Box::new(PublishedRun {
            post: published.post,
            path: Some(published.path),
            report,
            state,
        })))
    }

    /// The post a complete state describes, with a slug not in `taken`
    pub fn assemble_post(
        &self,
        state: &PipelineState,
        taken: &std::collections::BTreeSet<String>,
    ) -> Result<GeneratedPost> {
        let seo = state.seo().ok_or_else(|| missing(PipelineStage::Seo))?;
        let edited = state.edited().ok_or_else(|| missing(PipelineStage::Edit))?;
        let request = state.request();

        Ok(GeneratedPost {
            title: seo.title.clone(),
            date: request.requested_at(),
            categories: merge_labels(request.categories(), &seo.categories),
            tags: merge_labels(request.tags(), &seo.tags),
            excerpt: seo.excerpt.clone(),
            slug: crate::publish::unique_slug(&seo.slug, taken),
            body: edited.body.clone(),
        })
    }

    fn rules(&self, request: &GenerationRequest) -> StageRules {
        StageRules::from_parts(request.word_bounds(&self.generation), &self.seo)
    }

    fn stage_prompt(
        &self,
        state: &PipelineState,
        stage: PipelineStage,
        rules: &StageRules,
    ) -> Result<(Prompt, GenerationParams)> {
        let request = state.request();
        let context = state.context();
        let temps = &self.generation.temperatures;
        let long_form = self.generation.max_output_tokens;

        let built = match stage {
            PipelineStage::Research => (
                prompts::research(request, context),
                GenerationParams::new(temps.research, STRUCTURED_OUTPUT_TOKENS),
            ),
            PipelineStage::Outline => {
                let brief = state.research().ok_or_else(|| missing(PipelineStage::Research))?;
                (
                    prompts::outline(request, brief, rules),
                    GenerationParams::new(temps.outline, STRUCTURED_OUTPUT_TOKENS),
                )
            }
            PipelineStage::Write => {
                let outline = state.outline().ok_or_else(|| missing(PipelineStage::Outline))?;
                (
                    prompts::write(request, outline, context, rules, self.generation.keyword_density_target),
                    GenerationParams::new(temps.write, long_form),
                )
            }
            PipelineStage::Edit => {
                let draft = state.draft().ok_or_else(|| missing(PipelineStage::Write))?;
                (prompts::edit(request, draft, rules), GenerationParams::new(temps.edit, long_form))
            }
            PipelineStage::Seo => {
                let edited = state.edited().ok_or_else(|| missing(PipelineStage::Edit))?;
                (
                    prompts::seo(request, edited, context, rules),
                    GenerationParams::new(temps.seo, STRUCTURED_OUTPUT_TOKENS),
                )
            }
            other => {
                return Err(ForgeError::InvalidTransition {
                    from: other.to_string(),
                    event: "generate".to_string(),
                })
            }
        };
        Ok(built)
    }
}

fn parse_stage(stage: PipelineStage, raw: &str, state: &PipelineState, rules: &StageRules) -> Result<StageOutput> {
    Ok(match stage {
        PipelineStage::Research => StageOutput::Research(ResearchBrief::parse(raw, state.context())?),
        PipelineStage::Outline => StageOutput::Outline(Outline::parse(raw, rules)?),
        PipelineStage::Write => StageOutput::Write(Draft::parse(raw, rules)?),
        PipelineStage::Edit => StageOutput::Edit(EditedDraft::parse(raw, rules)?),
        PipelineStage::Seo => StageOutput::Seo(SeoPackage::parse(raw, rules)?),
        other => {
            return Err(ForgeError::InvalidTransition {
                from: other.to_string(),
                event: "parse".to_string(),
            })
        }
    })
}

fn failure_report(
    state: &PipelineState,
    stage: PipelineStage,
    attempts: u32,
    err: &ForgeError,
) -> Box<FailureReport> {
    Box::new(FailureReport {
        stage,
        attempts,
        reason: err.reason_code(),
        last_error: err.to_string(),
        state: state.clone(),
    })
}

/// End the run in `Failed`
fn terminate(report: Box<FailureReport>) -> PipelineOutcome {
    let terminal = report.stage.transition(StageEvent::Failed).unwrap_or(PipelineStage::Failed);
    warn!(
        stage = %report.stage,
        attempts = report.attempts,
        reason = %report.reason,
        terminal = %terminal,
        "Pipeline failed"
    );
    PipelineOutcome::Failed(report)
}

fn missing(stage: PipelineStage) -> ForgeError {
    ForgeError::InvalidTransition {
        from: stage.to_string(),
        event: "read before it has run".to_string(),
    }
}

/// Request labels first, then generated ones, without case-insensitive
/// duplicates
fn merge_labels(requested: &[String], generated: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for label in requested.iter().chain(generated) {
        let label = label.trim();
        if !label.is_empty() && !merged.iter().any(|m| m.eq_ignore_ascii_case(label)) {
            merged.push(label.to_string());
        }
    }
    merged
}
