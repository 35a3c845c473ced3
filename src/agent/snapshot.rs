//! Pipeline state as an ordered list of immutable stage snapshots
//!
//! A state only grows by appending the next stage's output. Snapshots are
//! shared behind `Arc`, so restoring the prefix before a stage for replay
//! is a cheap clone that can never alter what earlier stages produced.

use super::stages::{Draft, EditedDraft, Outline, ResearchBrief, ReviewVerdict, SeoPackage};
use super::state::PipelineStage;
use crate::errors::{ForgeError, Result};
use crate::rag::RetrievedContext;
use crate::types::GenerationRequest;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "output", rename_all = "lowercase")]
pub enum StageOutput {
    Research(ResearchBrief),
    Outline(Outline),
    Write(Draft),
    Edit(EditedDraft),
    Seo(SeoPackage),
}

impl StageOutput {
    pub fn stage(&self) -> PipelineStage {
        match self {
            StageOutput::Research(_) => PipelineStage::Research,
            StageOutput::Outline(_) => PipelineStage::Outline,
            StageOutput::Write(_) => PipelineStage::Write,
            StageOutput::Edit(_) => PipelineStage::Edit,
            StageOutput::Seo(_) => PipelineStage::Seo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSnapshot {
    pub output: StageOutput,
    /// Attempts the stage needed, corrective retries included
    pub attempts: u32,
    /// Editorial verdicts, oldest first; only EDIT is reviewed
    pub reviews: Vec<ReviewVerdict>,
}

impl StageSnapshot {
    pub fn new(output: StageOutput, attempts: u32) -> Self {
        Self {
            output,
            attempts,
            reviews: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    request: Arc<GenerationRequest>,
    context: Arc<RetrievedContext>,
    snapshots: Vec<Arc<StageSnapshot>>,
}

impl PipelineState {
    pub fn new(request: GenerationRequest, context: RetrievedContext) -> Self {
        Self {
            request: Arc::new(request),
            context: Arc::new(context),
            snapshots: Vec::new(),
        }
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn context(&self) -> &RetrievedContext {
        &self.context
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &StageSnapshot> {
        self.snapshots.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The stage whose output comes next; `Validate` once all are present
    pub fn next_stage(&self) -> PipelineStage {
        PipelineStage::GENERATIVE
            .get(self.snapshots.len())
            .copied()
            .unwrap_or(PipelineStage::Validate)
    }

    pub fn is_complete(&self) -> bool {
        self.snapshots.len() == PipelineStage::GENERATIVE.len()
    }

    /// A new state with `snapshot` appended; it must belong to the next stage
    pub fn with_snapshot(&self, snapshot: StageSnapshot) -> Result<Self> {
        let expected = self.next_stage();
        let got = snapshot.output.stage();
        if got != expected {
            return Err(ForgeError::InvalidTransition {
                from: expected.to_string(),
                event: format!("snapshot for {}", got),
            });
        }
        let mut next = self.clone();
        next.snapshots.push(Arc::new(snapshot));
        Ok(next)
    }

    /// A new state whose latest snapshot carries `reviews`. Only a state
    /// that has just completed EDIT can be reviewed.
    pub fn with_reviews(&self, reviews: Vec<ReviewVerdict>) -> Result<Self> {
        let last = match self.snapshots.last() {
            Some(last) if last.output.stage() == PipelineStage::Edit => last,
            _ => {
                return Err(ForgeError::InvalidTransition {
                    from: self.next_stage().to_string(),
                    event: "review".to_string(),
                })
            }
        };
        let reviewed = StageSnapshot {
            reviews,
            ..last.as_ref().clone()
        };
        let mut next = self.clone();
        next.snapshots.pop();
        next.snapshots.push(Arc::new(reviewed));
        Ok(next)
    }

    /// Verdicts given to the current edited draft and its predecessors
    pub fn reviews(&self) -> &[ReviewVerdict] {
        self.snapshot(PipelineStage::Edit)
            .map(|s| s.reviews.as_slice())
            .unwrap_or_default()
    }

    /// The state exactly as it was before `stage` ran
    pub fn truncate_before(&self, stage: PipelineStage) -> Result<Self> {
        let position = stage.position().ok_or_else(|| ForgeError::InvalidTransition {
            from: stage.to_string(),
            event: "replay".to_string(),
        })?;
        if position > self.snapshots.len() {
            return Err(ForgeError::InvalidTransition {
                from: self.next_stage().to_string(),
                event: format!("replay of {} before it has run", stage),
            });
        }
        let mut restored = self.clone();
        restored.snapshots.truncate(position);
        Ok(restored)
    }

    pub fn snapshot(&self, stage: PipelineStage) -> Option<&StageSnapshot> {
        stage
            .position()
            .and_then(|i| self.snapshots.get(i))
            .map(|s| s.as_ref())
    }

    pub fn research(&self) -> Option<&ResearchBrief> {
        match self.snapshot(PipelineStage::Research).map(|s| &s.output) {
            Some(StageOutput::Research(brief)) => Some(brief),
            _ => None,
        }
    }

    pub fn outline(&self) -> Option<&Outline> {
        match self.snapshot(PipelineStage::Outline).map(|s| &s.output) {
            Some(StageOutput::Outline(outline)) => Some(outline),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&Draft> {
        match self.snapshot(PipelineStage::Write).map(|s| &s.output) {
            Some(StageOutput::Write(draft)) => Some(draft),
            _ => None,
        }
    }

    pub fn edited(&self) -> Option<&EditedDraft> {
        match self.snapshot(PipelineStage::Edit).map(|s| &s.output) {
            Some(StageOutput::Edit(edited)) => Some(edited),
            _ => None,
        }
    }

    pub fn seo(&self) -> Option<&SeoPackage> {
        match self.snapshot(PipelineStage::Seo).map(|s| &s.output) {
            Some(StageOutput::Seo(seo)) => Some(seo),
            _ => None,
        }
    }

    /// True when this state and `other` share the very same snapshot for
    /// `stage`, not merely an equal one
    pub fn shares_snapshot(&self, other: &PipelineState, stage: PipelineStage) -> bool {
        match stage.position() {
            Some(i) => match (self.snapshots.get(i), other.snapshots.get(i)) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::stages::Fact;

    fn brief() -> StageSnapshot {
        StageSnapshot::new(
            StageOutput::Research(ResearchBrief {
                themes: vec!["agents".into()],
                facts: vec![Fact {
                    statement: "s".into(),
                    source: "S1".into(),
                }],
                gaps: vec![],
                focus_areas: vec![],
                sources: vec![],
            }),
            1,
        )
    }

    fn outline() -> StageSnapshot {
        StageSnapshot::new(
            StageOutput::Outline(Outline {
                headline: "h".into(),
                sections: vec![],
                seo_notes: vec![],
            }),
            2,
        )
    }

    fn state() -> PipelineState {
        PipelineState::new(
            GenerationRequest::builder("topic").build(),
            RetrievedContext::empty(100),
        )
    }

    #[test]
    fn test_append_in_order_only() {
        let s = state();
        assert_eq!(s.next_stage(), PipelineStage::Research);
        assert!(s.with_snapshot(outline()).is_err());

        let s = s.with_snapshot(brief()).unwrap().with_snapshot(outline()).unwrap();
        assert_eq!(s.next_stage(), PipelineStage::Write);
        assert_eq!(s.outline().unwrap().headline, "h");
        assert!(s.draft().is_none());
    }

    #[test]
    fn test_appending_leaves_original_untouched() {
        let base = state().with_snapshot(brief()).unwrap();
        let grown = base.with_snapshot(outline()).unwrap();
        assert_eq!(base.len(), 1);
        assert_eq!(grown.len(), 2);
        assert!(base.shares_snapshot(&grown, PipelineStage::Research));
    }

    #[test]
    fn test_truncate_before() {
        let full = state().with_snapshot(brief()).unwrap().with_snapshot(outline()).unwrap();
        let restored = full.truncate_before(PipelineStage::Outline).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.next_stage(), PipelineStage::Outline);
        assert!(restored.shares_snapshot(&full, PipelineStage::Research));

        assert!(full.truncate_before(PipelineStage::Edit).is_err());
        assert!(full.truncate_before(PipelineStage::Validate).is_err());
        assert_eq!(full.truncate_before(PipelineStage::Write).unwrap(), full);
    }

    #[test]
    fn test_reviews_attach_to_the_edit_snapshot() {
        let outlined = state().with_snapshot(brief()).unwrap().with_snapshot(outline()).unwrap();
        assert!(outlined.with_reviews(vec![]).is_err());

        let draft = |text: &str| Draft {
            body: text.into(),
            word_count: 1,
        };
        let edited = outlined
            .with_snapshot(StageSnapshot::new(StageOutput::Write(draft("w")), 1))
            .unwrap()
            .with_snapshot(StageSnapshot::new(
                StageOutput::Edit(EditedDraft {
                    body: "e".into(),
                    word_count: 1,
                }),
                1,
            ))
            .unwrap();
        assert!(edited.reviews().is_empty());

        let verdict = ReviewVerdict {
            approved: true,
            feedback: String::new(),
        };
        let reviewed = edited.with_reviews(vec![verdict.clone()]).unwrap();
        assert_eq!(reviewed.reviews(), &[verdict][..]);
        assert_eq!(reviewed.edited(), edited.edited());
        assert!(reviewed.shares_snapshot(&edited, PipelineStage::Write));
        assert!(edited.reviews().is_empty());
    }
}
