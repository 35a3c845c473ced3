//! Pipeline state machine
//!
//! ```text
//! Research → Outline → Write → Edit → Seo → Validate → Published
//!     └─────────┴────────┴───────┴──────┴──────┴──────→ Failed
//! ```
//!
//! Normal operation only moves forward. Replaying a stage restores the
//! state snapshot preceding it rather than walking an edge backwards.

use crate::errors::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Research,
    Outline,
    Write,
    Edit,
    Seo,
    Validate,
    /// Terminal
    Published,
    /// Terminal
    Failed,
}

/// Events that move the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// The stage produced output that passed its contract
    Completed,
    /// Attempts exhausted or the post failed validation
    Failed,
}

impl PipelineStage {
    /// Stages that call the generator, in execution order
    pub const GENERATIVE: [PipelineStage; 5] = [
        PipelineStage::Research,
        PipelineStage::Outline,
        PipelineStage::Write,
        PipelineStage::Edit,
        PipelineStage::Seo,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Published | PipelineStage::Failed)
    }

    pub fn is_generative(&self) -> bool {
        self.position().is_some()
    }

    /// Index among the generative stages
    pub fn position(&self) -> Option<usize> {
        Self::GENERATIVE.iter().position(|s| s == self)
    }

    /// Valid transitions:
    /// 1. each non-terminal stage → its successor (on Completed)
    /// 2. each non-terminal stage → Failed (on Failed)
    /// 3. terminal stages loop on themselves
    pub fn transition(&self, event: StageEvent) -> Result<PipelineStage> {
        use PipelineStage::*;

        let next = match (self, event) {
            (Research, StageEvent::Completed) => Outline,
            (Outline, StageEvent::Completed) => Write,
            (Write, StageEvent::Completed) => Edit,
            (Edit, StageEvent::Completed) => Seo,
            (Seo, StageEvent::Completed) => Validate,
            (Validate, StageEvent::Completed) => Published,
            (Published, _) => Published,
            (PipelineStage::Failed, _) => PipelineStage::Failed,
            (_, StageEvent::Failed) => PipelineStage::Failed,
        };
        Ok(next)
    }

    /// Like `transition`, but rejects leaving a terminal stage
    pub fn advance(&self, event: StageEvent) -> Result<PipelineStage> {
        if self.is_terminal() {
            return Err(ForgeError::InvalidTransition {
                from: self.to_string(),
                event: format!("{:?}", event),
            });
        }
        self.transition(event)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Research => "research",
            PipelineStage::Outline => "outline",
            PipelineStage::Write => "write",
            PipelineStage::Edit => "edit",
            PipelineStage::Seo => "seo",
            PipelineStage::Validate => "validate",
            PipelineStage::Published => "published",
            PipelineStage::Failed => "failed",
        }
    }

    /// Human-readable stage name
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::Research => "Researching",
            PipelineStage::Outline => "Outlining",
            PipelineStage::Write => "Writing",
            PipelineStage::Edit => "Editing",
            PipelineStage::Seo => "Optimizing for search",
            PipelineStage::Validate => "Validating",
            PipelineStage::Published => "Published",
            PipelineStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "research" => Ok(PipelineStage::Research),
            "outline" => Ok(PipelineStage::Outline),
            "write" => Ok(PipelineStage::Write),
            "edit" => Ok(PipelineStage::Edit),
            "seo" => Ok(PipelineStage::Seo),
            "validate" => Ok(PipelineStage::Validate),
            other => Err(ForgeError::Config(format!("unknown stage '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let mut stage = PipelineStage::Research;
        let mut visited = vec![stage];
        while !stage.is_terminal() {
            stage = stage.advance(StageEvent::Completed).unwrap();
            visited.push(stage);
        }
        assert_eq!(
            visited,
            vec![
                PipelineStage::Research,
                PipelineStage::Outline,
                PipelineStage::Write,
                PipelineStage::Edit,
                PipelineStage::Seo,
                PipelineStage::Validate,
                PipelineStage::Published,
            ]
        );
    }

    #[test]
    fn test_every_live_stage_can_fail() {
        for stage in PipelineStage::GENERATIVE.iter().chain([PipelineStage::Validate].iter()) {
            assert_eq!(stage.advance(StageEvent::Failed).unwrap(), PipelineStage::Failed);
        }
    }

    #[test]
    fn test_terminal_stages() {
        assert!(PipelineStage::Published.is_terminal());
        assert!(PipelineStage::Failed.is_terminal());
        assert_eq!(
            PipelineStage::Failed.transition(StageEvent::Completed).unwrap(),
            PipelineStage::Failed
        );
        assert!(PipelineStage::Published.advance(StageEvent::Completed).is_err());
    }

    #[test]
    fn test_positions_and_parsing() {
        assert_eq!(PipelineStage::Write.position(), Some(2));
        assert!(!PipelineStage::Validate.is_generative());
        assert_eq!("SEO".parse::<PipelineStage>().unwrap(), PipelineStage::Seo);
        assert!("publish".parse::<PipelineStage>().is_err());
        assert_eq!(PipelineStage::Edit.to_string(), "edit");
    }
}
