//! Verdict types and the classification contract.

use crate::hal::types::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overall judgement for one inspected part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Part is good — route to the pass chute.
    Pass,
    /// Part is defective — route to the fail chute.
    Defect,
}

impl Classification {
    /// Waypoint name prefix for the target drop zone.
    pub const fn waypoint_prefix(&self) -> &'static str {
        match self {
            Classification::Pass => "pass",
            Classification::Defect => "fail",
        }
    }
}

/// Defect categories the classifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// Solder short between nets.
    Short,
    /// Broken trace or open joint.
    Open,
    /// Solder bridge across pads.
    Bridge,
    /// Component absent from its footprint.
    MissingComponent,
}

/// Result of classifying one frame.
///
/// Produced once per detected part and consumed exactly once by the
/// sorting sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Pass/defect judgement.
    pub classification: Classification,
    /// Defect category, when the judgement is `Defect`.
    pub defect_kind: Option<DefectKind>,
    /// Classifier confidence in `0.0..=1.0`.
    pub confidence: f64,
}

impl Verdict {
    /// A passing verdict with the given confidence.
    pub fn pass(confidence: f64) -> Self {
        Self {
            classification: Classification::Pass,
            defect_kind: None,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// A defect verdict with the given kind and confidence.
    pub fn defect(kind: DefectKind, confidence: f64) -> Self {
        Self {
            classification: Classification::Defect,
            defect_kind: Some(kind),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Error types for classification.
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    /// The provider failed to produce a verdict
    #[error("classifier failure: {0}")]
    Provider(String),

    /// The provider did not answer within its time bound
    #[error("classifier timed out after {0:.1}s")]
    Timeout(f64),
}

/// Contract for the image classifier.
///
/// The model behind this trait is a black box to the control core.
/// It must return within a bounded time; any failure is treated as
/// "no verdict" and the part passes through unsorted — the core never
/// guesses a verdict.
pub trait ClassificationProvider: Send + Sync {
    /// Classify one frame into a verdict.
    fn classify(&self, frame: &Frame) -> Result<Verdict, ClassifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_constructors_clamp_confidence() {
        assert_eq!(Verdict::pass(1.7).confidence, 1.0);
        assert_eq!(Verdict::defect(DefectKind::Short, -0.2).confidence, 0.0);
    }

    #[test]
    fn waypoint_prefix_per_classification() {
        assert_eq!(Classification::Pass.waypoint_prefix(), "pass");
        assert_eq!(Classification::Defect.waypoint_prefix(), "fail");
    }

    #[test]
    fn classification_serde_lowercase() {
        let json = serde_json::to_string(&Classification::Pass).unwrap();
        assert_eq!(json, "\"pass\"");
        let kind = serde_json::to_string(&DefectKind::MissingComponent).unwrap();
        assert_eq!(kind, "\"missing_component\"");
    }
}
