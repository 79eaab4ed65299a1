//! Threshold-based simulated classifier.
//!
//! Stand-in for the real model behind [`ClassificationProvider`]: it
//! scores each frame pseudo-randomly against the shared detection
//! threshold, passing parts whose score clears it and otherwise
//! picking a defect kind. Useful for commissioning the line and for
//! exercising the full pipeline in tests.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sortline_common::hal::types::Frame;
use sortline_common::inspect::{
    ClassificationProvider, ClassifyError, DefectKind, Verdict,
};
use sortline_common::state::SharedSystemState;

const DEFECT_KINDS: [DefectKind; 4] = [
    DefectKind::Short,
    DefectKind::Open,
    DefectKind::Bridge,
    DefectKind::MissingComponent,
];

/// Pseudo-random classifier reading the live detection threshold.
pub struct SimulatedClassifier {
    state: SharedSystemState,
    rng: Mutex<StdRng>,
}

impl SimulatedClassifier {
    /// Create a classifier bound to the shared system state.
    pub fn new(state: SharedSystemState) -> Self {
        Self {
            state,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(state: SharedSystemState, seed: u64) -> Self {
        Self {
            state,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ClassificationProvider for SimulatedClassifier {
    fn classify(&self, _frame: &Frame) -> Result<Verdict, ClassifyError> {
        let threshold = self.state.threshold();
        let mut rng = self.rng.lock();
        let score: f64 = rng.r#gen();
        if score > threshold {
            Ok(Verdict::pass(score))
        } else {
            let kind = DEFECT_KINDS[rng.gen_range(0..DEFECT_KINDS.len())];
            Ok(Verdict::defect(kind, score))
        }
    }
}
