//! Threshold gate applied to the evaluation steps.
//!
//! The gate is a content-quality check, distinct from the executor's
//! failure retries: a score below the cutoff is terminal and never retried.

use crate::agents::AgentResponse;

/// Outcome of holding an evaluation response against the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Score met or exceeded the threshold; the pipeline continues.
    Pass {
        /// The score the evaluator produced.
        score: f64,
    },
    /// Score fell below the threshold; the pipeline halts.
    Reject {
        /// The score the evaluator produced.
        score: f64,
    },
    /// A successful evaluation response arrived without a score, which the
    /// evaluator contract forbids.
    MissingScore,
}

/// Pass/fail check for evaluation-step scores.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdGate {
    threshold: f64,
}

impl ThresholdGate {
    /// Creates a gate with the given cutoff.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the configured cutoff.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluates a successful evaluation response against the cutoff.
    ///
    /// The comparison is inclusive: a score exactly equal to the threshold
    /// passes.
    pub fn evaluate(&self, response: &AgentResponse) -> GateDecision {
        match response.score {
            Some(score) if score >= self.threshold => GateDecision::Pass { score },
            Some(score) => GateDecision::Reject { score },
            None => GateDecision::MissingScore,
        }
    }
}
