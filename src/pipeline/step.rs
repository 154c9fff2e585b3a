//! Step identity, step results, and the final execution summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::agents::AgentResponse;

/// The six stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Step 1: parse the architecture diagram into a component breakdown.
    ImageParsing,
    /// Step 2: score the parsed breakdown (gated).
    ModelEvaluation1,
    /// Step 3: generate the infrastructure code.
    TerraformCreation,
    /// Step 4: score the generated code (gated).
    ModelEvaluation2,
    /// Step 5: execute the generated code (manual pass-through).
    TerraformExecution,
    /// Step 6: deploy and validate the infrastructure (manual pass-through).
    InfrastructureDeployment,
}

impl PipelineStep {
    /// Returns all steps in execution order.
    pub fn all_steps() -> Vec<PipelineStep> {
        vec![
            PipelineStep::ImageParsing,
            PipelineStep::ModelEvaluation1,
            PipelineStep::TerraformCreation,
            PipelineStep::ModelEvaluation2,
            PipelineStep::TerraformExecution,
            PipelineStep::InfrastructureDeployment,
        ]
    }

    /// Returns the 1-based position of this step in the pipeline.
    pub fn number(&self) -> u8 {
        match self {
            PipelineStep::ImageParsing => 1,
            PipelineStep::ModelEvaluation1 => 2,
            PipelineStep::TerraformCreation => 3,
            PipelineStep::ModelEvaluation2 => 4,
            PipelineStep::TerraformExecution => 5,
            PipelineStep::InfrastructureDeployment => 6,
        }
    }

    /// Returns the display name for this step.
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStep::ImageParsing => "Image Parsing",
            PipelineStep::ModelEvaluation1 => "Parsing Evaluation",
            PipelineStep::TerraformCreation => "Terraform Creation",
            PipelineStep::ModelEvaluation2 => "Terraform Evaluation",
            PipelineStep::TerraformExecution => "Terraform Execution",
            PipelineStep::InfrastructureDeployment => "Infrastructure Deployment",
        }
    }

    /// True for the evaluation steps whose score passes through the
    /// threshold gate.
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            PipelineStep::ModelEvaluation1 | PipelineStep::ModelEvaluation2
        )
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Terminal status of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step produced a usable result.
    Success,
    /// The step exhausted its retries or hit an unrecoverable fault.
    Failed,
    /// The step succeeded but its score fell below the threshold.
    ThresholdNotMet,
    /// The step never ran because the pipeline halted earlier.
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::ThresholdNotMet => write!(f, "threshold_not_met"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Normalized outcome of one pipeline step, accumulated across retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The step this result belongs to.
    pub step: PipelineStep,
    /// Terminal status of the step.
    pub status: StepStatus,
    /// The authoritative agent response; `None` only for skipped steps.
    pub response: Option<AgentResponse>,
    /// Number of invocation attempts made (0 for skipped steps).
    pub attempts: u32,
    /// Wall-clock time for the step, including retries and backoff delays.
    pub duration_seconds: f64,
}

impl StepResult {
    /// Creates a successful step result.
    pub fn success(
        step: PipelineStep,
        response: AgentResponse,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            step,
            status: StepStatus::Success,
            response: Some(response),
            attempts,
            duration_seconds: duration.as_secs_f64(),
        }
    }

    /// Creates a failed step result.
    pub fn failed(
        step: PipelineStep,
        response: Option<AgentResponse>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            response,
            attempts,
            duration_seconds: duration.as_secs_f64(),
        }
    }

    /// Creates a result for a step that never ran.
    pub fn skipped(step: PipelineStep) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            response: None,
            attempts: 0,
            duration_seconds: 0.0,
        }
    }

    /// Returns the evaluation score if the underlying response carried one.
    pub fn score(&self) -> Option<f64> {
        self.response.as_ref().and_then(|r| r.score)
    }

    /// True if the step completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Why a run stopped before completing all six steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// A step failed after exhausting its retries or hit a fatal fault.
    StepFailed {
        /// The step that failed.
        step: PipelineStep,
    },
    /// A gated step scored below the configured threshold.
    ThresholdNotMet {
        /// The gated step whose score fell short.
        step: PipelineStep,
        /// The score the evaluator produced.
        score: f64,
    },
    /// Cancellation was requested and observed.
    Cancelled,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::StepFailed { step } => write!(f, "step '{}' failed", step),
            HaltReason::ThresholdNotMet { step, score } => {
                write!(f, "step '{}' scored {:.1} below the threshold", step, score)
            }
            HaltReason::Cancelled => write!(f, "run was cancelled"),
        }
    }
}

/// Final, immutable report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// All step results in pipeline order; halted runs carry the remaining
    /// steps marked as skipped.
    pub steps: Vec<StepResult>,
    /// True when every step completed successfully.
    pub success: bool,
    /// Total wall-clock duration of the run in seconds.
    pub total_duration_seconds: f64,
    /// Threshold the gated steps were held to.
    pub evaluation_threshold: f64,
    /// Why the run halted early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
    /// Timestamp when the run started.
    pub started_at: DateTime<Utc>,
    /// Timestamp when the run finished.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionSummary {
    /// Returns the result for a specific step.
    pub fn step(&self, step: PipelineStep) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Returns the scores recorded by the gated steps, in pipeline order.
    pub fn threshold_scores(&self) -> Vec<(PipelineStep, f64)> {
        self.steps
            .iter()
            .filter(|r| r.step.is_gated())
            .filter_map(|r| r.score().map(|score| (r.step, score)))
            .collect()
    }

    /// Number of steps that completed successfully.
    pub fn successful_steps(&self) -> usize {
        self.steps.iter().filter(|r| r.is_success()).count()
    }

    /// Number of steps that failed or missed their threshold.
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|r| {
                matches!(r.status, StepStatus::Failed | StepStatus::ThresholdNotMet)
            })
            .count()
    }
}

/// Events emitted during a run for UI and monitoring consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum PipelineEvent {
    /// A pipeline step has started.
    StepStarted {
        /// The step that started.
        step: PipelineStep,
        /// Timestamp of the event.
        timestamp: DateTime<Utc>,
    },
    /// A pipeline step has reached a terminal status.
    StepCompleted {
        /// Result of the step.
        result: StepResult,
        /// Timestamp of the event.
        timestamp: DateTime<Utc>,
    },
    /// The run completed all steps.
    RunCompleted {
        /// Final execution summary.
        summary: ExecutionSummary,
    },
    /// The run halted before completing all steps.
    RunHalted {
        /// Why the run stopped.
        reason: HaltReason,
        /// Final execution summary.
        summary: ExecutionSummary,
    },
}

impl PipelineEvent {
    /// Creates a step started event.
    pub fn step_started(step: PipelineStep) -> Self {
        PipelineEvent::StepStarted {
            step,
            timestamp: Utc::now(),
        }
    }

    /// Creates a step completed event.
    pub fn step_completed(result: StepResult) -> Self {
        PipelineEvent::StepCompleted {
            result,
            timestamp: Utc::now(),
        }
    }

    /// Creates a run completed event.
    pub fn run_completed(summary: ExecutionSummary) -> Self {
        PipelineEvent::RunCompleted { summary }
    }

    /// Creates a run halted event.
    pub fn run_halted(reason: HaltReason, summary: ExecutionSummary) -> Self {
        PipelineEvent::RunHalted { reason, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        let steps = PipelineStep::all_steps();
        assert_eq!(steps.len(), 6);
        for (index, step) in steps.iter().enumerate() {
            assert_eq!(step.number() as usize, index + 1);
        }
    }

    #[test]
    fn test_gated_steps() {
        assert!(PipelineStep::ModelEvaluation1.is_gated());
        assert!(PipelineStep::ModelEvaluation2.is_gated());
        assert!(!PipelineStep::ImageParsing.is_gated());
        assert!(!PipelineStep::TerraformCreation.is_gated());
        assert!(!PipelineStep::TerraformExecution.is_gated());
        assert!(!PipelineStep::InfrastructureDeployment.is_gated());
    }

    #[test]
    fn test_step_status_display() {
        assert_eq!(StepStatus::Success.to_string(), "success");
        assert_eq!(StepStatus::Failed.to_string(), "failed");
        assert_eq!(StepStatus::ThresholdNotMet.to_string(), "threshold_not_met");
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_step_result_constructors() {
        let response = AgentResponse::success("ok").with_score(85.0);
        let result = StepResult::success(
            PipelineStep::ModelEvaluation1,
            response,
            2,
            Duration::from_secs(3),
        );
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        assert_eq!(result.score(), Some(85.0));
        assert!((result.duration_seconds - 3.0).abs() < f64::EPSILON);

        let skipped = StepResult::skipped(PipelineStep::TerraformCreation);
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.attempts, 0);
        assert!(skipped.response.is_none());
    }

    #[test]
    fn test_halt_reason_display() {
        let reason = HaltReason::ThresholdNotMet {
            step: PipelineStep::ModelEvaluation1,
            score: 65.0,
        };
        assert!(reason.to_string().contains("65.0"));
        assert!(reason.to_string().contains("Parsing Evaluation"));

        assert!(HaltReason::Cancelled.to_string().contains("cancelled"));
    }

    #[test]
    fn test_summary_threshold_scores() {
        let summary = ExecutionSummary {
            run_id: Uuid::new_v4(),
            steps: vec![
                StepResult::success(
                    PipelineStep::ImageParsing,
                    AgentResponse::success("parsed"),
                    1,
                    Duration::from_secs(1),
                ),
                StepResult::success(
                    PipelineStep::ModelEvaluation1,
                    AgentResponse::success("eval").with_score(87.0),
                    1,
                    Duration::from_secs(1),
                ),
                StepResult::success(
                    PipelineStep::TerraformCreation,
                    AgentResponse::success("code"),
                    1,
                    Duration::from_secs(1),
                ),
                StepResult::success(
                    PipelineStep::ModelEvaluation2,
                    AgentResponse::success("eval").with_score(92.0),
                    1,
                    Duration::from_secs(1),
                ),
            ],
            success: false,
            total_duration_seconds: 4.0,
            evaluation_threshold: 80.0,
            halt_reason: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let scores = summary.threshold_scores();
        assert_eq!(
            scores,
            vec![
                (PipelineStep::ModelEvaluation1, 87.0),
                (PipelineStep::ModelEvaluation2, 92.0),
            ]
        );
        assert_eq!(summary.successful_steps(), 4);
        assert_eq!(summary.failed_steps(), 0);
    }

    #[test]
    fn test_summary_serialization_round_trip() {
        let summary = ExecutionSummary {
            run_id: Uuid::new_v4(),
            steps: vec![StepResult::skipped(PipelineStep::TerraformExecution)],
            success: false,
            total_duration_seconds: 0.5,
            evaluation_threshold: 80.0,
            halt_reason: Some(HaltReason::Cancelled),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let json = serde_json::to_string(&summary).expect("serialization should succeed");
        let parsed: ExecutionSummary =
            serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(parsed.run_id, summary.run_id);
        assert_eq!(parsed.halt_reason, Some(HaltReason::Cancelled));
    }
}
