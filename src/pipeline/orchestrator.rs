//! Orchestrator: sequences the six-step pipeline and owns the run state.
//!
//! One orchestrator instance serves one run at a time and owns its
//! `PipelineContext`; concurrent runs each get their own instance, so no
//! orchestration state is shared across runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{AgentResponse, DiagramSource, StepAgent, StepInput};

use super::config::{ConfigError, OrchestratorConfig};
use super::context::PipelineContext;
use super::executor::{StepExecutor, StepOutcome};
use super::gate::{GateDecision, ThresholdGate};
use super::step::{
    ExecutionSummary, HaltReason, PipelineEvent, PipelineStep, StepResult, StepStatus,
};

/// Setup errors surfaced by the orchestrator's public operations.
///
/// Everything that can go wrong mid-run is absorbed into the execution
/// summary instead; only configuration and wiring problems reach the caller
/// as errors, and they always do so before any step executes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A pipeline step has no bound agent.
    #[error("No agent bound for step '{0}'")]
    MissingAgent(PipelineStep),

    /// A run was requested before `initialize_agents` succeeded.
    #[error("Agents have not been initialized")]
    NotInitialized,
}

/// Lifecycle of one orchestrator instance.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// No run has started yet.
    NotStarted,
    /// A run is executing the given step.
    Running(PipelineStep),
    /// The last run completed all steps.
    Completed,
    /// The last run stopped early.
    Halted(HaltReason),
}

/// Coordinates the fixed six-step pipeline.
pub struct Orchestrator {
    config: OrchestratorConfig,
    bindings: HashMap<PipelineStep, Arc<dyn StepAgent>>,
    initialized: bool,
    state: RunState,
    last_summary: Option<ExecutionSummary>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates a new orchestrator with the given configuration and no agent
    /// bindings.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            bindings: HashMap::new(),
            initialized: false,
            state: RunState::NotStarted,
            last_summary: None,
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Binds an agent to a pipeline step, replacing any previous binding.
    pub fn bind_agent(&mut self, step: PipelineStep, agent: Arc<dyn StepAgent>) -> &mut Self {
        self.bindings.insert(step, agent);
        self
    }

    /// Attaches a channel for pipeline progress events.
    pub fn with_event_sender(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Returns a token that cancels the run when triggered.
    ///
    /// Cancellation is honored between steps and before every retry
    /// attempt; an in-flight attempt is aborted at the await point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the current run state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates the configuration and verifies that every step has a bound
    /// agent.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError` if the configuration is invalid or a
    /// binding is missing. Fails fast: no step executes until this succeeds.
    pub fn initialize_agents(&mut self) -> Result<(), OrchestratorError> {
        self.config.validate()?;

        for step in PipelineStep::all_steps() {
            if !self.bindings.contains_key(&step) {
                return Err(OrchestratorError::MissingAgent(step));
            }
        }

        self.initialized = true;
        info!(
            agent_count = self.bindings.len(),
            threshold = self.config.evaluation_threshold,
            "All step agents bound"
        );
        Ok(())
    }

    /// Runs the full pipeline against the given diagram.
    ///
    /// Returns the execution summary for both completed and halted runs; a
    /// halted run is a normal outcome, not an error. The summary is also
    /// retained for [`Orchestrator::get_process_summary`].
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::NotInitialized` if `initialize_agents`
    /// has not succeeded.
    pub async fn execute_full_process(
        &mut self,
        diagram: DiagramSource,
    ) -> Result<ExecutionSummary, OrchestratorError> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_started = Instant::now();
        info!(run_id = %run_id, diagram = %diagram, "Starting orchestration run");

        let mut context = PipelineContext::new();
        context.set_diagram(diagram.clone());

        let executor = StepExecutor::new(self.config.retry_policy(), self.config.timeout);
        let gate = ThresholdGate::new(self.config.evaluation_threshold);

        let mut results: Vec<StepResult> = Vec::new();
        let mut halt: Option<HaltReason> = None;

        for step in PipelineStep::all_steps() {
            if self.cancel.is_cancelled() {
                info!(run_id = %run_id, step = %step, "Cancellation observed before step");
                halt = Some(HaltReason::Cancelled);
                break;
            }

            self.state = RunState::Running(step);
            self.send_event(PipelineEvent::step_started(step)).await;
            info!(run_id = %run_id, step = %step, number = step.number(), "Starting pipeline step");

            let agent = Arc::clone(
                self.bindings
                    .get(&step)
                    .ok_or(OrchestratorError::MissingAgent(step))?,
            );
            let input = build_step_input(step, &diagram, &context);
            let snapshot = context.snapshot();

            let outcome = executor
                .execute(step, agent.as_ref(), input, &snapshot, &self.cancel)
                .await;

            let mut result = match outcome {
                StepOutcome::Finished(result) => result,
                StepOutcome::Cancelled => {
                    info!(run_id = %run_id, step = %step, "Step aborted by cancellation");
                    halt = Some(HaltReason::Cancelled);
                    break;
                }
            };

            if result.status == StepStatus::Success && step.is_gated() {
                apply_gate(&gate, &mut result, &mut halt);
            } else if result.status == StepStatus::Failed {
                halt = Some(HaltReason::StepFailed { step });
            }

            if result.status == StepStatus::Success {
                if let Some(response) = &result.response {
                    context.record_output(step, response.content.clone());
                }
                info!(
                    run_id = %run_id,
                    step = %step,
                    attempts = result.attempts,
                    duration_seconds = result.duration_seconds,
                    "Pipeline step completed"
                );
            }

            self.send_event(PipelineEvent::step_completed(result.clone()))
                .await;
            results.push(result);

            if halt.is_some() {
                break;
            }
        }

        // Steps the run never reached are recorded as skipped
        for step in PipelineStep::all_steps().into_iter().skip(results.len()) {
            results.push(StepResult::skipped(step));
        }

        let success = halt.is_none() && results.iter().all(|r| r.is_success());
        let summary = ExecutionSummary {
            run_id,
            steps: results,
            success,
            total_duration_seconds: run_started.elapsed().as_secs_f64(),
            evaluation_threshold: self.config.evaluation_threshold,
            halt_reason: halt.clone(),
            started_at,
            finished_at: Utc::now(),
        };

        match &halt {
            None => {
                self.state = RunState::Completed;
                info!(
                    run_id = %run_id,
                    total_duration_seconds = summary.total_duration_seconds,
                    "Orchestration run completed"
                );
                self.send_event(PipelineEvent::run_completed(summary.clone()))
                    .await;
            }
            Some(reason) => {
                self.state = RunState::Halted(reason.clone());
                warn!(run_id = %run_id, reason = %reason, "Orchestration run halted");
                self.send_event(PipelineEvent::run_halted(reason.clone(), summary.clone()))
                    .await;
            }
        }

        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    /// Returns the summary of the last run without re-invoking any agent.
    pub fn get_process_summary(&self) -> Option<&ExecutionSummary> {
        self.last_summary.as_ref()
    }

    /// Sends an event through the channel, ignoring send errors.
    async fn send_event(&self, event: PipelineEvent) {
        if let Some(event_tx) = &self.event_tx {
            // Receiver may have been dropped
            let _ = event_tx.send(event).await;
        }
    }
}

/// Applies the threshold gate to a successful evaluation result.
fn apply_gate(gate: &ThresholdGate, result: &mut StepResult, halt: &mut Option<HaltReason>) {
    let decision = result
        .response
        .as_ref()
        .map(|response| gate.evaluate(response));

    match decision {
        Some(GateDecision::Pass { score }) => {
            info!(
                step = %result.step,
                score,
                threshold = gate.threshold(),
                "Threshold gate passed"
            );
        }
        Some(GateDecision::Reject { score }) => {
            warn!(
                step = %result.step,
                score,
                threshold = gate.threshold(),
                "Threshold gate rejected evaluation score"
            );
            result.status = StepStatus::ThresholdNotMet;
            *halt = Some(HaltReason::ThresholdNotMet {
                step: result.step,
                score,
            });
        }
        Some(GateDecision::MissingScore) | None => {
            warn!(step = %result.step, "Evaluation response carried no score");
            result.status = StepStatus::Failed;
            if let Some(response) = result.response.as_mut() {
                response.success = false;
                response.error_message =
                    Some("evaluation response did not include a score".to_string());
            } else {
                result.response = Some(AgentResponse::failure(
                    "evaluation response did not include a score",
                ));
            }
            *halt = Some(HaltReason::StepFailed { step: result.step });
        }
    }
}

/// Builds the input payload for one step from the run context.
///
/// Each artifact is present once its producing step has succeeded; the
/// pipeline halts before a consumer runs otherwise.
fn build_step_input(
    step: PipelineStep,
    diagram: &DiagramSource,
    context: &PipelineContext,
) -> StepInput {
    match step {
        PipelineStep::ImageParsing => StepInput::Diagram(diagram.clone()),
        PipelineStep::ModelEvaluation1 => StepInput::Review {
            candidate: context.parsed_architecture().unwrap_or_default().to_string(),
            reference: diagram.describe(),
        },
        PipelineStep::TerraformCreation => {
            StepInput::Text(context.parsed_architecture().unwrap_or_default().to_string())
        }
        PipelineStep::ModelEvaluation2 => StepInput::Review {
            candidate: context.generated_code().unwrap_or_default().to_string(),
            reference: context.parsed_architecture().unwrap_or_default().to_string(),
        },
        PipelineStep::TerraformExecution => {
            StepInput::Text(context.generated_code().unwrap_or_default().to_string())
        }
        PipelineStep::InfrastructureDeployment => {
            StepInput::Text(context.execution_output().unwrap_or_default().to_string())
        }
    }
}
