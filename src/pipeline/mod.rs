//! Orchestration engine for the diagram-to-infrastructure pipeline.
//!
//! This module is the core of archforge. It sequences the fixed six-step
//! pipeline, invokes the bound agents through the uniform contract, applies
//! the threshold gates, retries failed attempts with backoff, tracks state
//! and timing, and produces the final execution summary.

pub mod config;
pub mod context;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod step;

pub use config::{ConfigError, OrchestratorConfig};
pub use context::{ContextSnapshot, PipelineContext};
pub use executor::{RetryPolicy, StepExecutor, StepOutcome};
pub use gate::{GateDecision, ThresholdGate};
pub use orchestrator::{Orchestrator, OrchestratorError, RunState};
pub use step::{
    ExecutionSummary, HaltReason, PipelineEvent, PipelineStep, StepResult, StepStatus,
};
