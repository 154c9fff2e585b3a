//! Step agents for the diagram-to-infrastructure pipeline.
//!
//! Every pipeline step binds to exactly one implementation of [`StepAgent`],
//! the uniform capability the orchestrator invokes. The orchestrator never
//! branches on a concrete agent type, only on the step identifier; test
//! doubles substitute per step through the same trait.

use async_trait::async_trait;

use crate::pipeline::context::ContextSnapshot;

pub mod codegen;
pub mod error;
pub mod evaluator;
pub mod manual;
pub mod types;
pub mod vision;

pub use codegen::{CodegenAgent, CodegenConfig};
pub use error::{AgentError, AgentResult};
pub use evaluator::{EvaluationRubric, EvaluatorConfig, QualityEvaluatorAgent};
pub use manual::ManualStepAgent;
pub use types::{AgentResponse, DiagramSource, StepInput};
pub use vision::{DiagramVisionAgent, VisionAgentConfig};

/// Uniform capability implemented by every step agent.
///
/// A recoverable failure (transport error, malformed model output, provider
/// rejection) is reported as `AgentResponse { success: false, .. }` so the
/// executor's retry policy applies. `Err` is reserved for unrecoverable
/// faults such as broken configuration or unusable input, which halt the run
/// without retry.
#[async_trait]
pub trait StepAgent: Send + Sync {
    /// Human-readable agent name used in logs and response metadata.
    fn name(&self) -> &str;

    /// Process the step input against a read-only view of the run context.
    async fn invoke(
        &self,
        input: StepInput,
        context: &ContextSnapshot,
    ) -> AgentResult<AgentResponse>;
}
