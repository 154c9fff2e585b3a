//! Per-run shared state threaded between pipeline steps.

use crate::agents::DiagramSource;

use super::step::PipelineStep;

/// Mutable run state owned exclusively by the orchestrator.
///
/// Created at run start and discarded at run end; never shared across
/// concurrent runs. Agents only ever see a [`ContextSnapshot`].
#[derive(Debug, Default)]
pub struct PipelineContext {
    diagram: Option<DiagramSource>,
    parsed_architecture: Option<String>,
    generated_code: Option<String>,
    execution_output: Option<String>,
    deployment_output: Option<String>,
}

impl PipelineContext {
    /// Creates an empty context for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the diagram the run was started with.
    pub fn set_diagram(&mut self, diagram: DiagramSource) {
        self.diagram = Some(diagram);
    }

    /// Records the artifact a completed step produced.
    ///
    /// Evaluation steps produce scores rather than artifacts, so they leave
    /// the context untouched.
    pub fn record_output(&mut self, step: PipelineStep, content: String) {
        match step {
            PipelineStep::ImageParsing => self.parsed_architecture = Some(content),
            PipelineStep::TerraformCreation => self.generated_code = Some(content),
            PipelineStep::TerraformExecution => self.execution_output = Some(content),
            PipelineStep::InfrastructureDeployment => self.deployment_output = Some(content),
            PipelineStep::ModelEvaluation1 | PipelineStep::ModelEvaluation2 => {}
        }
    }

    /// Returns the parsed architecture description, if step 1 has completed.
    pub fn parsed_architecture(&self) -> Option<&str> {
        self.parsed_architecture.as_deref()
    }

    /// Returns the generated infrastructure code, if step 3 has completed.
    pub fn generated_code(&self) -> Option<&str> {
        self.generated_code.as_deref()
    }

    /// Returns the execution output, if step 5 has completed.
    pub fn execution_output(&self) -> Option<&str> {
        self.execution_output.as_deref()
    }

    /// Produces a read-only view for one agent invocation.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            diagram: self.diagram.clone(),
            parsed_architecture: self.parsed_architecture.clone(),
            generated_code: self.generated_code.clone(),
            execution_output: self.execution_output.clone(),
            deployment_output: self.deployment_output.clone(),
        }
    }
}

/// Read-only view of the run context handed to agents.
///
/// Agents receive an owned snapshot per invocation and never retain
/// references to orchestrator state across calls.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// The diagram the run was started with.
    pub diagram: Option<DiagramSource>,
    /// Artifact of step 1.
    pub parsed_architecture: Option<String>,
    /// Artifact of step 3.
    pub generated_code: Option<String>,
    /// Artifact of step 5.
    pub execution_output: Option<String>,
    /// Artifact of step 6.
    pub deployment_output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_record_output_routing() {
        let mut context = PipelineContext::new();
        context.record_output(PipelineStep::ImageParsing, "parsed".to_string());
        context.record_output(PipelineStep::TerraformCreation, "code".to_string());
        context.record_output(PipelineStep::TerraformExecution, "applied".to_string());

        assert_eq!(context.parsed_architecture(), Some("parsed"));
        assert_eq!(context.generated_code(), Some("code"));
        assert_eq!(context.execution_output(), Some("applied"));
    }

    #[test]
    fn test_evaluation_steps_leave_context_untouched() {
        let mut context = PipelineContext::new();
        context.record_output(PipelineStep::ModelEvaluation1, "verdict".to_string());
        context.record_output(PipelineStep::ModelEvaluation2, "verdict".to_string());

        assert!(context.parsed_architecture().is_none());
        assert!(context.generated_code().is_none());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut context = PipelineContext::new();
        context.set_diagram(DiagramSource::Path(PathBuf::from("diagram.png")));
        context.record_output(PipelineStep::ImageParsing, "parsed".to_string());

        let snapshot = context.snapshot();
        context.record_output(PipelineStep::ImageParsing, "changed".to_string());

        // The snapshot keeps the state at the time it was taken
        assert_eq!(snapshot.parsed_architecture.as_deref(), Some("parsed"));
        assert_eq!(context.parsed_architecture(), Some("changed"));
    }
}
