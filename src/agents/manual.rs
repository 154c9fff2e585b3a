//! Pass-through agents for the manual pipeline steps (steps 5 and 6).
//!
//! Infrastructure execution and deployment run outside this process; these
//! adapters satisfy the same invoke contract so the orchestrator records
//! them like any other step, and they return the operator instructions as
//! their payload.

use async_trait::async_trait;

use crate::pipeline::context::ContextSnapshot;

use super::error::AgentResult;
use super::types::{AgentResponse, StepInput};
use super::StepAgent;

/// Placeholder agent for a manual step.
pub struct ManualStepAgent {
    name: String,
    description: String,
    instructions: Vec<&'static str>,
}

impl ManualStepAgent {
    /// Creates the adapter for the Terraform execution step.
    pub fn terraform_execution() -> Self {
        Self {
            name: "terraform_execution".to_string(),
            description: "Execute the generated Terraform code".to_string(),
            instructions: vec![
                "Navigate to the generated terraform directory",
                "Initialize Terraform: terraform init",
                "Plan the deployment: terraform plan",
                "Review the plan carefully",
                "Apply if satisfied: terraform apply",
            ],
        }
    }

    /// Creates the adapter for the infrastructure deployment step.
    pub fn infrastructure_deployment() -> Self {
        Self {
            name: "infrastructure_deployment".to_string(),
            description: "Deploy and validate the cloud infrastructure".to_string(),
            instructions: vec![
                "Verify cloud credentials are configured",
                "Confirm all resources were created successfully",
                "Test the deployed infrastructure",
                "Monitor the deployment in the provider console",
                "Validate the result matches the original diagram",
            ],
        }
    }
}

#[async_trait]
impl StepAgent for ManualStepAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _input: StepInput,
        _context: &ContextSnapshot,
    ) -> AgentResult<AgentResponse> {
        let steps = self
            .instructions
            .iter()
            .enumerate()
            .map(|(i, instruction)| format!("{}. {}", i + 1, instruction))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(
            AgentResponse::success(format!("{}\n\n{}", self.description, steps))
                .with_metadata("agent", self.name.clone())
                .with_metadata("manual", true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_step_succeeds() {
        let agent = ManualStepAgent::terraform_execution();
        let response = agent
            .invoke(
                StepInput::Text("generated code".to_string()),
                &ContextSnapshot::default(),
            )
            .await
            .expect("manual step should not fail");

        assert!(response.success);
        assert!(response.content.contains("terraform init"));
        assert_eq!(response.metadata.get("manual"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_deployment_step_name() {
        let agent = ManualStepAgent::infrastructure_deployment();
        assert_eq!(agent.name(), "infrastructure_deployment");
    }
}
