//! Code-generation agent that produces infrastructure code (step 3).
//!
//! The model is asked to emit each configuration file wrapped in
//! `<file path="...">` tags; the agent parses those blocks and writes them
//! under the configured output directory.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::pipeline::context::ContextSnapshot;

use super::error::{AgentError, AgentResult};
use super::types::{AgentResponse, StepInput};
use super::StepAgent;

/// Configuration for the code-generation agent.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Model identifier used for code generation.
    pub model: String,
    /// Directory the generated files are written under.
    pub output_dir: PathBuf,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            output_dir: PathBuf::from("./output/terraform"),
            temperature: 0.2,
        }
    }
}

impl CodegenConfig {
    /// Creates a configuration writing to the given directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Agent that turns a parsed architecture description into a set of
/// Terraform configuration files.
pub struct CodegenAgent {
    provider: Arc<dyn LlmProvider>,
    config: CodegenConfig,
}

impl CodegenAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "terraform_codegen";

    /// Creates a new code-generation agent.
    pub fn new(provider: Arc<dyn LlmProvider>, config: CodegenConfig) -> Self {
        Self { provider, config }
    }

    /// Builds the generation prompt for the parsed architecture.
    fn build_prompt(&self, architecture: &str) -> String {
        format!(
            "You are an expert Terraform engineer. Your task is to generate a complete and \
             well-structured set of Terraform configuration files based on a description of \
             cloud resources.\n\n\
             **Instructions:**\n\
             1. Analyze the provided description of the required infrastructure.\n\
             2. Create a full set of Terraform (.tf) files. Organize the resources logically \
             into separate files (e.g., `providers.tf`, `variables.tf`, `network.tf`, \
             `security.tf`, `storage.tf`, `compute.tf`, `main.tf`, `outputs.tf`).\n\
             3. **Crucially, you MUST wrap the content of each file in an XML-style tag: \
             `<file path=\"filename.tf\">...</file>`.**\n\
             4. Do not include any introductory text, explanations, or markdown formatting \
             outside of the `<file>` tags. The entire output must consist only of one or more \
             `<file>` blocks.\n\
             5. Ensure the generated Terraform code is valid, follows best practices, and is \
             ready for `terraform init` and `terraform apply`.\n\
             6. Create variables in `variables.tf` for key parameters like region, CIDR \
             blocks, and instance types to make the configuration reusable.\n\
             7. Define sensible outputs in `outputs.tf` for important resource identifiers.\n\n\
             **Architecture Description:**\n{architecture}\n\n\
             Begin generating the Terraform files now based on the provided description."
        )
    }

    /// Writes the parsed files to the output directory.
    async fn write_files(&self, files: &[(String, String)]) -> AgentResult<()> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        for (name, content) in files {
            // Keep writes inside the output directory
            let file_name = Path::new(name)
                .file_name()
                .ok_or_else(|| AgentError::Configuration(format!("invalid file name '{name}'")))?;
            let path = self.config.output_dir.join(file_name);
            tokio::fs::write(&path, content).await?;
            debug!(path = %path.display(), bytes = content.len(), "Wrote generated file");
        }

        Ok(())
    }
}

/// Parses `<file path="...">` blocks out of the model response.
pub fn parse_file_blocks(content: &str) -> Vec<(String, String)> {
    static FILE_BLOCK: OnceLock<Regex> = OnceLock::new();
    let pattern = FILE_BLOCK.get_or_init(|| {
        Regex::new(r#"(?s)<file path="(?P<path>[^"]+)">\s*(?P<content>.*?)\s*</file>"#)
            .expect("file block pattern is valid")
    });

    pattern
        .captures_iter(content)
        .map(|captures| {
            (
                captures["path"].to_string(),
                captures["content"].to_string(),
            )
        })
        .collect()
}

#[async_trait]
impl StepAgent for CodegenAgent {
    fn name(&self) -> &str {
        Self::AGENT_NAME
    }

    async fn invoke(
        &self,
        input: StepInput,
        _context: &ContextSnapshot,
    ) -> AgentResult<AgentResponse> {
        let StepInput::Text(architecture) = input else {
            return Err(AgentError::UnsupportedInput {
                agent: Self::AGENT_NAME.to_string(),
                reason: "expected the parsed architecture text".to_string(),
            });
        };

        let request = GenerationRequest::new(
            &self.config.model,
            vec![
                Message::system("You are an expert Terraform engineer."),
                Message::user(self.build_prompt(&architecture)),
            ],
        )
        .with_temperature(self.config.temperature);

        let response = match self.provider.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                return Ok(AgentResponse::failure(format!(
                    "code generation request failed: {}",
                    err
                )))
            }
        };

        let Some(content) = response.first_content() else {
            return Ok(AgentResponse::failure(
                "code generation model returned an empty completion",
            ));
        };

        let files = parse_file_blocks(&content);
        if files.is_empty() {
            // Missing file tags means the model ignored the output contract
            return Ok(AgentResponse::failure(
                "generated output contained no <file> blocks",
            ));
        }

        self.write_files(&files).await?;
        info!(
            file_count = files.len(),
            output_dir = %self.config.output_dir.display(),
            "Generated infrastructure files"
        );

        let file_names: Vec<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
        Ok(AgentResponse::success(content)
            .with_metadata("agent", Self::AGENT_NAME)
            .with_metadata("model", self.config.model.clone())
            .with_metadata("task", "terraform_generation")
            .with_metadata("file_count", files.len())
            .with_metadata("files", serde_json::json!(file_names))
            .with_metadata("total_tokens", response.usage.total_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_blocks() {
        let content = r#"<file path="providers.tf">
terraform {
  required_providers {}
}
</file>
<file path="main.tf">
resource "aws_vpc" "main" {}
</file>"#;

        let files = parse_file_blocks(content);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "providers.tf");
        assert!(files[0].1.contains("required_providers"));
        assert_eq!(files[1].0, "main.tf");
        assert!(files[1].1.contains("aws_vpc"));
    }

    #[test]
    fn test_parse_file_blocks_none() {
        assert!(parse_file_blocks("no tags at all").is_empty());
    }

    #[tokio::test]
    async fn test_write_files_strips_directories() {
        let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let agent = CodegenAgent::new(
            Arc::new(NoopProvider),
            CodegenConfig::new(temp_dir.path()),
        );

        let files = vec![("../escape.tf".to_string(), "content".to_string())];
        agent.write_files(&files).await.expect("write should succeed");

        assert!(temp_dir.path().join("escape.tf").exists());
        assert!(!temp_dir.path().parent().unwrap().join("escape.tf").exists());
    }

    struct NoopProvider;

    #[async_trait]
    impl LlmProvider for NoopProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<crate::llm::GenerationResponse, crate::error::LlmError> {
            Err(crate::error::LlmError::EmptyResponse)
        }
    }
}
