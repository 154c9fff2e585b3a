//! Vision agent that parses architecture diagrams (step 1).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::pipeline::context::ContextSnapshot;

use super::error::{AgentError, AgentResult};
use super::types::{AgentResponse, DiagramSource, StepInput};
use super::StepAgent;

/// Prompt sent alongside the diagram image.
const PARSING_PROMPT: &str = "\
You are an expert cloud architecture analyst. Analyze this architecture diagram and provide a detailed breakdown:

1. **Components Identified**: List all services, components, and resources shown in the diagram.
2. **Relationships**: Describe how components are connected and interact with each other.
3. **Data Flow**: Explain the data flow and communication patterns.
4. **Network Architecture**: Identify VPCs, subnets, security groups, and networking components.
5. **Storage & Database**: Identify storage solutions, databases, and data persistence layers.
6. **Compute Resources**: List instances, functions, containers, or other compute resources.
7. **Security Components**: Identify security groups, IAM roles, encryption, and access controls.
8. **Scalability & High Availability**: Note load balancers, auto-scaling groups, multi-AZ deployments.

If the diagram contains any sequences (such as arrows, numbered steps, or ordered flows) between interfaces or services, use these sequences to better understand the context and accurately interpret the interactions and workflow.

Provide the response in JSON format with clear categorization of components and their properties.
Include confidence levels for each identified component (0-100%).";

/// Configuration for the diagram vision agent.
#[derive(Debug, Clone)]
pub struct VisionAgentConfig {
    /// Vision-capable model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for VisionAgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.2,
        }
    }
}

impl VisionAgentConfig {
    /// Creates a configuration for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// Agent that sends the architecture diagram to a vision-capable model and
/// returns the parsed component breakdown.
pub struct DiagramVisionAgent {
    provider: Arc<dyn LlmProvider>,
    config: VisionAgentConfig,
}

impl DiagramVisionAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "diagram_vision";

    /// Creates a new vision agent.
    pub fn new(provider: Arc<dyn LlmProvider>, config: VisionAgentConfig) -> Self {
        Self { provider, config }
    }

    /// Resolves the diagram source to a data URI the chat API accepts.
    ///
    /// An unreadable file is an input fault, not a transient failure, so it
    /// surfaces as a hard error rather than a retryable response.
    async fn resolve_image(&self, source: &DiagramSource) -> AgentResult<String> {
        match source {
            DiagramSource::DataUri(uri) => Ok(uri.clone()),
            DiagramSource::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                debug!(path = %path.display(), bytes = bytes.len(), "Encoded diagram image");
                Ok(format!(
                    "data:{};base64,{}",
                    mime_for_path(path),
                    BASE64.encode(&bytes)
                ))
            }
        }
    }
}

/// Guesses the image MIME type from the file extension.
fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

#[async_trait]
impl StepAgent for DiagramVisionAgent {
    fn name(&self) -> &str {
        Self::AGENT_NAME
    }

    async fn invoke(
        &self,
        input: StepInput,
        _context: &ContextSnapshot,
    ) -> AgentResult<AgentResponse> {
        let StepInput::Diagram(source) = input else {
            return Err(AgentError::UnsupportedInput {
                agent: Self::AGENT_NAME.to_string(),
                reason: "expected a diagram input".to_string(),
            });
        };

        let image_url = self.resolve_image(&source).await?;

        let request = GenerationRequest::new(
            &self.config.model,
            vec![
                Message::system("You are an expert cloud architecture analyst."),
                Message::user_with_image(PARSING_PROMPT, image_url),
            ],
        )
        .with_temperature(self.config.temperature);

        match self.provider.generate(request).await {
            Ok(response) => {
                let Some(content) = response.first_content() else {
                    return Ok(AgentResponse::failure(
                        "vision model returned an empty completion",
                    ));
                };

                Ok(AgentResponse::success(content)
                    .with_metadata("agent", Self::AGENT_NAME)
                    .with_metadata("model", self.config.model.clone())
                    .with_metadata("task", "architecture_image_parsing")
                    .with_metadata("input_type", "image")
                    .with_metadata("total_tokens", response.usage.total_tokens))
            }
            // Transport and provider failures are retryable
            Err(err) => Ok(AgentResponse::failure(format!(
                "diagram parsing request failed: {}",
                err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("d.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("d.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("d.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("d.webp")), "image/webp");
        assert_eq!(mime_for_path(Path::new("no_extension")), "image/png");
    }

    #[test]
    fn test_default_config() {
        let config = VisionAgentConfig::default();
        assert_eq!(config.model, "gemini-1.5-pro");
        assert!((config.temperature - 0.2).abs() < f64::EPSILON);
    }
}
