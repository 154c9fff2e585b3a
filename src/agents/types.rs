//! Core types shared by the step agents and the pipeline.
//!
//! Defines the normalized agent response and the per-step input payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Standard response format produced by every agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Payload produced by the agent; meaning varies by step.
    pub content: String,
    /// False when the agent itself failed, independent of any score.
    pub success: bool,
    /// Quality score in [0, 100]; present only for evaluation responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Diagnostic message, present iff `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Auxiliary key/value data (model name, task label, token counts).
    /// Opaque to the orchestrator.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    /// Creates a successful response with the given content.
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            score: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a failed response with a diagnostic message.
    ///
    /// The content of a failed response is never forwarded downstream.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            score: None,
            error_message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attaches a quality score, clamped to [0, 100].
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 100.0));
        self
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Source of the architecture diagram fed into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiagramSource {
    /// Path to an image file on disk.
    Path(PathBuf),
    /// Inline `data:image/...;base64,...` URI.
    DataUri(String),
}

impl DiagramSource {
    /// Short human-readable description used in logs and evaluation prompts.
    pub fn describe(&self) -> String {
        match self {
            DiagramSource::Path(path) => format!("diagram file {}", path.display()),
            DiagramSource::DataUri(_) => "inline diagram image".to_string(),
        }
    }
}

impl std::fmt::Display for DiagramSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Typed input payload for one step invocation.
#[derive(Debug, Clone)]
pub enum StepInput {
    /// Architecture diagram to parse (step 1).
    Diagram(DiagramSource),
    /// Free-form text payload (steps 3, 5 and 6).
    Text(String),
    /// Candidate output plus the material it is judged against (steps 2 and 4).
    Review {
        /// The artifact being scored.
        candidate: String,
        /// Reference material the candidate is compared to.
        reference: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = AgentResponse::success("parsed architecture")
            .with_metadata("model", "gemini-1.5-pro")
            .with_metadata("task", "architecture_image_parsing");

        assert!(response.success);
        assert!(response.error_message.is_none());
        assert_eq!(response.content, "parsed architecture");
        assert_eq!(
            response.metadata.get("model"),
            Some(&serde_json::json!("gemini-1.5-pro"))
        );
    }

    #[test]
    fn test_failure_response() {
        let response = AgentResponse::failure("connection reset");
        assert!(!response.success);
        assert!(response.content.is_empty());
        assert_eq!(response.error_message.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_score_clamping() {
        let response = AgentResponse::success("eval").with_score(150.0);
        assert_eq!(response.score, Some(100.0));

        let response = AgentResponse::success("eval").with_score(-5.0);
        assert_eq!(response.score, Some(0.0));

        let response = AgentResponse::success("eval").with_score(87.0);
        assert_eq!(response.score, Some(87.0));
    }

    #[test]
    fn test_diagram_source_describe() {
        let source = DiagramSource::Path(PathBuf::from("diagrams/serverless.png"));
        assert!(source.describe().contains("serverless.png"));

        let source = DiagramSource::DataUri("data:image/png;base64,AAAA".to_string());
        assert_eq!(source.describe(), "inline diagram image");
    }

    #[test]
    fn test_response_serialization_omits_absent_fields() {
        let response = AgentResponse::success("ok");
        let json = serde_json::to_value(&response).expect("serialization should succeed");
        assert!(json.get("score").is_none());
        assert!(json.get("error_message").is_none());
    }
}
