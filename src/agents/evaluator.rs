//! Quality evaluator agent for the two gated steps (steps 2 and 4).
//!
//! The evaluator asks the model for a JSON verdict and extracts the
//! `overall_score` field robustly; a verdict the score cannot be recovered
//! from is reported as a malformed (retryable) response.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::debug;

use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::pipeline::context::ContextSnapshot;

use super::error::{AgentError, AgentResult};
use super::types::{AgentResponse, StepInput};
use super::StepAgent;

/// Which artifact the evaluator is judging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationRubric {
    /// Step 2: quality of the parsed diagram description.
    DiagramParsing,
    /// Step 4: quality of the generated infrastructure code.
    GeneratedCode,
}

impl EvaluationRubric {
    /// Task label recorded in response metadata.
    pub fn task_label(&self) -> &'static str {
        match self {
            EvaluationRubric::DiagramParsing => "parsing_evaluation",
            EvaluationRubric::GeneratedCode => "code_evaluation",
        }
    }
}

/// Configuration for the quality evaluator agent.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Model identifier used for evaluation.
    pub model: String,
    /// Sampling temperature; kept low for consistent scoring.
    pub temperature: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
        }
    }
}

impl EvaluatorConfig {
    /// Creates a configuration for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// Agent that scores an upstream artifact out of 100 against a fixed rubric.
pub struct QualityEvaluatorAgent {
    provider: Arc<dyn LlmProvider>,
    config: EvaluatorConfig,
    rubric: EvaluationRubric,
}

impl QualityEvaluatorAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "quality_evaluator";

    /// Creates a new evaluator agent for the given rubric.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: EvaluatorConfig,
        rubric: EvaluationRubric,
    ) -> Self {
        Self {
            provider,
            config,
            rubric,
        }
    }

    /// Builds the rubric prompt for one evaluation.
    fn build_prompt(&self, candidate: &str, reference: &str) -> String {
        match self.rubric {
            EvaluationRubric::DiagramParsing => format!(
                "You are an expert evaluator for cloud architecture analysis. \
                 Evaluate the following diagram parsing response.\n\n\
                 ORIGINAL INPUT: {reference}\n\n\
                 PARSING RESPONSE TO EVALUATE:\n{candidate}\n\n\
                 EVALUATION CRITERIA (Score each out of 20 points, total 100):\n\
                 1. **Completeness** (20 points): Are all visible components identified?\n\
                 2. **Accuracy** (20 points): Are the identified components correctly named and categorized?\n\
                 3. **Relationships** (20 points): Are component relationships and connections properly described?\n\
                 4. **Technical Detail** (20 points): Is sufficient technical detail provided for code generation?\n\
                 5. **Structure** (20 points): Is the response well-structured and parseable?\n\n\
                 Provide your evaluation in the following JSON format:\n\
                 {{\n  \"overall_score\": <0-100>,\n  \"criteria_scores\": {{\n    \"completeness\": <0-20>,\n    \"accuracy\": <0-20>,\n    \"relationships\": <0-20>,\n    \"technical_detail\": <0-20>,\n    \"structure\": <0-20>\n  }},\n  \"strengths\": [\"list of strengths\"],\n  \"weaknesses\": [\"list of weaknesses\"],\n  \"recommendations\": [\"list of improvement recommendations\"]\n}}"
            ),
            EvaluationRubric::GeneratedCode => format!(
                "You are an expert Terraform and cloud infrastructure evaluator. \
                 Evaluate the following infrastructure code against the requirements.\n\n\
                 ORIGINAL REQUIREMENTS:\n{reference}\n\n\
                 CODE TO EVALUATE:\n{candidate}\n\n\
                 EVALUATION CRITERIA (Score each out of 20 points, total 100):\n\
                 1. **Requirements Compliance** (20 points): Does the code fulfill all specified requirements?\n\
                 2. **Best Practices** (20 points): Does the code follow infrastructure-as-code best practices?\n\
                 3. **Security** (20 points): Are security best practices implemented?\n\
                 4. **Completeness** (20 points): Are all necessary resources and configurations included?\n\
                 5. **Code Quality** (20 points): Is the code well-structured, readable, and maintainable?\n\n\
                 Provide your evaluation in the following JSON format:\n\
                 {{\n  \"overall_score\": <0-100>,\n  \"criteria_scores\": {{\n    \"requirements_compliance\": <0-20>,\n    \"best_practices\": <0-20>,\n    \"security\": <0-20>,\n    \"completeness\": <0-20>,\n    \"code_quality\": <0-20>\n  }},\n  \"strengths\": [\"list of strengths\"],\n  \"weaknesses\": [\"list of weaknesses\"],\n  \"security_concerns\": [\"list of security issues if any\"],\n  \"recommendations\": [\"list of improvement recommendations\"]\n}}"
            ),
        }
    }
}

/// Extracts the overall score from an evaluation verdict.
///
/// Tries, in order: the whole content as JSON, a fenced ```json block, any
/// embedded JSON object, and finally a bare `"overall_score": N` field.
pub fn extract_score(content: &str) -> Option<f64> {
    fn score_from_value(value: &serde_json::Value) -> Option<f64> {
        value.get("overall_score").and_then(score_number)
    }

    fn score_number(value: &serde_json::Value) -> Option<f64> {
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        if let Some(score) = score_from_value(&value) {
            return Some(score);
        }
    }

    static FENCED: OnceLock<Regex> = OnceLock::new();
    let fenced = FENCED.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("fenced JSON pattern is valid")
    });
    if let Some(captures) = fenced.captures(content) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&captures[1]) {
            if let Some(score) = score_from_value(&value) {
                return Some(score);
            }
        }
    }

    static OBJECT: OnceLock<Regex> = OnceLock::new();
    let object = OBJECT.get_or_init(|| {
        Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("object pattern is valid")
    });
    for candidate in object.find_iter(content) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate.as_str()) {
            if let Some(score) = score_from_value(&value) {
                return Some(score);
            }
        }
    }

    static BARE: OnceLock<Regex> = OnceLock::new();
    let bare = BARE.get_or_init(|| {
        Regex::new(r#""overall_score"\s*:\s*(\d+(?:\.\d+)?)"#).expect("score pattern is valid")
    });
    bare.captures(content)
        .and_then(|captures| captures[1].parse().ok())
}

#[async_trait]
impl StepAgent for QualityEvaluatorAgent {
    fn name(&self) -> &str {
        Self::AGENT_NAME
    }

    async fn invoke(
        &self,
        input: StepInput,
        _context: &ContextSnapshot,
    ) -> AgentResult<AgentResponse> {
        let StepInput::Review {
            candidate,
            reference,
        } = input
        else {
            return Err(AgentError::UnsupportedInput {
                agent: Self::AGENT_NAME.to_string(),
                reason: "expected a review input with candidate and reference".to_string(),
            });
        };

        let prompt = self.build_prompt(&candidate, &reference);
        let request = GenerationRequest::new(
            &self.config.model,
            vec![
                Message::system(
                    "You are an expert infrastructure evaluator. Always respond with valid JSON.",
                ),
                Message::user(prompt),
            ],
        )
        .with_temperature(self.config.temperature);

        let response = match self.provider.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                return Ok(AgentResponse::failure(format!(
                    "evaluation request failed: {}",
                    err
                )))
            }
        };

        let Some(content) = response.first_content() else {
            return Ok(AgentResponse::failure(
                "evaluation model returned an empty completion",
            ));
        };

        // A verdict without a recoverable score is malformed output
        let Some(score) = extract_score(&content) else {
            return Ok(AgentResponse::failure(
                "evaluation verdict did not contain an overall_score field",
            ));
        };

        debug!(
            task = self.rubric.task_label(),
            score, "Extracted evaluation score"
        );

        Ok(AgentResponse::success(content)
            .with_score(score)
            .with_metadata("agent", Self::AGENT_NAME)
            .with_metadata("model", self.config.model.clone())
            .with_metadata("task", self.rubric.task_label())
            .with_metadata("total_tokens", response.usage.total_tokens))
    }
}
