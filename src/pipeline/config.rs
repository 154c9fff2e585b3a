//! Configuration for the orchestration engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::executor::RetryPolicy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    // Gating settings
    /// Minimum score (0-100) a gated evaluation step must reach.
    pub evaluation_threshold: f64,

    // Retry settings
    /// Maximum invocation attempts per step, including the first.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Delay before the second attempt.
    pub retry_base_delay: Duration,
    /// Multiplier applied to the backoff delay after each failed attempt.
    pub retry_backoff_multiplier: f64,

    // Process settings
    /// Whether independent runs may execute concurrently in one process.
    /// Does not affect step ordering within a run.
    pub enable_parallel_execution: bool,

    // Model settings
    /// Vision-capable model for diagram parsing.
    pub vision_model: String,
    /// Model used for the two evaluation steps.
    pub evaluator_model: String,
    /// Model used for code generation.
    pub codegen_model: String,

    // Output settings
    /// Directory generated files and run reports are written under.
    pub output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            evaluation_threshold: 80.0,
            max_retries: 3,
            timeout: Duration::from_secs(300),
            retry_base_delay: Duration::from_secs(1),
            retry_backoff_multiplier: 2.0,
            enable_parallel_execution: true,
            vision_model: "gemini-1.5-pro".to_string(),
            evaluator_model: "gpt-4o".to_string(),
            codegen_model: "claude-3-5-sonnet-20241022".to_string(),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ARCHFORGE_EVALUATION_THRESHOLD`: Minimum gate score (default: 80)
    /// - `ARCHFORGE_MAX_RETRIES`: Attempts per step (default: 3)
    /// - `ARCHFORGE_TIMEOUT_SECS`: Per-attempt timeout in seconds (default: 300)
    /// - `ARCHFORGE_RETRY_BASE_DELAY_MS`: Backoff base delay (default: 1000)
    /// - `ARCHFORGE_RETRY_BACKOFF_MULTIPLIER`: Backoff multiplier (default: 2.0)
    /// - `ARCHFORGE_ENABLE_PARALLEL_EXECUTION`: Concurrent runs (default: true)
    /// - `ARCHFORGE_VISION_MODEL`: Diagram parsing model
    /// - `ARCHFORGE_EVALUATOR_MODEL`: Evaluation model
    /// - `ARCHFORGE_CODEGEN_MODEL`: Code generation model
    /// - `ARCHFORGE_OUTPUT_DIR`: Output directory (default: ./output)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ARCHFORGE_EVALUATION_THRESHOLD") {
            config.evaluation_threshold =
                parse_env_value(&val, "ARCHFORGE_EVALUATION_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "ARCHFORGE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "ARCHFORGE_TIMEOUT_SECS")?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("ARCHFORGE_RETRY_BASE_DELAY_MS") {
            let millis: u64 = parse_env_value(&val, "ARCHFORGE_RETRY_BASE_DELAY_MS")?;
            config.retry_base_delay = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("ARCHFORGE_RETRY_BACKOFF_MULTIPLIER") {
            config.retry_backoff_multiplier =
                parse_env_value(&val, "ARCHFORGE_RETRY_BACKOFF_MULTIPLIER")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_ENABLE_PARALLEL_EXECUTION") {
            config.enable_parallel_execution =
                parse_env_bool(&val, "ARCHFORGE_ENABLE_PARALLEL_EXECUTION")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_VISION_MODEL") {
            config.vision_model = val;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_EVALUATOR_MODEL") {
            config.evaluator_model = val;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_CODEGEN_MODEL") {
            config.codegen_model = val;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.evaluation_threshold) {
            return Err(ConfigError::ValidationFailed(
                "evaluation_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "retry_backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.vision_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "vision_model cannot be empty".to_string(),
            ));
        }

        if self.evaluator_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "evaluator_model cannot be empty".to_string(),
            ));
        }

        if self.codegen_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "codegen_model cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    /// Builder method to set the evaluation threshold.
    pub fn with_evaluation_threshold(mut self, threshold: f64) -> Self {
        self.evaluation_threshold = threshold;
        self
    }

    /// Builder method to set the maximum attempts per step.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder method to set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method to set the backoff base delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Builder method to set the backoff multiplier.
    pub fn with_retry_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_backoff_multiplier = multiplier;
        self
    }

    /// Builder method to enable or disable concurrent runs.
    pub fn with_parallel_execution(mut self, enabled: bool) -> Self {
        self.enable_parallel_execution = enabled;
        self
    }

    /// Builder method to set the vision model.
    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    /// Builder method to set the evaluator model.
    pub fn with_evaluator_model(mut self, model: impl Into<String>) -> Self {
        self.evaluator_model = model.into();
        self
    }

    /// Builder method to set the code-generation model.
    pub fn with_codegen_model(mut self, model: impl Into<String>) -> Self {
        self.codegen_model = model.into();
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!((config.evaluation_threshold - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
        assert!((config.retry_backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.enable_parallel_execution);
        assert_eq!(config.evaluator_model, "gpt-4o");
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::new()
            .with_evaluation_threshold(90.0)
            .with_max_retries(5)
            .with_timeout(Duration::from_secs(120))
            .with_retry_base_delay(Duration::from_millis(500))
            .with_retry_backoff_multiplier(3.0)
            .with_parallel_execution(false)
            .with_vision_model("gpt-4o")
            .with_codegen_model("claude-3-opus")
            .with_output_dir("/tmp/archforge");

        assert!((config.evaluation_threshold - 90.0).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert!(!config.enable_parallel_execution);
        assert_eq!(config.vision_model, "gpt-4o");
        assert_eq!(config.codegen_model, "claude-3-opus");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/archforge"));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let config = OrchestratorConfig::default().with_evaluation_threshold(120.0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("evaluation_threshold"));
    }

    #[test]
    fn test_validation_zero_retries() {
        let config = OrchestratorConfig::default().with_max_retries(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_retries"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = OrchestratorConfig::default().with_timeout(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout"));
    }

    #[test]
    fn test_validation_low_multiplier() {
        let config = OrchestratorConfig::default().with_retry_backoff_multiplier(0.5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("retry_backoff_multiplier"));
    }

    #[test]
    fn test_validation_empty_model() {
        let config = OrchestratorConfig::default().with_evaluator_model("");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("evaluator_model"));
    }

    #[test]
    fn test_retry_policy_derivation() {
        let config = OrchestratorConfig::default()
            .with_max_retries(4)
            .with_retry_base_delay(Duration::from_millis(250));
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("invalid", "test").is_err());
    }
}
