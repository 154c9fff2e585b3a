//! Run report persistence.
//!
//! Every run's `ExecutionSummary` is written out twice: as pretty JSON for
//! downstream tooling and as a Markdown session log for human inspection.

use std::path::PathBuf;

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::pipeline::{ExecutionSummary, OrchestratorConfig, StepStatus};

/// Errors that can occur while persisting run reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to create the report directory.
    #[error("Failed to create report directory: {0}")]
    DirectoryCreationFailed(String),

    /// IO error while writing a report file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths of the files one saved report consists of.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    /// Structured JSON record of the summary.
    pub json: PathBuf,
    /// Human-readable Markdown session log.
    pub markdown: PathBuf,
}

/// Writes run reports under a base directory.
pub struct RunReporter {
    base_path: PathBuf,
}

impl RunReporter {
    /// Creates a reporter writing under the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Ensures the report directory exists.
    async fn ensure_directory(&self) -> Result<(), ReportError> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await.map_err(|e| {
                ReportError::DirectoryCreationFailed(format!(
                    "Failed to create directory {:?}: {}",
                    self.base_path, e
                ))
            })?;
        }
        Ok(())
    }

    /// Saves a run summary as JSON plus a Markdown session log.
    ///
    /// # Returns
    ///
    /// The paths both report files were written to.
    pub async fn save(
        &self,
        summary: &ExecutionSummary,
        config: &OrchestratorConfig,
    ) -> Result<ReportPaths, ReportError> {
        self.ensure_directory().await?;

        let stem = format!(
            "run_{}_{}",
            summary.started_at.format("%Y%m%d_%H%M%S"),
            &summary.run_id.simple().to_string()[..8]
        );
        let json_path = self.base_path.join(format!("{stem}.json"));
        let markdown_path = self.base_path.join(format!("{stem}.md"));

        let json = serde_json::to_string_pretty(summary)?;
        let mut file = fs::File::create(&json_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        let markdown = render_markdown(summary, config);
        fs::write(&markdown_path, markdown).await?;

        info!(
            json = %json_path.display(),
            markdown = %markdown_path.display(),
            "Saved run report"
        );

        Ok(ReportPaths {
            json: json_path,
            markdown: markdown_path,
        })
    }
}

/// Renders the Markdown session log for one run.
fn render_markdown(summary: &ExecutionSummary, config: &OrchestratorConfig) -> String {
    let mut out = String::new();

    out.push_str("# Orchestration Run Log\n\n");
    out.push_str(&format!("**Run ID:** {}\n", summary.run_id));
    out.push_str(&format!(
        "**Started:** {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "**Finished:** {}\n\n",
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("## Configuration\n\n");
    out.push_str(&format!(
        "- Evaluation threshold: {:.0}\n",
        config.evaluation_threshold
    ));
    out.push_str(&format!("- Max retries: {}\n", config.max_retries));
    out.push_str(&format!(
        "- Per-attempt timeout: {}s\n",
        config.timeout.as_secs()
    ));
    out.push_str(&format!("- Vision model: {}\n", config.vision_model));
    out.push_str(&format!("- Evaluator model: {}\n", config.evaluator_model));
    out.push_str(&format!("- Codegen model: {}\n\n", config.codegen_model));

    out.push_str("## Steps\n\n");
    for result in &summary.steps {
        out.push_str(&format!(
            "### Step {}: {}\n\n",
            result.step.number(),
            result.step.display_name()
        ));
        out.push_str(&format!("**Status:** {}\n", result.status));

        if result.status != StepStatus::Skipped {
            out.push_str(&format!("**Attempts:** {}\n", result.attempts));
            out.push_str(&format!(
                "**Duration:** {:.2}s\n",
                result.duration_seconds
            ));
        }

        if let Some(score) = result.score() {
            let verdict = if score >= summary.evaluation_threshold {
                "passed"
            } else {
                "failed"
            };
            out.push_str(&format!(
                "**Score:** {:.1} (threshold {:.0}, {})\n",
                score, summary.evaluation_threshold, verdict
            ));
        }

        if let Some(response) = &result.response {
            if let Some(error) = &response.error_message {
                out.push_str(&format!("**Error:** {}\n", error));
            }
        }

        out.push('\n');
    }

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "**Overall:** {}\n",
        if summary.success {
            "completed".to_string()
        } else {
            match &summary.halt_reason {
                Some(reason) => format!("halted ({})", reason),
                None => "incomplete".to_string(),
            }
        }
    ));
    out.push_str(&format!(
        "**Successful steps:** {}/{}\n",
        summary.successful_steps(),
        summary.steps.len()
    ));
    out.push_str(&format!(
        "**Total duration:** {:.2}s\n",
        summary.total_duration_seconds
    ));

    let scores = summary.threshold_scores();
    if !scores.is_empty() {
        out.push_str("\n**Threshold results:**\n");
        for (step, score) in scores {
            let mark = if score >= summary.evaluation_threshold {
                "passed"
            } else {
                "failed"
            };
            out.push_str(&format!("- {}: {:.1} ({})\n", step, score, mark));
        }
    }

    out
}
