//! Step executor: runs one step against one agent with bounded retry.
//!
//! Retries are sequential within a step, each attempt bounded by the
//! configured timeout, with exponential backoff between attempts. Only
//! execution failures (unsuccessful responses, timeouts) are retried; the
//! threshold gate is applied later by the orchestrator and never loops back
//! here.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::agents::{AgentResponse, StepAgent, StepInput};

use super::context::ContextSnapshot;
use super::step::{PipelineStep, StepResult};

/// Retry policy applied to failed step attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of invocation attempts, including the first.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay before attempt `failed_attempts + 1`.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
    }
}

/// Outcome of executing one step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step reached a terminal result.
    Finished(StepResult),
    /// Cancellation was observed before a terminal result was reached; no
    /// further attempt was started.
    Cancelled,
}

/// Executes a single pipeline step with bounded retry and per-attempt
/// timeout.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    retry: RetryPolicy,
    timeout: Duration,
}

impl StepExecutor {
    /// Creates an executor with the given retry policy and attempt timeout.
    pub fn new(retry: RetryPolicy, timeout: Duration) -> Self {
        Self { retry, timeout }
    }

    /// Runs the step to a terminal result or until cancellation.
    ///
    /// The final attempt's response, success or failure, is authoritative.
    /// A hard error from the agent is fatal: it is not retried and the step
    /// fails immediately.
    pub async fn execute(
        &self,
        step: PipelineStep,
        agent: &dyn StepAgent,
        input: StepInput,
        snapshot: &ContextSnapshot,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_response: Option<AgentResponse> = None;

        while attempts < self.retry.max_retries {
            if cancel.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            if attempts > 0 {
                let delay = self.retry.delay_after(attempts);
                debug!(
                    step = %step,
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying step after failed attempt"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return StepOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            attempts += 1;
            // An attempt that completes in the same poll as a cancellation
            // keeps its result; cancellation only interrupts pending work.
            let attempt = tokio::time::timeout(self.timeout, agent.invoke(input.clone(), snapshot));
            let attempt_result = tokio::select! {
                biased;
                result = attempt => result,
                _ = cancel.cancelled() => return StepOutcome::Cancelled,
            };

            match attempt_result {
                Ok(Ok(response)) if response.success => {
                    return StepOutcome::Finished(StepResult::success(
                        step,
                        response,
                        attempts,
                        started.elapsed(),
                    ));
                }
                Ok(Ok(response)) => {
                    warn!(
                        step = %step,
                        attempt = attempts,
                        max_retries = self.retry.max_retries,
                        error = response.error_message.as_deref().unwrap_or("unknown"),
                        "Step attempt returned a failure response"
                    );
                    last_response = Some(response);
                }
                Ok(Err(err)) => {
                    // Unrecoverable fault: no retry
                    error!(
                        step = %step,
                        attempt = attempts,
                        error = %err,
                        "Agent raised an unrecoverable fault"
                    );
                    return StepOutcome::Finished(StepResult::failed(
                        step,
                        Some(AgentResponse::failure(err.to_string())),
                        attempts,
                        started.elapsed(),
                    ));
                }
                Err(_elapsed) => {
                    warn!(
                        step = %step,
                        attempt = attempts,
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Step attempt timed out"
                    );
                    last_response = Some(AgentResponse::failure(format!(
                        "attempt timed out after {:.1}s",
                        self.timeout.as_secs_f64()
                    )));
                }
            }
        }

        StepOutcome::Finished(StepResult::failed(
            step,
            last_response,
            attempts,
            started.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentResult, StepAgent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted agent returning one canned outcome per attempt.
    struct ScriptedAgent {
        script: Mutex<Vec<Attempt>>,
        calls: AtomicUsize,
    }

    enum Attempt {
        Respond(AgentResponse),
        Fatal(String),
        Hang,
    }

    impl ScriptedAgent {
        fn new(script: Vec<Attempt>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StepAgent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(
            &self,
            _input: StepInput,
            _context: &ContextSnapshot,
        ) -> AgentResult<AgentResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let attempt = {
                let mut script = self.script.lock().expect("lock not poisoned");
                if script.is_empty() {
                    Attempt::Respond(AgentResponse::success("default"))
                } else {
                    script.remove(0)
                }
            };
            match attempt {
                Attempt::Respond(response) => Ok(response),
                Attempt::Fatal(message) => {
                    Err(crate::agents::AgentError::Configuration(message))
                }
                Attempt::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(AgentResponse::success("too late"))
                }
            }
        }
    }

    fn fast_executor() -> StepExecutor {
        StepExecutor::new(
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let agent = ScriptedAgent::new(vec![Attempt::Respond(AgentResponse::success("ok"))]);
        let outcome = fast_executor()
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            StepOutcome::Finished(result) => {
                assert!(result.is_success());
                assert_eq!(result.attempts, 1);
            }
            StepOutcome::Cancelled => panic!("unexpected cancellation"),
        }
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let agent = ScriptedAgent::new(vec![
            Attempt::Respond(AgentResponse::failure("transient")),
            Attempt::Respond(AgentResponse::failure("transient")),
            Attempt::Respond(AgentResponse::success("recovered")),
        ]);
        let outcome = fast_executor()
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            StepOutcome::Finished(result) => {
                assert!(result.is_success());
                assert_eq!(result.attempts, 3);
            }
            StepOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let agent = ScriptedAgent::new(vec![
            Attempt::Respond(AgentResponse::failure("down")),
            Attempt::Respond(AgentResponse::failure("down")),
            Attempt::Respond(AgentResponse::failure("still down")),
        ]);
        let outcome = fast_executor()
            .execute(
                PipelineStep::TerraformCreation,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            StepOutcome::Finished(result) => {
                assert_eq!(result.status, crate::pipeline::StepStatus::Failed);
                assert_eq!(result.attempts, 3);
                // The final attempt's response is authoritative
                let response = result.response.expect("failure response retained");
                assert_eq!(response.error_message.as_deref(), Some("still down"));
            }
            StepOutcome::Cancelled => panic!("unexpected cancellation"),
        }
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let agent = ScriptedAgent::new(vec![
            Attempt::Hang,
            Attempt::Hang,
            Attempt::Respond(AgentResponse::success("finally")),
        ]);
        let outcome = fast_executor()
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            StepOutcome::Finished(result) => {
                assert!(result.is_success());
                assert_eq!(result.attempts, 3);
            }
            StepOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let agent = ScriptedAgent::new(vec![Attempt::Fatal("bad wiring".to_string())]);
        let outcome = fast_executor()
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            StepOutcome::Finished(result) => {
                assert_eq!(result.status, crate::pipeline::StepStatus::Failed);
                assert_eq!(result.attempts, 1);
            }
            StepOutcome::Cancelled => panic!("unexpected cancellation"),
        }
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_before_first_attempt() {
        let agent = ScriptedAgent::new(vec![Attempt::Respond(AgentResponse::success("never"))]);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = fast_executor()
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &token,
            )
            .await;

        assert!(matches!(outcome, StepOutcome::Cancelled));
        assert_eq!(agent.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_attempt() {
        let agent = ScriptedAgent::new(vec![Attempt::Hang]);
        let token = CancellationToken::new();

        let cancel_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_token.cancel();
        });

        let executor = StepExecutor::new(RetryPolicy::default(), Duration::from_secs(30));
        let outcome = executor
            .execute(
                PipelineStep::ImageParsing,
                &agent,
                StepInput::Text("in".to_string()),
                &ContextSnapshot::default(),
                &token,
            )
            .await;

        assert!(matches!(outcome, StepOutcome::Cancelled));
    }
}
