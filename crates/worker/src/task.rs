use crate::error::AttemptError;
use crate::retry::RetryPolicy;
use executor::{Attempt, CalculationExecutor, ExecutionMode, ExecutionOutcome};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How one attempt ended, from the scheduler's point of view.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The executor reached a verdict, including a `Failed` calculation.
    Success(ExecutionOutcome),
    /// An error no retry will fix.
    Terminal(AttemptError),
    Retryable(AttemptError),
}

impl TaskOutcome {
    pub fn classify(result: Result<ExecutionOutcome, AttemptError>) -> Self {
        match result {
            Ok(outcome) => TaskOutcome::Success(outcome),
            Err(e) if e.is_transient() => TaskOutcome::Retryable(e),
            Err(e) => TaskOutcome::Terminal(e),
        }
    }
}

/// Final word on one submitted calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub calculation_id: Uuid,
    pub attempts: u32,
    pub outcome: ExecutionOutcome,
}

/// Runs a calculation until it reaches a verdict or the policy is exhausted.
///
/// Every attempt is bounded by `attempt_timeout`. A timed-out attempt leaves
/// the record `Processing` under the shared lease; the next attempt resumes it
/// and the last one abandons it to `Failed`.
pub async fn run_task(
    executor: &CalculationExecutor,
    calculation_id: Uuid,
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    mode: ExecutionMode,
) -> TaskReport {
    let mut attempt = Attempt::first(policy.max_attempts(), mode);

    loop {
        let result = match tokio::time::timeout(attempt_timeout, executor.execute_attempt(calculation_id, &attempt)).await
        {
            Ok(result) => result.map_err(AttemptError::from),
            Err(_) => Err(AttemptError::TimedOut(attempt_timeout)),
        };

        let error = match TaskOutcome::classify(result) {
            TaskOutcome::Success(outcome) => {
                info!(
                    calculation_id = %calculation_id,
                    attempts = attempt.number,
                    outcome = outcome.label(),
                    "Task finished"
                );
                return TaskReport {
                    calculation_id,
                    attempts: attempt.number,
                    outcome,
                };
            }
            TaskOutcome::Retryable(e) if !attempt.is_final() => {
                let delay = policy.delay_for_retry(attempt.number - 1);
                warn!(
                    calculation_id = %calculation_id,
                    attempt = attempt.number,
                    max_attempts = attempt.max_attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying calculation"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.next();
                continue;
            }
            TaskOutcome::Retryable(e) | TaskOutcome::Terminal(e) => e,
        };

        let message = format!("Calculation error: {}", error);
        // The executor fails the record itself unless the attempt was cut off.
        if matches!(error, AttemptError::TimedOut(_)) {
            match executor.abandon(calculation_id, attempt.lease, &message).await {
                Ok(true) => {}
                Ok(false) => warn!(calculation_id = %calculation_id, "Timed-out calculation no longer held"),
                Err(e) => error!(calculation_id = %calculation_id, error = %e, "Failed to save error state"),
            }
        }
        error!(
            calculation_id = %calculation_id,
            attempts = attempt.number,
            error = %error,
            "Giving up on calculation"
        );
        return TaskReport {
            calculation_id,
            attempts: attempt.number,
            outcome: ExecutionOutcome::Failed { error: message },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use crate::testing::{Fixture, FlakySource, inverse_series};
    use core_types::{CalculationStatus, CoreError};
    use executor::ExecutorError;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        }
    }

    const GENEROUS: Duration = Duration::from_secs(10);

    #[test]
    fn test_classification_of_attempt_results() {
        assert!(matches!(
            TaskOutcome::classify(Ok(ExecutionOutcome::NotFound)),
            TaskOutcome::Success(ExecutionOutcome::NotFound)
        ));
        assert!(matches!(
            TaskOutcome::classify(Err(AttemptError::TimedOut(GENEROUS))),
            TaskOutcome::Retryable(_)
        ));
        let state = ExecutorError::State(CoreError::LeaseMismatch("none".to_string()));
        assert!(matches!(
            TaskOutcome::classify(Err(AttemptError::Executor(state))),
            TaskOutcome::Terminal(_)
        ));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let fixture = Fixture::new(inverse_series(3)).await;
        let source = Arc::new(FlakySource::failing(fixture.repo.clone(), 2));
        let executor = fixture.executor_with(source.clone());

        let report = run_task(&executor, fixture.id, &quick(3), GENEROUS, ExecutionMode::Async).await;
        assert_eq!(report.attempts, 3);
        assert_eq!(report.outcome.label(), "COMPLETED");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fixture.stored().await.status, CalculationStatus::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_failed() {
        let fixture = Fixture::new(inverse_series(3)).await;
        let executor = fixture.executor_with(Arc::new(FlakySource::failing(fixture.repo.clone(), 10)));

        let report = run_task(&executor, fixture.id, &quick(2), GENEROUS, ExecutionMode::Async).await;
        assert_eq!(report.attempts, 3);
        let ExecutionOutcome::Failed { error } = report.outcome else {
            panic!("expected failure");
        };
        assert!(error.starts_with("Calculation error: Storage error"));

        let calc = fixture.stored().await;
        assert_eq!(calc.status, CalculationStatus::Failed);
        assert!(calc.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_business_failure_is_not_retried() {
        let fixture = Fixture::new(Vec::new()).await;
        let source = Arc::new(FlakySource::failing(fixture.repo.clone(), 0));
        let executor = fixture.executor_with(source.clone());

        let report = run_task(&executor, fixture.id, &quick(3), GENEROUS, ExecutionMode::Async).await;
        assert_eq!(report.attempts, 1);
        assert_eq!(report.outcome.label(), "FAILED");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_resumed_by_the_retry() {
        let fixture = Fixture::new(inverse_series(3)).await;
        let source = FlakySource::stalling(fixture.repo.clone(), 1, Duration::from_secs(5));
        let executor = fixture.executor_with(Arc::new(source));

        let report = run_task(
            &executor,
            fixture.id,
            &quick(1),
            Duration::from_millis(50),
            ExecutionMode::Async,
        )
        .await;
        assert_eq!(report.attempts, 2);
        assert_eq!(report.outcome.label(), "COMPLETED");
    }

    #[tokio::test]
    async fn test_final_timeout_abandons_the_calculation() {
        let fixture = Fixture::new(inverse_series(3)).await;
        let source = FlakySource::stalling(fixture.repo.clone(), 5, Duration::from_secs(5));
        let executor = fixture.executor_with(Arc::new(source));

        let report = run_task(
            &executor,
            fixture.id,
            &RetryPolicy::no_retry(),
            Duration::from_millis(50),
            ExecutionMode::Async,
        )
        .await;
        assert_eq!(report.attempts, 1);

        let calc = fixture.stored().await;
        assert_eq!(calc.status, CalculationStatus::Failed);
        assert_eq!(calc.error_message.as_deref(), Some("Calculation error: attempt timed out after 50ms"));
    }
}
