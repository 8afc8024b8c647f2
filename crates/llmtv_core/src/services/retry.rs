//! Bounded retry around a single collaborator call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::orchestrator::{StageError, StageResult};

use super::error::{ServiceError, ServiceResult};

/// Observable points in a retry loop.
#[derive(Debug)]
pub enum RetryEvent<'a> {
    /// An attempt is about to call the service.
    AttemptStarted { attempt: u32, max_attempts: u32 },
    /// An attempt failed with a retryable error; waiting `delay` before the next.
    Retrying {
        attempt: u32,
        error: &'a ServiceError,
        delay: Duration,
    },
}

/// Call `call` until it succeeds, fails fatally, or the budget runs out.
///
/// Every attempt is bounded by `policy.attempt_timeout`; an attempt that
/// exceeds it counts as a [`ServiceError::Timeout`]. Retryable failures
/// wait [`RetryPolicy::backoff_before`] between attempts. Cancellation
/// interrupts both the in-flight attempt and the backoff wait.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    service: &str,
    mut on_event: E,
    mut call: F,
) -> StageResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
    E: FnMut(RetryEvent<'_>),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        on_event(RetryEvent::AttemptStarted {
            attempt,
            max_attempts,
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            outcome = tokio::time::timeout(policy.attempt_timeout, call(attempt)) => outcome,
        };

        let error = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_elapsed) => ServiceError::timeout(service, policy.attempt_timeout.as_secs()),
        };

        // A call abandoned on cancellation reports its own error
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        if !error.is_retryable() || attempt >= max_attempts {
            tracing::warn!(
                "{} failed on attempt {}/{}: {}",
                service,
                attempt,
                max_attempts,
                error
            );
            return Err(StageError::from_service(error, attempt));
        }

        attempt += 1;
        let delay = policy.backoff_before(attempt);
        on_event(RetryEvent::Retrying {
            attempt: attempt - 1,
            error: &error,
            delay,
        });
        tracing::debug!("{} retrying in {:?}: {}", service, delay, error);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(
            &fast_policy(3),
            &CancellationToken::new(),
            "music",
            |_| {},
            |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ServiceError::unavailable("music", "503"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: StageResult<()> = retry_with_backoff(
            &fast_policy(5),
            &CancellationToken::new(),
            "veo",
            |_| {},
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::content_policy("veo", "blocked")) }
            },
        )
        .await;

        assert!(matches!(result, Err(StageError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_attempts() {
        let mut retries = 0;
        let result: StageResult<()> = retry_with_backoff(
            &fast_policy(2),
            &CancellationToken::new(),
            "whisper",
            |event| {
                if matches!(event, RetryEvent::Retrying { .. }) {
                    retries += 1;
                }
            },
            |_| async { Err(ServiceError::rate_limited("whisper")) },
        )
        .await;

        assert!(matches!(
            result,
            Err(StageError::Transient { attempts: 2, .. })
        ));
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(20),
        };

        let result: StageResult<()> = retry_with_backoff(
            &policy,
            &CancellationToken::new(),
            "veo",
            |_| {},
            |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(StageError::Transient { source, .. }) => {
                assert!(matches!(source, ServiceError::Timeout { .. }))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_before_calling() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: StageResult<()> = retry_with_backoff(
            &fast_policy(3),
            &cancel,
            "lyrics",
            |_| {},
            |_| async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(StageError::Cancelled)));
    }
}
