//! Bounded retry with exponential backoff for provider calls.

use std::future::Future;

use tokio::time::{sleep, timeout};

use crate::error::{EngineError, Result};
use crate::types::config::RetryPolicy;

/// Run a provider call under the retry policy.
///
/// Each attempt races the policy's hard deadline. Transient errors
/// (provider failures, timeouts) are retried with doubling backoff up to
/// `max_attempts`; everything else returns immediately. The caller decides
/// what exhaustion means - the engine degrades the round rather than
/// aborting the run.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        let outcome = match timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout { operation }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient provider failure, retrying"
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
