//! Model invocation: drive one prompt through the client with retries.
//!
//! This module is intentionally thin — prompt construction lives in
//! [`crate::prompts`] and response interpretation in
//! [`super::parse`], so retry and time-budget logic can change without
//! touching either.
//!
//! ## Retry Strategy
//!
//! Local model servers fail in two distinct ways. Transient faults
//! (connection refused while restarting, HTTP 5xx) are retried after an
//! exponential backoff (`retry_backoff_ms * 2^attempt`): with the 500 ms
//! default and 3 attempts the wait sequence is 500 ms → 1 s. Timeouts mean
//! the model needed longer than the budget, so on top of the backoff the
//! next attempt's time budget is multiplied by `timeout_growth`; other
//! failures keep the current budget. Every failure consumes one attempt
//! from `max_attempts`, and exhaustion yields
//! [`ModelError::Unavailable`] carrying the last error.
//!
//! Cancellation is checked with `select!` around the backoff sleep and the
//! in-flight call: dropping the client future aborts the underlying
//! request.

use crate::config::GradingConfig;
use crate::error::ModelError;
use crate::model::GenerateClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a successful invocation produced.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    /// Raw response text of the successful attempt.
    pub text: String,
    /// Attempts issued, including the successful one.
    pub attempts: u32,
}

/// Calls the model until one attempt succeeds or the budget is exhausted.
pub async fn call_with_retries(
    client: &Arc<dyn GenerateClient>,
    prompt: &str,
    config: &GradingConfig,
    cancel: &CancellationToken,
) -> Result<InvokeOutcome, ModelError> {
    let start = Instant::now();
    let mut timeout_ms = config.request_timeout_ms;
    let mut last_err: Option<ModelError> = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                attempt = attempt + 1,
                max_attempts = config.max_attempts,
                backoff_ms = backoff,
                "retrying model call"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                _ = sleep(Duration::from_millis(backoff)) => {}
            }
        }

        match one_attempt(client, prompt, timeout_ms, attempt, cancel).await {
            Ok(text) => {
                debug!(
                    attempts = attempt + 1,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    response_chars = text.len(),
                    "model call succeeded"
                );
                return Ok(InvokeOutcome {
                    text,
                    attempts: attempt + 1,
                });
            }
            Err(ModelError::Cancelled) => return Err(ModelError::Cancelled),
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "model attempt failed");
                if e.is_timeout() {
                    timeout_ms = grow_timeout(timeout_ms, config.timeout_growth);
                }
                last_err = Some(e);
            }
        }
    }

    let last_error = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    Err(ModelError::Unavailable {
        attempts: config.max_attempts,
        last_error,
    })
}

/// One attempt: the client future raced against its time budget and the
/// cancellation token.
async fn one_attempt(
    client: &Arc<dyn GenerateClient>,
    prompt: &str,
    timeout_ms: u64,
    attempt: u32,
    cancel: &CancellationToken,
) -> Result<String, ModelError> {
    let budget = Duration::from_millis(timeout_ms);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ModelError::Cancelled),
        res = timeout(budget, client.generate(prompt)) => match res {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ModelError::Timeout {
                attempt: attempt + 1,
                timeout_ms,
            }),
        },
    }
}

/// Next attempt's time budget after a timeout. Strictly greater than the
/// current one even for degenerate inputs.
fn grow_timeout(current_ms: u64, factor: f64) -> u64 {
    let grown = (current_ms as f64 * factor).ceil();
    grown.max(current_ms as f64 + 1.0) as u64
}
