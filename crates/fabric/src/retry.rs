//! Retry for idempotent ledger reads.
//!
//! Evaluates that fail with a transient error ([`FabricError::is_transient`])
//! are re-run with exponential backoff; any other error ends the loop at once.
//! Submits never come through here: a write whose outcome is unknown must not
//! be replayed.
//!
//! The delay before retry `n` (zero-based) is
//! `min(initial_backoff * 2^n, max_backoff)`, stretched by a random factor in
//! `[1.0, 1.5]`.

use std::{fmt, future::Future, time::Duration};

use fail::fail_point;
use parking_lot::Mutex;
use rand::Rng;

use crate::{
    config::RetryConfig,
    error::{FabricError, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Request,
    Backoff,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Backoff => "backoff",
        })
    }
}

/// How far an evaluate loop got, kept outside the loop's future so it can
/// still be read after the budget cancels it.
#[derive(Debug, Default)]
struct Progress {
    failed_attempts: u32,
    phase: Phase,
    last_error: Option<String>,
}

impl Progress {
    fn record_failure(&mut self, err: &FabricError, phase: Phase) {
        self.failed_attempts += 1;
        self.phase = phase;
        self.last_error = Some(err.to_string());
    }

    fn timeout_error(&self, function: &'static str, budget: Duration) -> FabricError {
        let mut message = format!(
            "timed out after {}ms during {} ({} attempts completed)",
            budget.as_millis(),
            self.phase,
            self.failed_attempts
        );
        if let Some(last) = &self.last_error {
            message.push_str("; last error: ");
            message.push_str(last);
        }
        FabricError::ledger_read(function, message)
    }
}

/// Runs `evaluate` until it succeeds, fails permanently, or exhausts
/// `config.max_retries`, all within `budget`.
///
/// An expired budget yields [`FabricError::LedgerRead`] naming the phase the
/// loop was in and the last error seen.
pub(crate) async fn evaluate_with_retry<F, Fut, T>(
    config: &RetryConfig,
    budget: Duration,
    function: &'static str,
    evaluate: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let progress = Mutex::new(Progress::default());

    match tokio::time::timeout(budget, retry_loop(config, function, evaluate, &progress)).await {
        Ok(result) => result,
        Err(_) => Err(progress.lock().timeout_error(function, budget)),
    }
}

#[tracing::instrument(skip(config, evaluate, progress), fields(max_retries = config.max_retries))]
async fn retry_loop<F, Fut, T>(
    config: &RetryConfig,
    function: &'static str,
    mut evaluate: F,
    progress: &Mutex<Progress>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        progress.lock().phase = Phase::Request;

        let err = match evaluate().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::debug!(function, retries = retry, "evaluate recovered");
                }
                return Ok(value);
            },
            Err(err) => err,
        };

        if !err.is_transient() || retry >= config.max_retries {
            progress.lock().record_failure(&err, Phase::Request);
            if retry > 0 && err.is_transient() {
                let attempts = retry + 1;
                tracing::warn!(function, attempts, error = %err, "giving up on evaluate");
            }
            return Err(err);
        }

        let delay = backoff(config, retry);
        tracing::debug!(
            function,
            attempt = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "evaluate failed transiently, backing off",
        );
        progress.lock().record_failure(&err, Phase::Backoff);

        fail_point!("retry-before-sleep");
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

/// Delay before retry number `retry` (zero-based).
fn backoff(config: &RetryConfig, retry: u32) -> Duration {
    let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
    let delay = config.initial_backoff.saturating_mul(factor).min(config.max_backoff);
    delay.mul_f64(rand::rng().random_range(1.0..=1.5))
}
