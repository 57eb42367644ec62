//! Retry with backoff for idempotent asynchronous operations.

use std::future::Future;
use std::time::Duration;

/// Exponential backoff: `2^attempt` milliseconds.
///
/// Saturates instead of overflowing for large attempt numbers.
pub fn exponential_backoff(attempt: u32) -> Duration {
    Duration::from_millis(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
}

/// Run `operation` up to `max_attempts` times.
///
/// After a failed attempt `n` (1-based) the policy sleeps for `backoff(n)`
/// before trying again. When every attempt fails the error of the last
/// attempt is returned. `max_attempts` of zero is treated as one.
///
/// # Arguments
/// * `operation` - Factory producing a fresh future for each attempt
/// * `max_attempts` - Total attempts including the first one
/// * `backoff` - Delay to wait after the given failed attempt
pub async fn with_retry<T, E, F, Fut, B>(
    mut operation: F,
    max_attempts: u32,
    backoff: B,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(u32) -> Duration,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("[Retry] Succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(err) if attempt < max_attempts => {
                let delay = backoff(attempt);
                log::warn!(
                    "[Retry] Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                log::error!(
                    "[Retry] Giving up after {} attempts: {}",
                    max_attempts,
                    err
                );
                return Err(err);
            }
        }
    }
}
