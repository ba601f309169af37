//! Bounded retry with exponential backoff and jitter for Home Assistant
//! REST calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Number of tries before giving up.
pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Starting backoff interval (before jitter).
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Cap on the backoff interval.
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Executes `op` up to `max_attempts` times with exponential backoff and
/// jitter. Terminal errors (invalid credentials, cancellation) short-circuit
/// immediately; cancellation is also honored before each attempt and during
/// the backoff sleep.
pub(crate) async fn retry<T, F, Fut>(
    cancel: &CancelToken,
    max_attempts: u32,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = Error::Remote("retry invoked with zero attempts".into());

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => {
                tracing::warn!(attempt = attempt + 1, error = %err, "remote call failed");
                last_err = err;
            }
        }

        if attempt + 1 < max_attempts {
            let delay = backoff_delay(attempt);
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(last_err)
}

/// Delay for a given attempt index: exponential growth capped at
/// [`MAX_DELAY`], with uniform jitter in `[delay/2, delay)`.
fn backoff_delay(attempt: u32) -> Duration {
    let delay = BASE_DELAY
        .saturating_mul(1 << attempt.min(16))
        .min(MAX_DELAY);
    let half = delay / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..half.as_millis().max(1) as u64);
    half + Duration::from_millis(jitter_ms)
}
