//! Generic retry with exponential backoff for transient failures.
//!
//! This module provides the [`RetryPolicy`] configuration, the
//! [`ErrorClass`] classification, and the [`execute`] combinator that wraps
//! any fallible async operation with bounded retry.
//!
//! # Overview
//!
//! Callers supply the operation closure and an error classifier; the
//! combinator owns the loop, the delay computation, and cancellation. This
//! keeps retry behavior identical across very different call sites (page
//! navigation, element extraction, cloud uploads) without coupling the
//! controller to any of them.
//!
//! Fatal errors return immediately as [`RetryError::Fatal`]. Transient
//! errors are retried until the policy's attempt budget runs out, at which
//! point the last error is returned inside [`RetryError::Exhausted`] along
//! with the number of invocations made.
//!
//! # Example
//!
//! ```
//! use docsync_core::retry::{self, ErrorClass, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let policy = RetryPolicy::default();
//! let cancel = CancellationToken::new();
//!
//! let result: Result<u32, _> = retry::execute(
//!     &policy,
//!     &cancel,
//!     |_e: &std::io::Error| ErrorClass::Transient,
//!     || async { Ok(42) },
//! )
//! .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default total attempts, including the initial one.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default base delay for the first retry (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay cap (60 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default upper bound of the uniform jitter added to each delay (500ms).
const DEFAULT_JITTER_RANGE: Duration = Duration::from_millis(500);

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Failure that will not succeed regardless of retries.
    Fatal,
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error> {
    /// The classifier deemed the error fatal; it is returned unchanged.
    #[error(transparent)]
    Fatal(E),

    /// All attempts were consumed; carries the last error and the total
    /// number of invocations made.
    #[error("operation failed after {attempts} attempts: {source}")]
    Exhausted {
        /// The last underlying error.
        #[source]
        source: E,
        /// Number of times the operation was invoked.
        attempts: u32,
    },

    /// The run-level cancellation signal fired during a backoff sleep.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E: std::error::Error> RetryError<E> {
    /// Returns the underlying error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Fatal(e) | Self::Exhausted { source: e, .. } => Some(e),
            Self::Cancelled => None,
        }
    }
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + jitter
/// ```
///
/// where `jitter` is sampled uniformly from `[0, jitter_range]`. With the
/// exponential flag off, every delay is `base_delay + jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the initial one (>= 1).
    attempts: u32,
    /// Base delay before the first retry.
    base_delay: Duration,
    /// Delay cap.
    max_delay: Duration,
    /// Whether the delay doubles each attempt.
    exponential: bool,
    /// Upper bound of the uniform jitter added to each delay.
    jitter_range: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            exponential: true,
            jitter_range: DEFAULT_JITTER_RANGE,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit attempts, base delay, and backoff mode.
    ///
    /// `attempts` is clamped to a minimum of 1 so a policy can never spin
    /// forever or refuse the initial attempt.
    #[must_use]
    pub fn new(attempts: u32, base_delay: Duration, exponential: bool) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            exponential,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom attempt count and default delays.
    #[must_use]
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Overrides the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Overrides the jitter range.
    #[must_use]
    pub fn with_jitter_range(mut self, jitter_range: Duration) -> Self {
        self.jitter_range = jitter_range;
        self
    }

    /// Builds a policy from a site's `error_handling` block.
    #[must_use]
    pub fn from_error_handling(handling: &crate::config::ErrorHandling) -> Self {
        Self::new(
            handling.retry_attempts,
            Duration::from_secs_f64(handling.retry_delay.max(0.0)),
            handling.exponential_backoff,
        )
    }

    /// Returns the configured attempt count.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Computes the backoff delay after the given failed attempt (1-indexed).
    ///
    /// The deterministic part is `base * 2^(attempt-1)` capped at the
    /// configured maximum; uniform jitter in `[0, jitter_range]` is added on
    /// top to avoid synchronized retry storms.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let scaled_ms = if self.exponential {
            let exponent = attempt.saturating_sub(1);
            base_ms * 2f64.powi(exponent.min(32) as i32)
        } else {
            base_ms
        };
        let capped_ms = scaled_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let range_ms = self.jitter_range.as_millis() as u64;
        if range_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=range_ms))
    }
}

/// Executes `op` under `policy`, retrying transient failures with backoff.
///
/// `classify` decides whether a failure is worth retrying. The backoff
/// sleep races `cancel`; cancellation surfaces as [`RetryError::Cancelled`]
/// without invoking the operation again.
///
/// # Errors
///
/// - [`RetryError::Fatal`] when `classify` returns [`ErrorClass::Fatal`]
/// - [`RetryError::Exhausted`] when the attempt budget runs out
/// - [`RetryError::Cancelled`] when the cancellation token fires
pub async fn execute<T, E, C, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classify: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error,
    C: Fn(&E) -> ErrorClass,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if classify(&error) == ErrorClass::Fatal {
                    debug!(attempt, error = %error, "fatal failure, not retrying");
                    return Err(RetryError::Fatal(error));
                }

                if attempt >= policy.attempts {
                    return Err(RetryError::Exhausted {
                        source: error,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );

                tokio::select! {
                    () = cancel.cancelled() => return Err(RetryError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
