//! Bounded retry with exponential backoff and jitter for provider calls.

use std::time::Duration;

use log::warn;

use crate::config::VoiceConfig;

const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER_FACTOR: f32 = 0.5;

/// How often and how patiently to retry a failed synthesis.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomises each delay by up to +/- (factor * delay).
    pub jitter_factor: f32,
}

impl RetryPolicy {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay_ms: config.initial_backoff_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS.max(config.initial_backoff_ms),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before attempt `attempt` (0-indexed); the first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self
            .initial_delay_ms
            .saturating_mul(1 << (attempt - 1).min(10));
        let capped = base.min(self.max_delay_ms);

        let delay = if self.jitter_factor > 0.0 {
            let range = (capped as f32 * self.jitter_factor) as u64;
            let jitter = random_u64() % (range * 2 + 1);
            capped.saturating_sub(range).saturating_add(jitter)
        } else {
            capped
        };
        Duration::from_millis(delay)
    }
}

/// Errors that know whether trying again could help.
pub trait RetryableError {
    /// Rate limiting, server errors, and transport failures are transient.
    fn is_retryable(&self) -> bool;

    /// Server-requested wait (`Retry-After`), if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts. The last error is returned in the latter two cases.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: RetryableError + std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() || attempt + 1 >= attempts => return Err(err),
            Err(err) => {
                attempt += 1;
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.delay_for_attempt(attempt));
                warn!(
                    "Attempt {}/{} failed ({}); retrying in {:?}",
                    attempt, attempts, err, delay
                );
                std::thread::sleep(delay);
            }
        }
    }
}

/// xorshift; jitter only needs to spread callers apart.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64 | 1)
                .unwrap_or(0x9E37_79B9_7F4A_7C15)
        );
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}
