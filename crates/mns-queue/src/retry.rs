//! Release delays for failed jobs.
//!
//! A released job is re-published with a delay that grows with its delivery
//! count, plus jitter so that jobs failing together do not come back
//! together. MNS delays have second granularity.

use chrono::Duration;
use rand::Rng;

/// Exponential backoff policy for released jobs
///
/// # Examples
///
/// ```rust
/// use mns_queue::RetryPolicy;
/// use chrono::Duration;
///
/// // 10s, 20s, 40s ... up to 15 minutes
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.initial_delay, Duration::seconds(10));
///
/// let slow = RetryPolicy::new(Duration::minutes(1), Duration::hours(1), 3.0);
/// assert_eq!(slow.max_delay, Duration::hours(1));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Growth factor per additional delivery
    pub backoff_multiplier: f64,

    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::seconds(10),
            max_delay: Duration::minutes(15),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with ±25% jitter
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Always release with the same delay
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0).without_jitter()
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate the release delay after a failed attempt
    ///
    /// `attempts` is the job's delivery count (1 for the first delivery).
    /// The delay is `initial * multiplier^(attempts - 1)`, capped at
    /// `max_delay`, jittered, and rounded to whole seconds since MNS delays
    /// have second granularity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mns_queue::RetryPolicy;
    /// use chrono::Duration;
    ///
    /// let policy = RetryPolicy::new(Duration::seconds(10), Duration::seconds(60), 2.0)
    ///     .without_jitter();
    ///
    /// assert_eq!(policy.release_delay(1), Duration::seconds(10));
    /// assert_eq!(policy.release_delay(2), Duration::seconds(20));
    /// assert_eq!(policy.release_delay(5), Duration::seconds(60));
    /// ```
    pub fn release_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial_secs = self.initial_delay.num_milliseconds() as f64 / 1000.0;
        let max_secs = self.max_delay.num_milliseconds() as f64 / 1000.0;

        let base_delay_secs = initial_secs * self.backoff_multiplier.powi(exponent);
        let capped_delay_secs = base_delay_secs.min(max_secs);

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::seconds(final_delay_secs.round().max(0.0) as i64)
    }

    /// Uniform in `[delay * (1 - jitter), delay * (1 + jitter)]`, never negative
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + offset).max(0.0)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
