//! Exponential backoff with jitter for reconnection attempts.
//!
//! When a connection fails, retrying immediately can overwhelm a recovering
//! relay. The delay before attempt *n* (0-indexed) is:
//!
//! ```text
//! delay[n] = min(base * 2^n, cap) + uniform(0, 0.5 * min(base * 2^n, cap))
//! ```
//!
//! With the defaults (base = 100 ms, cap = 30 s):
//! - attempt 0: 100–150 ms
//! - attempt 1: 200–300 ms
//! - attempt 2: 400–600 ms
//! - ...
//! - attempt 9+: 30–45 s (saturated)
//!
//! The jitter spreads simultaneous clients apart after a shared outage. The
//! controller never gives up: the attempt counter only feeds the delay
//! exponent, and it resets to zero on every successful registration so that
//! small-scale recovery stays fast.
//!
//! # Examples
//!
//! ```ignore
//! let mut backoff = Backoff::default();
//!
//! // First retry: 100-150 ms.
//! let delay = backoff.next_delay();
//! tokio::time::sleep(delay).await;
//!
//! // ... registration succeeds ...
//! backoff.reset();
//! ```

use std::time::Duration;

use rand::Rng;

/// Default initial delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(100);

/// Default cap on the un-jittered delay.
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Backoff controller for the reconnect loop.
///
/// Not shared across threads: it lives inside the connection manager, which
/// is the only task that ever sleeps on it.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay for attempt 0, before jitter.
    base: Duration,

    /// Upper bound on the un-jittered delay. With jitter the actual sleep can
    /// reach 1.5x this value.
    cap: Duration,

    /// Count of consecutive failed attempts since the last reset.
    attempt: u32,
}

impl Backoff {
    /// Creates a controller with custom timing parameters.
    ///
    /// # Arguments
    /// - `base`: delay before the first retry (default 100 ms)
    /// - `cap`: ceiling on the un-jittered delay (default 30 s)
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Resets the attempt counter.
    ///
    /// Called after every successful registration so the next failure starts
    /// over at the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of consecutive failures recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the next sleep duration and advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = (self.base.as_millis() as u64)
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX));
        let capped_ms = base_ms.min(self.cap.as_millis() as u64);
        let jitter_ms = (rand::thread_rng().gen::<f64>() * capped_ms as f64 * 0.5) as u64;
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(capped_ms + jitter_ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_DELAY, MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_jitter_bounds() {
        // For each attempt n the delay must lie in
        // [min(base*2^n, cap), 1.5 * min(base*2^n, cap)].
        let mut backoff = Backoff::default();
        for n in 0u32..12 {
            let expected = (100u64 * 2u64.pow(n)).min(30_000);
            let delay = backoff.next_delay().as_millis() as u64;
            assert!(
                delay >= expected && delay <= expected + expected / 2,
                "attempt {n}: delay {delay}ms outside [{expected}, {}]",
                expected + expected / 2
            );
        }
    }

    #[test]
    fn test_delay_saturates_at_cap() {
        let mut backoff = Backoff::default();
        for _ in 0..80 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_millis(45_000));
        }
        // Well past saturation, the floor is the cap itself.
        assert!(backoff.next_delay() >= Duration::from_secs(30));
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(150));
    }

    #[test]
    fn test_extreme_attempt_does_not_overflow() {
        let mut backoff = Backoff::default();
        backoff.attempt = u32::MAX;
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_secs(30));
        assert!(delay <= Duration::from_millis(45_000));
    }
}
