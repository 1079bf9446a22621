//! Jittered linear backoff between retries of the same entry.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::BackoffPolicy;

/// Produces the pause before retry number `attempt`.
///
/// The window grows as `base * attempt` up to `cap`; the actual pause is
/// drawn from the upper half of the window so that workers failing together
/// do not reconnect in lockstep.
pub(crate) struct RetryBackoff {
    policy: BackoffPolicy,
    rng: StdRng,
}

impl RetryBackoff {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Upper bound of the pause after `attempt` failures.
    pub(crate) fn window(&self, attempt: u32) -> Duration {
        self.policy.base.saturating_mul(attempt).min(self.policy.cap)
    }

    pub(crate) fn delay(&mut self, attempt: u32) -> Duration {
        let max_ms = u64::try_from(self.window(attempt).as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let min_ms = max_ms.div_ceil(2);
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }
}
