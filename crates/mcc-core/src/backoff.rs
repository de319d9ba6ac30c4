//! Reconnect backoff policy.
//!
//! `delay(n) = min(ceiling, base * 2^min(n, cap_exponent))`. Growth saturates
//! at `cap_exponent`; past that every attempt waits `ceiling`.

use std::time::Duration;

/// Exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    cap_exponent: u32,
}

impl Backoff {
    /// Default base delay.
    pub const BASE: Duration = Duration::from_secs(1);
    /// Default upper bound on any delay.
    pub const CEILING: Duration = Duration::from_secs(30);
    /// Default attempt count at which growth stops.
    pub const CAP_EXPONENT: u32 = 5;

    /// Create a policy with custom parameters.
    pub const fn new(base: Duration, ceiling: Duration, cap_exponent: u32) -> Self {
        Self {
            base,
            ceiling,
            cap_exponent,
        }
    }

    /// Wait before reconnect attempt number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.cap_exponent);
        let factor = 2u32.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.ceiling)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::BASE, Self::CEILING, Self::CAP_EXPONENT)
    }
}

/// Delay for `attempt` under the default policy.
pub fn delay(attempt: u32) -> Duration {
    Backoff::default().delay(attempt)
}
