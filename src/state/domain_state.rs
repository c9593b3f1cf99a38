use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the pacing state of a single domain
///
/// One of these exists per domain for the lifetime of the process. It is
/// never persisted.
#[derive(Debug, Clone)]
pub struct DomainRateState {
    /// When the last request to this domain was released
    pub last_request_time: Option<Instant>,

    /// Current minimum spacing between requests, in seconds
    pub current_delay: f64,
}

impl DomainRateState {
    /// Creates the state for a never-seen domain
    ///
    /// # Arguments
    ///
    /// * `base_delay` - Starting spacing in seconds (`domain-delay-base`)
    pub fn new(base_delay: f64) -> Self {
        Self {
            last_request_time: None,
            current_delay: base_delay,
        }
    }

    /// Calculates the time until the next request can be released
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let spacing = Duration::from_secs_f64(self.current_delay.max(0.0));
        let elapsed = now.saturating_duration_since(last);
        if elapsed < spacing {
            Some(spacing - elapsed)
        } else {
            None
        }
    }

    /// Records that a request was released at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.last_request_time = Some(now);
    }

    /// Adapts the spacing to an observed outcome
    ///
    /// A blocked outcome multiplies the delay by `increase-factor` (capped at
    /// `domain-delay-max`); a clean one multiplies it by `decrease-factor`
    /// (floored at `domain-delay-base`).
    pub fn record_outcome(&mut self, blocked: bool, policy: &RateLimitConfig) {
        self.current_delay = if blocked {
            (self.current_delay * policy.increase_factor).min(policy.domain_delay_max)
        } else {
            (self.current_delay * policy.decrease_factor).max(policy.domain_delay_base)
        };
    }
}
