//! Per-domain adaptive rate limiting
//!
//! Requests to one domain are released at least `current_delay` seconds apart.
//! Callers for the same domain queue on that domain's lock; callers for
//! different domains never contend. The delay grows when a domain blocks us
//! and shrinks back toward the base on clean responses.

use crate::config::RateLimitConfig;
use crate::state::DomainRateState;
use crate::url::extract_domain;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::trace;

struct DomainSlot {
    /// Serializes request release for the domain; held across the sleep
    turn: tokio::sync::Mutex<()>,
    state: Mutex<DomainRateState>,
}

impl DomainSlot {
    fn state(&self) -> MutexGuard<'_, DomainRateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-domain request pacing shared by every worker in a run
pub struct DomainRateLimiter {
    policy: RateLimitConfig,
    domains: Mutex<HashMap<String, Arc<DomainSlot>>>,
}

impl DomainRateLimiter {
    pub fn new(policy: RateLimitConfig) -> Self {
        Self {
            policy,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until a request to `url`'s domain may be released
    ///
    /// On return the domain's `last_request_time` is now.
    pub async fn wait(&self, url: &str) {
        let domain = domain_key(url);
        let slot = self.slot(&domain);

        let _turn = slot.turn.lock().await;

        let pause = slot.state().time_until_next_request(Instant::now());
        if let Some(pause) = pause {
            trace!("Rate limiting {}: sleeping {:?}", domain, pause);
            tokio::time::sleep(pause).await;
        }

        slot.state().record_request(Instant::now());
    }

    /// Adapts `url`'s domain delay to an observed outcome
    pub fn record(&self, url: &str, blocked: bool) {
        let domain = domain_key(url);
        let slot = self.slot(&domain);
        let mut state = slot.state();
        state.record_outcome(blocked, &self.policy);
        trace!(
            "Domain {} delay now {:.2}s (blocked: {})",
            domain,
            state.current_delay,
            blocked
        );
    }

    /// Current spacing for `url`'s domain, in seconds
    pub fn current_delay_secs(&self, url: &str) -> f64 {
        self.slot(&domain_key(url)).state().current_delay
    }

    fn slot(&self, domain: &str) -> Arc<DomainSlot> {
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        domains
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(DomainSlot {
                    turn: tokio::sync::Mutex::new(()),
                    state: Mutex::new(DomainRateState::new(self.policy.domain_delay_base)),
                })
            })
            .clone()
    }
}

/// Unparseable URLs share a bucket keyed by the raw string
fn domain_key(url: &str) -> String {
    extract_domain(url).unwrap_or_else(|| url.to_string())
}
