use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Sleep schedule between fetch attempts
///
/// Attempt `n` (1-based) backs off `min(max, base * 2^(n-1))` seconds, plus up
/// to one second of uniform jitter, clamped into `[cooldown_min, cooldown_max]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: f64,
    max: f64,
    cooldown_min: f64,
    cooldown_max: f64,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(base: f64, max: f64, cooldown_min: f64, cooldown_max: f64) -> Self {
        Self {
            base,
            max,
            cooldown_min,
            cooldown_max,
            jitter: true,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.retry_backoff_base,
            config.retry_backoff_max,
            config.cooldown_min,
            config.cooldown_max,
        )
    }

    /// Exponential backoff in seconds before jitter and clamping
    pub fn raw_backoff(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        (self.base * 2f64.powi(exponent)).min(self.max)
    }

    /// Sleep to take after failed attempt `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter {
            rand::thread_rng().gen_range(0.0..1.0)
        } else {
            0.0
        };
        let seconds = (self.raw_backoff(attempt) + jitter)
            .min(self.cooldown_max)
            .max(self.cooldown_min);
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Uniform random pause in `[min_secs, max_secs]`
pub fn random_pause(min_secs: f64, max_secs: f64) -> Duration {
    let low = min_secs.max(0.0);
    let high = max_secs.max(low);
    if high <= low {
        return Duration::from_secs_f64(low);
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
}
