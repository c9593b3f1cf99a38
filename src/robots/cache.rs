//! Robots.txt cache entries

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt rules for a domain
#[derive(Debug, Clone)]
pub struct RobotsCacheEntry {
    /// The parsed rule set
    pub rules: ParsedRobots,

    /// When this entry stops being served
    pub expires_at: DateTime<Utc>,
}

impl RobotsCacheEntry {
    /// Creates an entry fetched at `now` that lives for `ttl`
    pub fn new(rules: ParsedRobots, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            rules,
            expires_at: now + ttl,
        }
    }

    /// Checks whether the entry must be refetched
    ///
    /// # Returns
    ///
    /// * `true` - If `now` has reached `expires_at`
    /// * `false` - If the entry is still fresh
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
