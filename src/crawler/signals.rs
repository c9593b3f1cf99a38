//! Block-signal classification
//!
//! Flags fetched pages that look like a bot challenge or denial page rather
//! than real content. The result is advisory: flagged content is still stored.

use crate::config::SignalsConfig;

/// Classifies fetched pages by status code and challenge phrases
#[derive(Debug, Clone)]
pub struct BlockClassifier {
    /// Lowercased phrases
    phrases: Vec<String>,
}

impl BlockClassifier {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &SignalsConfig) -> Self {
        Self::new(&config.phrases)
    }

    /// Returns the block signals present in a fetched page
    ///
    /// Emits `http_403` / `http_429` for those statuses, then one token per
    /// phrase found case-insensitively in `content`. Tokens are distinct and in
    /// a stable order.
    pub fn classify(&self, content: &str, http_status: Option<u16>) -> Vec<String> {
        let mut signals = Vec::new();

        match http_status {
            Some(403) => signals.push("http_403".to_string()),
            Some(429) => signals.push("http_429".to_string()),
            _ => {}
        }

        let lowered = content.to_lowercase();
        for phrase in &self.phrases {
            if lowered.contains(phrase.as_str()) && !signals.contains(phrase) {
                signals.push(phrase.clone());
            }
        }

        signals
    }
}

impl Default for BlockClassifier {
    fn default() -> Self {
        Self::from_config(&SignalsConfig::default())
    }
}
