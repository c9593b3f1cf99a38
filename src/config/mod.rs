//! Configuration module for Leasecrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use leasecrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("leasecrawl.toml")).unwrap();
//! println!("Max concurrent fetches: {}", config.crawler.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ConfigOverrides, CrawlerConfig, DomainsConfig, QueueConfig, RateLimitConfig,
    RobotsConfig, SignalsConfig, StorageConfig, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
