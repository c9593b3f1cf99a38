//! URL handling module for Leasecrawl
//!
//! This module provides URL normalization and hashing (task identity),
//! domain extraction, and the allow/deny domain gate.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::{is_domain_allowed, matches_wildcard};
pub use normalize::{hash_normalized, normalize_url, url_hash};
