//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskStatus`: The status of a task in the shared queue and its legal transitions
//! - `DomainRateState`: Per-domain pacing state used by the rate limiter

mod domain_state;
mod task_status;

// Re-export main types
pub use domain_state::DomainRateState;
pub use task_status::TaskStatus;
