//! Output module for reporting crawl results
//!
//! This module handles:
//! - Summarizing the outcomes of a crawl batch
//! - Printing batch results to the console

mod summary;

pub use summary::{print_summary, BatchSummary};
