//! Batch summary generation
//!
//! Condenses the per-task results of one crawl batch into counts for display.

use crate::crawler::TaskOutcome;
use crate::state::TaskStatus;
use crate::CrawlError;

/// Counts for one crawl batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Targets in the batch
    pub total: usize,

    /// Targets downloaded (blocked-suspected pages included)
    pub succeeded: usize,

    /// Downloads that looked like a block page
    pub blocked_suspected: usize,

    /// Targets skipped by domain or robots policy
    pub skipped: usize,

    /// Targets whose retries were exhausted
    pub failed: usize,

    /// Targets reclaimed by another worker before their outcome was written
    pub lease_lost: usize,

    /// Targets whose outcome could not be recorded at all
    pub hard_failures: usize,
}

impl BatchSummary {
    /// Builds a summary from batch results
    pub fn from_results(results: &[Result<TaskOutcome, CrawlError>]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };

        for result in results {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    summary.hard_failures += 1;
                    continue;
                }
            };

            if outcome.lease_lost {
                summary.lease_lost += 1;
                continue;
            }
            if outcome.success {
                summary.succeeded += 1;
            }
            if outcome.blocked_suspected {
                summary.blocked_suspected += 1;
            }
            match outcome.status {
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Error => summary.failed += 1,
                _ => {}
            }
        }

        summary
    }

    /// One-line completion report
    pub fn completion_line(&self) -> String {
        format!(
            "Completed: {}/{} | Blocked suspected: {}",
            self.succeeded, self.total, self.blocked_suspected
        )
    }
}

/// Prints a batch summary to stdout
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &BatchSummary) {
    println!("{}", summary.completion_line());

    if summary.skipped > 0 {
        println!("  Skipped by policy: {}", summary.skipped);
    }
    if summary.failed > 0 {
        println!("  Failed after retries: {}", summary.failed);
    }
    if summary.lease_lost > 0 {
        println!("  Lease lost (left to current holder): {}", summary.lease_lost);
    }
    if summary.hard_failures > 0 {
        println!("  Unrecorded (store errors): {}", summary.hard_failures);
    }
}
