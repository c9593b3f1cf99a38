/// Task status definitions for the crawl queue
///
/// This module defines every status a task can hold and the legal edges between them.
use std::fmt;

/// Represents the current status of a task in the crawl queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Queue States =====
    /// Task is waiting to be claimed
    Pending,

    /// Task is leased to a worker
    Running,

    // ===== Crawl Results =====
    /// Page content was fetched and stored
    Downloaded,

    /// Every fetch attempt failed
    Error,

    /// Rejected by the domain gate or robots.txt before any fetch
    Skipped,

    // ===== Downstream States =====
    /// Advanced by the external analysis stage
    Analyzed,

    /// Advanced by the external optimization stage
    Optimized,
}

impl TaskStatus {
    /// Returns true if a re-enqueue of this task must be a no-op
    ///
    /// Active tasks are pending, running, downloaded, or analyzed.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Running | Self::Downloaded | Self::Analyzed
        )
    }

    /// Returns true if `next` is a legal successor of this status
    ///
    /// `Downloaded -> Analyzed -> Optimized` are owned by downstream stages
    /// and listed here only so the full pipeline is checkable.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Downloaded)
                | (Running, Error)
                | (Running, Skipped)
                | (Running, Pending)
                | (Downloaded, Analyzed)
                | (Analyzed, Optimized)
                | (Downloaded, Pending)
                | (Analyzed, Pending)
                | (Optimized, Pending)
                | (Error, Pending)
                | (Skipped, Pending)
        )
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Analyzed => "analyzed",
            Self::Optimized => "optimized",
        }
    }

    /// Parses a status from its stored string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "downloaded" => Some(Self::Downloaded),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            "analyzed" => Some(Self::Analyzed),
            "optimized" => Some(Self::Optimized),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Downloaded,
        TaskStatus::Error,
        TaskStatus::Skipped,
        TaskStatus::Analyzed,
        TaskStatus::Optimized,
    ];

    #[test]
    fn test_active_set() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::Downloaded.is_active());
        assert!(TaskStatus::Analyzed.is_active());

        assert!(!TaskStatus::Error.is_active());
        assert!(!TaskStatus::Skipped.is_active());
        assert!(!TaskStatus::Optimized.is_active());
    }

    #[test]
    fn test_crawl_results_only_from_running() {
        for status in ALL {
            let from_running = status == TaskStatus::Running;
            assert_eq!(
                status.can_transition_to(TaskStatus::Downloaded),
                from_running,
                "{} -> downloaded",
                status
            );
            assert_eq!(
                status.can_transition_to(TaskStatus::Error),
                from_running,
                "{} -> error",
                status
            );
            assert_eq!(
                status.can_transition_to(TaskStatus::Skipped),
                from_running,
                "{} -> skipped",
                status
            );
        }
    }

    #[test]
    fn test_claim_only_from_pending() {
        for status in ALL {
            assert_eq!(
                status.can_transition_to(TaskStatus::Running),
                status == TaskStatus::Pending
            );
        }
    }

    #[test]
    fn test_reset_edges() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Error.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Downloaded.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Analyzed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Downloaded));
    }

    #[test]
    fn test_roundtrip_db_string() {
        for status in ALL {
            let parsed = TaskStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(status), parsed, "Failed roundtrip for {:?}", status);
        }
        assert_eq!(TaskStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", TaskStatus::Pending), "pending");
        assert_eq!(format!("{}", TaskStatus::Downloaded), "downloaded");
    }
}
