//! Task processing status for event-facing entry points.

use serde::{Deserialize, Serialize};

/// Result of processing a single event or configuration task.
///
/// Top-level configuration operations report success or failure through
/// `Result`; this classification exists for event dispatch, where a
/// stale or duplicate event is not an error but must be distinguishable
/// from real work having been done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Task failed due to invalid input
    InvalidEntry,
    /// Task failed (generic)
    Failed,
    /// Task was ignored (duplicate event, already-deleted object, etc.)
    Ignore,
}

impl TaskStatus {
    /// Returns true if the task completed without doing harm.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    /// Returns true if the task failed permanently.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::InvalidEntry | TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_classification() {
        assert!(TaskStatus::Success.is_success());
        assert!(TaskStatus::Ignore.is_success());
        assert!(!TaskStatus::Failed.is_success());

        assert!(TaskStatus::Failed.is_failure());
        assert!(TaskStatus::InvalidEntry.is_failure());
        assert!(!TaskStatus::Ignore.is_failure());
    }
}
