//! Housekeeping policy of the writer worker.

/// What the worker does when the queue has been idle for a full timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Nothing changed since the last flush.
    Idle,
    /// Commit so snapshots can see the changes.
    Flush,
    /// Enough changed to merge the index down to one segment.
    Optimize,
}

/// Decide the idle action from the number of jobs applied since the last
/// flush or optimize.
pub fn idle_action(applied_since_flush: usize, optimize_threshold: usize) -> IdleAction {
    if applied_since_flush > optimize_threshold {
        IdleAction::Optimize
    } else if applied_since_flush > 0 {
        IdleAction::Flush
    } else {
        IdleAction::Idle
    }
}
