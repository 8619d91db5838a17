use std::fmt::{self, Debug};

use thiserror::Error;

/// Which kind of undo operation failed during rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoKind {
    /// The undo of an activity that executed successfully.
    Compensation,
    /// The cleanup of an activity interrupted mid-execution.
    Cancellation,
}

impl fmt::Display for UndoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compensation => f.write_str("compensation"),
            Self::Cancellation => f.write_str("cancellation"),
        }
    }
}

/// A single undo operation that failed during rollback.
#[derive(Debug, Error)]
#[error("{kind} failed for activity #{activity}")]
pub struct UndoError<E> {
    /// Registration index of the activity within its context.
    pub activity: usize,
    /// Whether the compensation or the cancellation delegate failed.
    pub kind: UndoKind,
    /// The underlying error from the delegate.
    #[source]
    pub error: E,
}

/// Error from a workflow context or one of its activities.
///
/// Protocol-violation variants indicate misuse of the API and are never
/// retried or suppressed. `Action` carries a caller delegate's failure
/// unmodified as its source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError<E: Debug> {
    /// The context was already completed.
    #[error("workflow already completed")]
    AlreadyCompleted,

    /// The context was already rolled back.
    #[error("workflow already rolled back")]
    AlreadyRolledBack,

    /// The context has been disposed; no further operations are permitted.
    #[error("workflow context is disposed")]
    Disposed,

    /// A compensation delegate was already attached to the activity.
    #[error("a compensation is already attached to this activity")]
    CompensationAlreadySet,

    /// A cancellation delegate was already attached to the activity.
    #[error("a cancellation is already attached to this activity")]
    CancellationAlreadySet,

    /// `execute` was re-entered while the activity's action was running.
    #[error("activity is already executing")]
    AlreadyExecuting,

    /// The activity's action failed.
    #[error("activity action failed")]
    Action {
        /// The error the action delegate returned.
        #[source]
        source: E,
    },

    /// The context rolled back, but some undo operations failed.
    #[error("rolled back, but {} undo operation(s) failed", failures.len())]
    RollbackIncomplete {
        /// Every undo failure, in the order the rollback encountered them.
        failures: Vec<UndoError<E>>,
    },
}
