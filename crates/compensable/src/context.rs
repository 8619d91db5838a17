use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::{debug, error};

use crate::activity::{Activity, ActivityWithResult};
use crate::erased::ErasedActivity;
use crate::error::{UndoError, UndoKind, WorkflowError};
use crate::order::ExecutionOrder;

/// A boxed compensation delegate for [`WorkflowContext::execute`].
pub type Compensation<E> = Box<dyn FnOnce() -> Result<(), E>>;

/// A boxed cancellation delegate for [`WorkflowContext::execute`].
pub type Cancellation<E> = Box<dyn FnOnce() -> Result<(), E>>;

/// A boxed compensation delegate that receives the action's value, for
/// [`WorkflowContext::execute_with_result`].
pub type ValueCompensation<T, E> = Box<dyn FnOnce(T) -> Result<(), E>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Active,
    Completed,
    RolledBack,
}

/// A compensating unit of work.
///
/// Callers register activities with [`act`](Self::act) or
/// [`act_with_result`](Self::act_with_result), execute them through the
/// returned handles, and finish by either [`complete`](Self::complete)
/// (confirming every activity) or [`roll_back`](Self::roll_back) (undoing
/// every activity that is not confirmed). A context that reaches neither
/// terminal state rolls back automatically when it is dropped — including
/// when the drop is driven by an error propagating out of the caller's code.
///
/// Rollback undoes activities in descending order of execution, mirroring a
/// stack discipline: the most recently executed activity is compensated
/// first, even when activities were executed in a different order than they
/// were registered.
///
/// The context is single-threaded and exclusively owned by one logical unit
/// of work; it holds no locks.
pub struct WorkflowContext<E: 'static> {
    activities: Vec<Rc<RefCell<dyn ErasedActivity<E>>>>,
    state: ContextState,
    disposed: bool,
    order: ExecutionOrder,
}

impl<E: 'static> WorkflowContext<E> {
    /// Create an empty, active context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            activities: Vec::new(),
            state: ContextState::Active,
            disposed: false,
            order: ExecutionOrder::default(),
        }
    }

    /// Whether the unit of work committed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state == ContextState::Completed
    }

    /// Whether the unit of work was undone.
    #[must_use]
    pub fn rolled_back(&self) -> bool {
        self.state == ContextState::RolledBack
    }

    /// Whether the context has been disposed.
    #[must_use]
    pub fn disposed(&self) -> bool {
        self.disposed
    }

    /// Roll back if no terminal state was reached, then block all further
    /// operations.
    ///
    /// Dropping the context does the same; this method exists so the
    /// post-disposal flags stay observable. Undo failures on this path are
    /// reported through `tracing` since they cannot be returned. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.state == ContextState::Active {
            let failures = self.undo_all();
            for failure in &failures {
                error!(
                    activity = failure.activity,
                    kind = %failure.kind,
                    "undo failed during implicit rollback: {failure}"
                );
            }
            self.state = ContextState::RolledBack;
        }
        self.disposed = true;
    }

    /// Undo every non-confirmed activity, most recently executed first.
    ///
    /// Activities that failed mid-execution carry no sequence number and
    /// sort last, so their cancellations run after all compensations.
    /// Failed undos do not stop the sweep; they are collected and returned.
    fn undo_all(&mut self) -> Vec<UndoError<E>> {
        let mut pending: Vec<(usize, Option<u64>)> = Vec::new();
        for (index, activity) in self.activities.iter().enumerate() {
            let activity = activity.borrow();
            if !activity.confirmed() {
                pending.push((index, activity.executed_seq()));
            }
        }
        pending.sort_by(|a, b| b.1.cmp(&a.1));

        let mut failures = Vec::new();
        for (index, seq) in pending {
            // Take the closure under a short borrow, then invoke it with the
            // borrow released so caller code can touch its own handle.
            let undo = {
                let mut activity = self.activities[index].borrow_mut();
                if seq.is_some() {
                    activity
                        .take_compensation()
                        .map(|f| (UndoKind::Compensation, f))
                } else if activity.is_executing() {
                    activity
                        .take_cancellation()
                        .map(|f| (UndoKind::Cancellation, f))
                } else {
                    None
                }
            };
            if let Some((kind, undo)) = undo {
                debug!(activity = index, kind = %kind, "running undo");
                if let Err(error) = undo() {
                    failures.push(UndoError {
                        activity: index,
                        kind,
                        error,
                    });
                }
            }
        }
        failures
    }
}

impl<E: Debug + 'static> WorkflowContext<E> {
    // Disposed is checked before the terminal states so that a disposed
    // context always fails with the disposed condition, even though implicit
    // disposal also rolled it back.
    fn guard(&self) -> Result<(), WorkflowError<E>> {
        if self.disposed {
            return Err(WorkflowError::Disposed);
        }
        match self.state {
            ContextState::Active => Ok(()),
            ContextState::Completed => Err(WorkflowError::AlreadyCompleted),
            ContextState::RolledBack => Err(WorkflowError::AlreadyRolledBack),
        }
    }

    /// Register a new activity without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Disposed`] on a disposed context, and
    /// [`WorkflowError::AlreadyCompleted`] / [`WorkflowError::AlreadyRolledBack`]
    /// once a terminal state was reached.
    pub fn act(
        &mut self,
        action: impl FnMut() -> Result<(), E> + 'static,
    ) -> Result<Activity<E>, WorkflowError<E>> {
        self.guard()?;
        let (handle, state) = Activity::new(action, self.order.clone());
        self.activities.push(state);
        debug!(activity = self.activities.len() - 1, "registered activity");
        Ok(handle)
    }

    /// Register a new activity whose action produces a value.
    ///
    /// The value returned by a successful execution is threaded into the
    /// activity's compensation delegate if rollback runs.
    ///
    /// # Errors
    ///
    /// Same guards as [`act`](Self::act).
    pub fn act_with_result<T: Clone + 'static>(
        &mut self,
        action: impl FnMut() -> Result<T, E> + 'static,
    ) -> Result<ActivityWithResult<T, E>, WorkflowError<E>> {
        self.guard()?;
        let (handle, state) = ActivityWithResult::new(action, self.order.clone());
        self.activities.push(state);
        debug!(activity = self.activities.len() - 1, "registered activity");
        Ok(handle)
    }

    /// Commit the unit of work and confirm every activity.
    ///
    /// No undo logic runs; confirmation order is unobservable.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Disposed`] on a disposed context,
    /// [`WorkflowError::AlreadyCompleted`] on a second call, and
    /// [`WorkflowError::AlreadyRolledBack`] after a rollback.
    pub fn complete(&mut self) -> Result<(), WorkflowError<E>> {
        self.guard()?;
        self.state = ContextState::Completed;
        for activity in &self.activities {
            activity.borrow_mut().confirm();
        }
        debug!(activities = self.activities.len(), "workflow completed");
        Ok(())
    }

    /// Undo every non-confirmed activity, most recently executed first.
    ///
    /// Executed activities run their compensation; activities that failed
    /// mid-execution run their cancellation; activities that never started
    /// are skipped. Confirmed activities are permanently exempt. The context
    /// is marked rolled back even when some undo operations fail.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Disposed`] on a disposed context,
    /// [`WorkflowError::AlreadyCompleted`] after a completion,
    /// [`WorkflowError::AlreadyRolledBack`] on a second call, and
    /// [`WorkflowError::RollbackIncomplete`] when undo delegates failed —
    /// the remaining undos still ran.
    pub fn roll_back(&mut self) -> Result<(), WorkflowError<E>> {
        self.guard()?;
        debug!(activities = self.activities.len(), "rolling back workflow");
        let failures = self.undo_all();
        self.state = ContextState::RolledBack;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::RollbackIncomplete { failures })
        }
    }

    /// Register, attach, and execute an activity in one call.
    ///
    /// Equivalent to
    /// `act(action)?.compensate_with(..)?.cancel_with(..)?.execute()`.
    ///
    /// # Errors
    ///
    /// Same guards as [`act`](Self::act), plus [`WorkflowError::Action`]
    /// when the action fails.
    pub fn execute(
        &mut self,
        action: impl FnMut() -> Result<(), E> + 'static,
        compensation: Option<Compensation<E>>,
        cancellation: Option<Cancellation<E>>,
    ) -> Result<(), WorkflowError<E>> {
        let mut activity = self.act(action)?;
        if let Some(compensation) = compensation {
            activity = activity.compensate_with(compensation)?;
        }
        if let Some(cancellation) = cancellation {
            activity = activity.cancel_with(cancellation)?;
        }
        activity.execute()
    }

    /// Register, attach, and execute a value-producing activity in one call.
    ///
    /// Equivalent to
    /// `act_with_result(action)?.compensate_with(..)?.cancel_with(..)?.execute()`.
    ///
    /// # Errors
    ///
    /// Same guards as [`act`](Self::act), plus [`WorkflowError::Action`]
    /// when the action fails.
    pub fn execute_with_result<T: Clone + 'static>(
        &mut self,
        action: impl FnMut() -> Result<T, E> + 'static,
        compensation: Option<ValueCompensation<T, E>>,
        cancellation: Option<Cancellation<E>>,
    ) -> Result<T, WorkflowError<E>> {
        let mut activity = self.act_with_result(action)?;
        if let Some(compensation) = compensation {
            activity = activity.compensate_with(compensation)?;
        }
        if let Some(cancellation) = cancellation {
            activity = activity.cancel_with(cancellation)?;
        }
        activity.execute()
    }
}

impl<E: 'static> Default for WorkflowContext<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Drop for WorkflowContext<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}
