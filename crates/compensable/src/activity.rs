use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::erased::{ErasedActivity, UndoFn};
use crate::error::WorkflowError;
use crate::order::ExecutionOrder;

type ActionFn<T, E> = Box<dyn FnMut() -> Result<T, E>>;
type CompensateFn<T, E> = Box<dyn FnOnce(T) -> Result<(), E>>;

/// Shared engine behind both activity variants.
///
/// The unit-producing variant is `ActivityState<(), E>`; the value-producing
/// variant caches the action's result so a later compensation receives it.
pub(crate) struct ActivityState<T, E> {
    action: Option<ActionFn<T, E>>,
    compensation: Option<CompensateFn<T, E>>,
    cancellation: Option<UndoFn<E>>,
    // Rollback consumes the closures, so presence flags rather than the
    // Options enforce "attach at most once".
    compensation_set: bool,
    cancellation_set: bool,
    result: Option<T>,
    executed_seq: Option<u64>,
    executing: bool,
    confirmed: bool,
}

impl<T, E> ActivityState<T, E> {
    fn new(action: ActionFn<T, E>) -> Self {
        Self {
            action: Some(action),
            compensation: None,
            cancellation: None,
            compensation_set: false,
            cancellation_set: false,
            result: None,
            executed_seq: None,
            executing: false,
            confirmed: false,
        }
    }
}

impl<T: 'static, E: 'static> ErasedActivity<E> for ActivityState<T, E> {
    fn executed_seq(&self) -> Option<u64> {
        self.executed_seq
    }

    fn is_executing(&self) -> bool {
        self.executing
    }

    fn confirmed(&self) -> bool {
        self.confirmed
    }

    fn confirm(&mut self) {
        self.confirmed = true;
    }

    fn take_compensation(&mut self) -> Option<UndoFn<E>> {
        self.result.as_ref()?;
        let compensation = self.compensation.take()?;
        let value = self.result.take()?;
        Some(Box::new(move || compensation(value)))
    }

    fn take_cancellation(&mut self) -> Option<UndoFn<E>> {
        self.cancellation.take()
    }
}

/// Runs the action with the activity borrow released, so the caller's
/// closure can freely inspect its own handle.
fn run_action<T, E>(
    state: &Rc<RefCell<ActivityState<T, E>>>,
    order: &ExecutionOrder,
) -> Result<T, WorkflowError<E>>
where
    T: Clone + 'static,
    E: Debug + 'static,
{
    let taken = {
        let mut inner = state.borrow_mut();
        inner.executing = true;
        inner.action.take()
    };
    let Some(mut action) = taken else {
        return Err(WorkflowError::AlreadyExecuting);
    };

    let outcome = action();

    let mut inner = state.borrow_mut();
    inner.action = Some(action);
    match outcome {
        Ok(value) => {
            inner.executing = false;
            inner.executed_seq = Some(order.next());
            inner.result = Some(value.clone());
            Ok(value)
        }
        // `executing` stays true: the owning context reads it to choose
        // cancellation over compensation at rollback.
        Err(source) => Err(WorkflowError::Action { source }),
    }
}

/// Handle to a registered unit of work with optional undo behavior.
///
/// Returned by [`WorkflowContext::act`](crate::WorkflowContext::act). The
/// attach methods consume and return the handle, so delegates chain with `?`:
///
/// ```
/// use compensable::WorkflowContext;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("storage failure")]
/// struct StorageError;
///
/// let mut ctx = WorkflowContext::<StorageError>::new();
/// ctx.act(|| Ok(()))?
///     .compensate_with(|| Ok(()))?
///     .execute()?;
/// ctx.complete()?;
/// # Ok::<(), compensable::WorkflowError<StorageError>>(())
/// ```
pub struct Activity<E> {
    state: Rc<RefCell<ActivityState<(), E>>>,
    order: ExecutionOrder,
}

impl<E> Debug for Activity<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity").finish_non_exhaustive()
    }
}

impl<E: Debug + 'static> Activity<E> {
    pub(crate) fn new(
        action: impl FnMut() -> Result<(), E> + 'static,
        order: ExecutionOrder,
    ) -> (Self, Rc<RefCell<ActivityState<(), E>>>) {
        let state = Rc::new(RefCell::new(ActivityState::new(Box::new(action))));
        let shared = Rc::clone(&state);
        (Self { state, order }, shared)
    }

    /// Attach the undo delegate, run if the activity executed but the
    /// context does not complete.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::CompensationAlreadySet`] if a compensation
    /// was already attached.
    pub fn compensate_with(
        self,
        compensation: impl FnOnce() -> Result<(), E> + 'static,
    ) -> Result<Self, WorkflowError<E>> {
        {
            let mut inner = self.state.borrow_mut();
            if inner.compensation_set {
                return Err(WorkflowError::CompensationAlreadySet);
            }
            inner.compensation_set = true;
            inner.compensation = Some(Box::new(move |()| compensation()));
        }
        Ok(self)
    }

    /// Attach the cleanup delegate, run if the action fails mid-execution.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::CancellationAlreadySet`] if a cancellation
    /// was already attached.
    pub fn cancel_with(
        self,
        cancellation: impl FnOnce() -> Result<(), E> + 'static,
    ) -> Result<Self, WorkflowError<E>> {
        {
            let mut inner = self.state.borrow_mut();
            if inner.cancellation_set {
                return Err(WorkflowError::CancellationAlreadySet);
            }
            inner.cancellation_set = true;
            inner.cancellation = Some(Box::new(cancellation));
        }
        Ok(self)
    }

    /// Invoke the action.
    ///
    /// On success the activity is stamped with its execution sequence. On
    /// failure the activity is left in the executing state, which marks it
    /// for cancellation rather than compensation at rollback.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Action`] carrying the action's error, or
    /// [`WorkflowError::AlreadyExecuting`] on a re-entrant call.
    pub fn execute(&self) -> Result<(), WorkflowError<E>> {
        run_action(&self.state, &self.order)
    }

    /// Irrevocably exempt this activity from compensation and cancellation.
    ///
    /// Idempotent.
    pub fn confirm(&self) {
        self.state.borrow_mut().confirm();
    }

    /// Whether the action ran to completion.
    #[must_use]
    pub fn executed(&self) -> bool {
        self.state.borrow().executed_seq.is_some()
    }

    /// Whether the action is currently running, or failed mid-run.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.state.borrow().executing
    }

    /// Whether the activity has been confirmed.
    #[must_use]
    pub fn confirmed(&self) -> bool {
        self.state.borrow().confirmed
    }
}

/// Handle to a registered unit of work whose action produces a value.
///
/// Same contract as [`Activity`], except [`execute`](Self::execute) returns
/// the action's value and caches it, and the compensation delegate receives
/// that exact value if rollback runs.
pub struct ActivityWithResult<T, E> {
    state: Rc<RefCell<ActivityState<T, E>>>,
    order: ExecutionOrder,
}

impl<T, E> ActivityWithResult<T, E>
where
    T: Clone + 'static,
    E: Debug + 'static,
{
    pub(crate) fn new(
        action: impl FnMut() -> Result<T, E> + 'static,
        order: ExecutionOrder,
    ) -> (Self, Rc<RefCell<ActivityState<T, E>>>) {
        let state = Rc::new(RefCell::new(ActivityState::new(Box::new(action))));
        let shared = Rc::clone(&state);
        (Self { state, order }, shared)
    }

    /// Attach the undo delegate; it receives the value the action produced.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::CompensationAlreadySet`] if a compensation
    /// was already attached.
    pub fn compensate_with(
        self,
        compensation: impl FnOnce(T) -> Result<(), E> + 'static,
    ) -> Result<Self, WorkflowError<E>> {
        {
            let mut inner = self.state.borrow_mut();
            if inner.compensation_set {
                return Err(WorkflowError::CompensationAlreadySet);
            }
            inner.compensation_set = true;
            inner.compensation = Some(Box::new(compensation));
        }
        Ok(self)
    }

    /// Attach the cleanup delegate, run if the action fails mid-execution.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::CancellationAlreadySet`] if a cancellation
    /// was already attached.
    pub fn cancel_with(
        self,
        cancellation: impl FnOnce() -> Result<(), E> + 'static,
    ) -> Result<Self, WorkflowError<E>> {
        {
            let mut inner = self.state.borrow_mut();
            if inner.cancellation_set {
                return Err(WorkflowError::CancellationAlreadySet);
            }
            inner.cancellation_set = true;
            inner.cancellation = Some(Box::new(cancellation));
        }
        Ok(self)
    }

    /// Invoke the action and return its value.
    ///
    /// The value is also cached so a later compensation receives it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Action`] carrying the action's error, or
    /// [`WorkflowError::AlreadyExecuting`] on a re-entrant call.
    pub fn execute(&self) -> Result<T, WorkflowError<E>> {
        run_action(&self.state, &self.order)
    }

    /// Irrevocably exempt this activity from compensation and cancellation.
    ///
    /// Idempotent.
    pub fn confirm(&self) {
        self.state.borrow_mut().confirm();
    }

    /// Whether the action ran to completion.
    #[must_use]
    pub fn executed(&self) -> bool {
        self.state.borrow().executed_seq.is_some()
    }

    /// Whether the action is currently running, or failed mid-run.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.state.borrow().executing
    }

    /// Whether the activity has been confirmed.
    #[must_use]
    pub fn confirmed(&self) -> bool {
        self.state.borrow().confirmed
    }
}
