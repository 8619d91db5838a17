/// An undo operation taken out of an activity, ready to invoke.
pub(crate) type UndoFn<E> = Box<dyn FnOnce() -> Result<(), E>>;

/// Type-erased view of an activity, as the owning context sees it.
///
/// The context stores unit-producing and value-producing activities in one
/// ordered collection; this trait erases the value type. The undo accessors
/// hand the closure out instead of invoking it, so the context can drop its
/// borrow of the activity before running caller code.
pub(crate) trait ErasedActivity<E> {
    /// Sequence number assigned when the action finished successfully,
    /// or `None` if the action never ran to completion.
    fn executed_seq(&self) -> Option<u64>;

    /// True while the action is running, and left true if it failed.
    fn is_executing(&self) -> bool;

    fn confirmed(&self) -> bool;

    /// One-way promotion out of the undo set.
    fn confirm(&mut self);

    /// Take the compensation, with the cached action result (if any) already
    /// bound in. `None` if no compensation was attached or it was taken.
    fn take_compensation(&mut self) -> Option<UndoFn<E>>;

    /// Take the cancellation. `None` if none was attached or it was taken.
    fn take_cancellation(&mut self) -> Option<UndoFn<E>>;
}
