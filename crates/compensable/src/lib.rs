//! Compensating workflow contexts with automatic ordered rollback.
//!
//! This crate provides an in-process saga: callers register side-effecting
//! activities on a [`WorkflowContext`], each with an optional compensation
//! (undo) and an optional cancellation delegate. If the context is not
//! explicitly completed, every activity that ran is undone in descending
//! execution order — most recently executed first — including when the
//! context is dropped by an error propagating out of the caller's code.

mod activity;
mod context;
mod erased;
mod error;
mod order;

pub use activity::{Activity, ActivityWithResult};
pub use context::{Cancellation, Compensation, ValueCompensation, WorkflowContext};
pub use error::{UndoError, UndoKind, WorkflowError};
