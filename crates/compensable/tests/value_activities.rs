//! Integration tests for the value-producing activity variant: the action's
//! result must be threaded into the compensation delegate.

use std::cell::RefCell;
use std::rc::Rc;

use compensable::{WorkflowContext, WorkflowError};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TestError(&'static str);

#[test]
fn execute_returns_the_action_value() -> anyhow::Result<()> {
    let mut ctx = WorkflowContext::<TestError>::new();

    let value = ctx.act_with_result(|| Ok(7_i32))?.execute()?;
    ctx.complete()?;

    assert_eq!(value, 7);
    Ok(())
}

#[test]
fn compensation_receives_the_cached_value() -> anyhow::Result<()> {
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let mut ctx = WorkflowContext::new();

    let value = ctx
        .act_with_result(|| Ok::<_, TestError>(String::from("reservation-42")))?
        .compensate_with(move |reservation| {
            sink.borrow_mut().push(reservation);
            Ok(())
        })?
        .execute()?;
    assert_eq!(value, "reservation-42");
    drop(ctx);

    assert_eq!(*seen.borrow(), ["reservation-42"]);
    Ok(())
}

#[test]
fn confirmed_value_activity_keeps_its_effect() -> anyhow::Result<()> {
    let seen: Rc<RefCell<Vec<i32>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let mut ctx = WorkflowContext::new();

    let activity = ctx
        .act_with_result(|| Ok::<_, TestError>(5))?
        .compensate_with(move |value| {
            sink.borrow_mut().push(value);
            Ok(())
        })?;
    activity.execute()?;
    activity.confirm();
    ctx.roll_back()?;

    assert!(seen.borrow().is_empty());
    Ok(())
}

#[test]
fn mid_action_failure_runs_cancellation() {
    let cancelled = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&cancelled);
    let mut ctx = WorkflowContext::new();

    let activity = ctx
        .act_with_result(|| Err::<i32, _>(TestError("boom")))
        .expect("registration succeeds")
        .cancel_with(move || {
            *flag.borrow_mut() = true;
            Ok(())
        })
        .expect("attachment succeeds");
    let err = activity.execute().expect_err("action fails");
    assert!(matches!(err, WorkflowError::Action { .. }));
    drop(ctx);

    assert!(*cancelled.borrow());
}

#[test]
fn convenience_execute_with_result_returns_value_and_compensates() -> anyhow::Result<()> {
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let mut ctx = WorkflowContext::new();

    let value = ctx.execute_with_result(
        || Ok::<_, TestError>(String::from("ticket-7")),
        Some(Box::new(move |ticket| {
            sink.borrow_mut().push(ticket);
            Ok(())
        })),
        None,
    )?;
    assert_eq!(value, "ticket-7");
    drop(ctx);

    assert_eq!(*seen.borrow(), ["ticket-7"]);
    Ok(())
}

#[test]
fn convenience_execute_with_result_cancels_on_mid_action_failure() {
    let cancelled = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&cancelled);
    let mut ctx = WorkflowContext::new();

    let err = ctx
        .execute_with_result(
            || Err::<i32, _>(TestError("boom")),
            None,
            Some(Box::new(move || {
                *flag.borrow_mut() = true;
                Ok(())
            })),
        )
        .expect_err("action fails");
    assert!(matches!(err, WorkflowError::Action { .. }));
    drop(ctx);

    assert!(*cancelled.borrow());
}

#[test]
fn value_and_unit_activities_roll_back_together_in_execution_order() -> anyhow::Result<()> {
    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let mut ctx = WorkflowContext::new();

    let log_act = Rc::clone(&log);
    let log_undo = Rc::clone(&log);
    ctx.act(move || {
        log_act.borrow_mut().push("do unit".into());
        Ok::<_, TestError>(())
    })?
    .compensate_with(move || {
        log_undo.borrow_mut().push("undo unit".into());
        Ok(())
    })?
    .execute()?;

    let log_undo = Rc::clone(&log);
    ctx.act_with_result(|| Ok(9_u64))?
        .compensate_with(move |value| {
            log_undo.borrow_mut().push(format!("undo value {value}"));
            Ok(())
        })?
        .execute()?;

    ctx.roll_back()?;

    assert_eq!(*log.borrow(), ["do unit", "undo value 9", "undo unit"]);
    Ok(())
}
