use salesflow_shared::{ExecutionStatus, StepExecutionStatus};
use serde_json::json;

use crate::error::AppError;
use crate::tests::fixtures::{DealFixture, WorkflowFixture};
use crate::workflows::{StepAction, Workflow, WorkflowExecution, WorkflowStep, WorkflowStepExecution};

fn onboarding_actions() -> Vec<StepAction> {
    vec![
        StepAction::send_email("{{email}}", "Welcome aboard", "Thanks for choosing us"),
        StepAction::create_task("Schedule kickoff call", None, Some(2)),
        StepAction::add_tag("onboarding"),
    ]
}

fn execution_for(workflow: &Workflow, deal: &DealFixture) -> WorkflowExecution {
    WorkflowExecution::create(
        workflow.id,
        workflow.tenant_id,
        deal.id,
        &workflow.target_entity_type,
        workflow.step_count() as i32,
        None,
        deal.snapshot(),
    )
    .unwrap()
}

#[test]
fn test_execution_walkthrough_records_every_step() {
    let workflow = WorkflowFixture::default().build_active(onboarding_actions());
    let deal = DealFixture::default();
    let mut execution = execution_for(&workflow, &deal);

    execution.start().unwrap();

    for (done, step) in workflow.ordered_steps().into_iter().enumerate() {
        let mut step_execution = WorkflowStepExecution::create(execution.id, step, deal.snapshot());
        step_execution.start().unwrap();
        step_execution.complete(Some(json!({"step": step.name}))).unwrap();
        execution.push_step_execution(step_execution);
        execution.update_progress(step.step_order, done as i32 + 1, 0);
    }

    execution.complete().unwrap();

    let summary = execution.summary();
    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert_eq!(summary.total_steps, 3);
    assert_eq!(summary.completed_steps, 3);
    assert_eq!(summary.success_rate, 100);
    assert!(summary.completed_at.is_some());
    assert!(execution
        .step_executions
        .iter()
        .all(|se| se.status == StepExecutionStatus::Completed));

    let completed_at = execution.completed_at;
    assert!(execution.complete().unwrap_err().is_validation());
    assert_eq!(execution.completed_at, completed_at);
}

#[test]
fn test_partial_success_rate_rounds() {
    let workflow = WorkflowFixture::default().build_active(onboarding_actions());
    let mut execution = execution_for(&workflow, &DealFixture::default());

    execution.start().unwrap();
    execution.update_progress(3, 2, 1);
    execution.complete().unwrap();

    assert_eq!(execution.success_rate(), 67);
    assert_eq!(execution.summary().failed_steps, 1);
}

#[test]
fn test_failed_step_retries_until_cap() {
    let workflow = WorkflowFixture::default().build_active(onboarding_actions());
    let step = workflow.ordered_steps()[0].clone();
    let mut step_execution = WorkflowStepExecution::create(uuid::Uuid::new_v4(), &step, json!({}));

    for attempt in 1..=3 {
        step_execution.start().unwrap();
        step_execution.fail("Mail server unavailable").unwrap();
        assert!(step_execution.can_retry());
        step_execution.retry().unwrap();
        assert_eq!(step_execution.retry_count, attempt);
        assert_eq!(step_execution.status, StepExecutionStatus::Pending);
        assert!(step_execution.error_message.is_none());
    }

    step_execution.start().unwrap();
    step_execution.fail("Mail server unavailable").unwrap();
    assert!(!step_execution.can_retry());

    let err = step_execution.retry().unwrap_err();
    assert!(err.is_validation());
    assert_eq!(step_execution.retry_count, 3);
}

#[test]
fn test_step_editing_keeps_orders_unique() {
    let mut workflow = WorkflowFixture::default().build_active(onboarding_actions());
    let ids: Vec<_> = workflow.ordered_steps().iter().map(|s| s.id).collect();

    assert!(workflow.reorder_step(ids[0], 2).unwrap_err().is_conflict());

    workflow.reorder_step(ids[0], 10).unwrap();
    let order: Vec<_> = workflow.ordered_steps().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![ids[1], ids[2], ids[0]]);

    let duplicate = WorkflowStep::create(workflow.id, "Duplicate", None, StepAction::add_tag("dup"), 3).unwrap();
    assert!(workflow.add_step(duplicate).unwrap_err().is_conflict());

    let removed = workflow.remove_step(ids[1]).unwrap();
    assert_eq!(removed.step_order, 2);
    assert_eq!(workflow.step_count(), 2);
    assert!(matches!(workflow.remove_step(ids[1]), Err(AppError::NotFound(_))));
}

#[test]
fn test_stopped_executions_reject_further_transitions() {
    let workflow = WorkflowFixture::default().build_active(onboarding_actions());

    let mut cancelled = execution_for(&workflow, &DealFixture::default());
    cancelled.start().unwrap();
    cancelled.cancel().unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    assert!(cancelled.complete().unwrap_err().is_conflict());
    assert!(cancelled.fail("late failure").unwrap_err().is_conflict());
    assert!(cancelled.timeout().unwrap_err().is_conflict());

    let mut failed = execution_for(&workflow, &DealFixture::default());
    failed.start().unwrap();
    failed.fail("CRM API unavailable").unwrap();
    assert!(failed.cancel().unwrap_err().is_conflict());
    assert_eq!(failed.error_message.as_deref(), Some("CRM API unavailable"));
}
