use chrono::{Duration, Utc};
use salesflow_shared::ExecutionStatus;

use crate::tests::TestContext;
use crate::tests::fixtures::{DealFixture, WorkflowFixture};
use crate::workflows::conditions::presets;
use crate::workflows::{ConditionGroup, StepAction, TriggerEvent, TriggerType, WorkflowStore};

#[tokio::test]
async fn test_assignment_workflow_only_fires_for_unassigned_deals() {
    let ctx = TestContext::new();
    let owner = uuid::Uuid::new_v4();
    let workflow = WorkflowFixture::for_tenant(ctx.tenant_id)
        .when(ConditionGroup::and(vec![presets::unassigned()]))
        .build_active(vec![StepAction::assign_owner(owner)]);
    ctx.register(&workflow).await;

    let assigned = DealFixture::default();
    let started = ctx
        .engine
        .process_event(&TriggerEvent::created(ctx.tenant_id, "Deal", assigned.id, assigned.snapshot()))
        .await
        .unwrap();
    assert!(started.is_empty());

    let unassigned = DealFixture::default().unassigned();
    let started = ctx
        .engine
        .process_event(&TriggerEvent::created(ctx.tenant_id, "Deal", unassigned.id, unassigned.snapshot()))
        .await
        .unwrap();
    assert_eq!(started.len(), 1);

    let execution = ctx.engine.get_execution(started[0]).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.entity_id, unassigned.id);
    assert_eq!(execution.completed_steps, 1);
}

#[tokio::test]
async fn test_templates_are_filled_from_the_snapshot() {
    let ctx = TestContext::new();
    let workflow = WorkflowFixture::for_tenant(ctx.tenant_id).build_active(vec![StepAction::send_email(
        "{{email}}",
        "About {{ name }}",
        "Stage is now {{stage}}, owner {{missing.field}}",
    )]);
    ctx.register(&workflow).await;

    let deal = DealFixture::in_stage("proposal").with_email("cfo@globex.com");
    let started = ctx
        .engine
        .process_event(&TriggerEvent::created(ctx.tenant_id, "Deal", deal.id, deal.snapshot()))
        .await
        .unwrap();

    let execution = ctx.engine.get_execution(started[0]).await.unwrap();
    let output = execution.step_executions[0].output_data.clone().unwrap();
    let config = &output["action"]["config"];

    assert_eq!(output["dry_run"], true);
    assert_eq!(config["to"], "cfo@globex.com");
    assert_eq!(config["subject"], format!("About {}", deal.name));
    assert_eq!(config["body"], "Stage is now proposal, owner {{missing.field}}");
}

#[tokio::test]
async fn test_field_change_trigger_follows_execution_order() {
    let ctx = TestContext::new();
    let trigger = TriggerType::FieldChange {
        field: "stage".to_string(),
    };

    let mut late = WorkflowFixture::for_tenant(ctx.tenant_id)
        .triggered_by(trigger.clone())
        .build_active(vec![StepAction::add_tag("stage-moved")]);
    late.set_execution_order(5).unwrap();
    let mut early = WorkflowFixture::for_tenant(ctx.tenant_id)
        .triggered_by(trigger)
        .build_active(vec![StepAction::create_activity("note", "Stage changed")]);
    early.set_execution_order(1).unwrap();
    ctx.register(&late).await;
    ctx.register(&early).await;

    let deal = DealFixture::in_stage("negotiation");
    let unrelated = TriggerEvent::updated(ctx.tenant_id, "Deal", deal.id, &["amount"], deal.snapshot());
    assert!(ctx.engine.process_event(&unrelated).await.unwrap().is_empty());

    let stage_change = TriggerEvent::updated(ctx.tenant_id, "Deal", deal.id, &["stage"], deal.snapshot());
    let started = ctx.engine.process_event(&stage_change).await.unwrap();
    assert_eq!(started.len(), 2);

    let first = ctx.engine.get_execution(started[0]).await.unwrap();
    let second = ctx.engine.get_execution(started[1]).await.unwrap();
    assert_eq!(first.workflow_id, early.id);
    assert_eq!(second.workflow_id, late.id);

    for workflow_id in [early.id, late.id] {
        let stored = ctx.store.get_workflow(workflow_id).await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 1);
        assert!(stored.last_executed_at.is_some());
    }
}

#[tokio::test]
async fn test_delayed_follow_up_resumes_on_tick() {
    let ctx = TestContext::new();
    let mut workflow = WorkflowFixture::for_tenant(ctx.tenant_id).build_active(vec![
        StepAction::create_task("Send proposal", None, Some(1)),
        StepAction::send_email("{{email}}", "Checking in", "Any questions about the proposal?"),
    ]);
    let follow_up = workflow.ordered_steps()[1].id;
    workflow.update_step(follow_up, |step| step.set_delay(60)).unwrap();
    ctx.register(&workflow).await;

    let deal = DealFixture::default();
    let execution = ctx
        .engine
        .start_manual(workflow.id, deal.id, deal.snapshot(), uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Waiting);
    assert_eq!(execution.completed_steps, 1);

    let resume_at = execution.resume_at.unwrap();
    assert!(ctx.engine.tick(Utc::now()).await.unwrap().is_empty());

    let resumed = ctx.engine.tick(resume_at + Duration::seconds(1)).await.unwrap();
    assert_eq!(resumed, vec![execution.id]);

    let finished = ctx.engine.get_execution(execution.id).await.unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(finished.completed_steps, 2);
    assert!(finished.resume_at.is_none());
}

#[tokio::test]
async fn test_history_is_limited() {
    let ctx = TestContext::new();
    let workflow = WorkflowFixture::for_tenant(ctx.tenant_id).build_active(vec![StepAction::add_tag("touched")]);
    ctx.register(&workflow).await;

    for _ in 0..4 {
        let deal = DealFixture::default();
        ctx.engine
            .process_event(&TriggerEvent::created(ctx.tenant_id, "Deal", deal.id, deal.snapshot()))
            .await
            .unwrap();
    }

    let history = ctx.engine.execution_history(workflow.id, 3).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|s| s.status == ExecutionStatus::Completed && s.success_rate == 100));
}
