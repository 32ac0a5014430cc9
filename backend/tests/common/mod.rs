// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use std::sync::{Arc, Once};
use uuid::Uuid;

use salesflow_backend::workflows::{
    ActionRegistry, EngineConfig, InMemoryWorkflowStore, JsonConditionEvaluator, RetryPolicy, StepAction,
    TriggerType, Workflow, WorkflowEngine, WorkflowStep,
};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub fn engine_with(registry: ActionRegistry, retry_policy: RetryPolicy) -> Arc<WorkflowEngine> {
    init_test_logging();
    let config = EngineConfig {
        retry_policy,
        ..EngineConfig::default()
    };
    Arc::new(WorkflowEngine::new(
        Arc::new(InMemoryWorkflowStore::new()),
        registry,
        Arc::new(JsonConditionEvaluator),
        config,
    ))
}

/// Active "Deal" workflow whose steps are named "Step 1", "Step 2", ...
pub fn deal_workflow(tenant_id: Uuid, trigger_type: TriggerType, actions: Vec<StepAction>) -> Workflow {
    let mut workflow = Workflow::create(
        "Deal pipeline automation",
        Some("Keeps the pipeline moving".to_string()),
        trigger_type,
        "Deal",
        None,
        tenant_id,
        Uuid::new_v4(),
    )
    .expect("valid workflow");

    for (index, action) in actions.into_iter().enumerate() {
        let order = index as i32 + 1;
        let step = WorkflowStep::create(workflow.id, &format!("Step {}", order), None, action, order)
            .expect("valid step");
        workflow.add_step(step).expect("unique step order");
    }
    workflow.activate().expect("workflow has steps");
    workflow
}
