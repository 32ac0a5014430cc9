pub mod unit;

// Common test utilities and shared test setup
use std::sync::Arc;
use uuid::Uuid;

use crate::workflows::{
    ActionRegistry, EngineConfig, InMemoryWorkflowStore, JsonConditionEvaluator, LogOnlyHandler, RetryPolicy,
    Workflow, WorkflowEngine,
};

pub struct TestContext {
    pub engine: WorkflowEngine,
    pub store: Arc<InMemoryWorkflowStore>,
    pub tenant_id: Uuid,
}

impl TestContext {
    /// Engine over an in-memory store where every action is a logged no-op
    pub fn new() -> Self {
        Self::with_registry(ActionRegistry::new().with_fallback(Arc::new(LogOnlyHandler)))
    }

    pub fn with_registry(registry: ActionRegistry) -> Self {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let config = EngineConfig {
            retry_policy: RetryPolicy::no_retry(),
            ..EngineConfig::default()
        };

        Self {
            engine: WorkflowEngine::new(store.clone(), registry, Arc::new(JsonConditionEvaluator), config),
            store,
            tenant_id: Uuid::new_v4(),
        }
    }

    pub async fn register(&self, workflow: &Workflow) {
        self.engine
            .register_workflow(workflow)
            .await
            .expect("Failed to register workflow");
    }
}
