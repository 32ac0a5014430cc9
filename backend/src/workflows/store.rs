// Workflow Store - Persistence contract and the in-memory implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Workflow, WorkflowExecution};
use crate::error::{AppError, AppResult};

/// Durable storage for workflow definitions and their executions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or replace a workflow together with its steps
    async fn save_workflow(&self, workflow: &Workflow) -> AppResult<()>;

    async fn get_workflow(&self, id: Uuid) -> AppResult<Option<Workflow>>;

    /// Returns false when the workflow did not exist
    async fn delete_workflow(&self, id: Uuid) -> AppResult<bool>;

    /// Active workflows of a tenant targeting an entity type, in execution order
    async fn list_active_workflows(&self, tenant_id: Uuid, entity_type: &str) -> AppResult<Vec<Workflow>>;

    /// Atomically bump the execution counter and stamp the last run
    async fn record_workflow_execution(&self, workflow_id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Insert or replace an execution together with its step executions
    async fn save_execution(&self, execution: &WorkflowExecution) -> AppResult<()>;

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<WorkflowExecution>>;

    /// Waiting executions whose resume time has passed
    async fn list_due_executions(&self, now: DateTime<Utc>) -> AppResult<Vec<WorkflowExecution>>;

    async fn list_unfinished_executions(&self) -> AppResult<Vec<WorkflowExecution>>;

    /// Most recent executions first
    async fn list_executions(&self, workflow_id: Uuid, limit: usize) -> AppResult<Vec<WorkflowExecution>>;
}

/// Process-local store used when no database is configured and in tests
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        let mut stored = workflow.clone();

        // Run statistics are owned by record_workflow_execution
        if let Some(existing) = workflows.get(&workflow.id) {
            stored.execution_count = existing.execution_count;
            stored.last_executed_at = existing.last_executed_at;
        }

        workflows.insert(workflow.id, stored);
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> AppResult<Option<Workflow>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn delete_workflow(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.workflows.write().await.remove(&id).is_some())
    }

    async fn list_active_workflows(&self, tenant_id: Uuid, entity_type: &str) -> AppResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.is_active && w.tenant_id == tenant_id && w.target_entity_type == entity_type)
            .cloned()
            .collect();

        workflows.sort_by_key(|w| (w.execution_order, w.created_at));
        Ok(workflows)
    }

    async fn record_workflow_execution(&self, workflow_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| AppError::not_found("Workflow"))?;
        workflow.record_execution(at);
        Ok(())
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        self.executions.write().await.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn list_due_executions(&self, now: DateTime<Utc>) -> AppResult<Vec<WorkflowExecution>> {
        let mut due: Vec<WorkflowExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();

        due.sort_by_key(|e| e.resume_at);
        Ok(due)
    }

    async fn list_unfinished_executions(&self) -> AppResult<Vec<WorkflowExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .filter(|e| !e.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_executions(&self, workflow_id: Uuid, limit: usize) -> AppResult<Vec<WorkflowExecution>> {
        let mut executions: Vec<WorkflowExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();

        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions.truncate(limit);
        Ok(executions)
    }
}
