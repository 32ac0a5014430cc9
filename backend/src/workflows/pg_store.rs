// PostgreSQL workflow store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use salesflow_shared::{
    WorkflowExecutionRecord, WorkflowRecord, WorkflowStepExecutionRecord, WorkflowStepRecord,
};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::store::WorkflowStore;
use super::{ActionKind, Workflow, WorkflowExecution, WorkflowStep, WorkflowStepExecution};
use crate::error::{AppError, AppResult};

const WORKFLOW_COLUMNS: &str = "id, tenant_id, name, description, trigger_type, target_entity_type, \
     trigger_condition, is_active, execution_order, created_by, created_at, updated_at, \
     last_executed_at, execution_count";

const STEP_COLUMNS: &str = "id, workflow_id, name, description, action_type, action, step_order, \
     conditions, delay_minutes, is_enabled, continue_on_error";

const EXECUTION_COLUMNS: &str = "id, workflow_id, tenant_id, entity_id, entity_type, status, created_at, \
     started_at, completed_at, triggered_by, trigger_data, current_step_order, total_steps, \
     completed_steps, failed_steps, error_message, resume_at, delay_served_step";

const STEP_EXECUTION_COLUMNS: &str = "id, execution_id, step_id, step_name, action_type, step_order, \
     status, started_at, completed_at, input_data, output_data, error_message, retry_count";

#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_workflows(&self, records: Vec<WorkflowRecord>) -> AppResult<Vec<Workflow>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let step_records = sqlx::query_as::<_, WorkflowStepRecord>(&format!(
            "SELECT {} FROM workflow_steps WHERE workflow_id = ANY($1) ORDER BY step_order ASC",
            STEP_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut steps_by_workflow: HashMap<Uuid, Vec<WorkflowStep>> = HashMap::new();
        for record in step_records {
            let workflow_id = record.workflow_id;
            steps_by_workflow
                .entry(workflow_id)
                .or_default()
                .push(step_from_record(record)?);
        }

        records
            .into_iter()
            .map(|record| {
                let steps = steps_by_workflow.remove(&record.id).unwrap_or_default();
                workflow_from_record(record, steps)
            })
            .collect()
    }

    async fn load_executions(&self, records: Vec<WorkflowExecutionRecord>) -> AppResult<Vec<WorkflowExecution>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let step_records = sqlx::query_as::<_, WorkflowStepExecutionRecord>(&format!(
            "SELECT {} FROM workflow_step_executions WHERE execution_id = ANY($1) \
             ORDER BY step_order ASC, started_at ASC NULLS LAST",
            STEP_EXECUTION_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_execution: HashMap<Uuid, Vec<WorkflowStepExecution>> = HashMap::new();
        for record in step_records {
            let execution_id = record.execution_id;
            by_execution
                .entry(execution_id)
                .or_default()
                .push(step_execution_from_record(record)?);
        }

        records
            .into_iter()
            .map(|record| {
                let step_executions = by_execution.remove(&record.id).unwrap_or_default();
                execution_from_record(record, step_executions)
            })
            .collect()
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn save_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let record = workflow_to_record(workflow)?;
        let mut tx = self.pool.begin().await?;

        // Run statistics are owned by record_workflow_execution
        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, tenant_id, name, description, trigger_type, target_entity_type, trigger_condition,
             is_active, execution_order, created_by, created_at, updated_at, last_executed_at, execution_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                trigger_type = EXCLUDED.trigger_type,
                target_entity_type = EXCLUDED.target_entity_type,
                trigger_condition = EXCLUDED.trigger_condition,
                is_active = EXCLUDED.is_active,
                execution_order = EXCLUDED.execution_order,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.trigger_type)
        .bind(&record.target_entity_type)
        .bind(&record.trigger_condition)
        .bind(record.is_active)
        .bind(record.execution_order)
        .bind(record.created_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.last_executed_at)
        .bind(record.execution_count)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM workflow_steps WHERE workflow_id = $1")
            .bind(workflow.id)
            .execute(&mut *tx)
            .await?;

        for step in workflow.steps() {
            let step = step_to_record(step)?;
            sqlx::query(
                r#"
                INSERT INTO workflow_steps
                (id, workflow_id, name, description, action_type, action, step_order,
                 conditions, delay_minutes, is_enabled, continue_on_error)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(step.id)
            .bind(step.workflow_id)
            .bind(&step.name)
            .bind(&step.description)
            .bind(&step.action_type)
            .bind(&step.action)
            .bind(step.step_order)
            .bind(&step.conditions)
            .bind(step.delay_minutes)
            .bind(step.is_enabled)
            .bind(step.continue_on_error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Saved workflow {} with {} steps", workflow.id, workflow.step_count());
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> AppResult<Option<Workflow>> {
        let record = sqlx::query_as::<_, WorkflowRecord>(&format!(
            "SELECT {} FROM workflows WHERE id = $1",
            WORKFLOW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => Ok(self.load_workflows(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete_workflow(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active_workflows(&self, tenant_id: Uuid, entity_type: &str) -> AppResult<Vec<Workflow>> {
        let records = sqlx::query_as::<_, WorkflowRecord>(&format!(
            "SELECT {} FROM workflows \
             WHERE tenant_id = $1 AND target_entity_type = $2 AND is_active = true \
             ORDER BY execution_order ASC, created_at ASC",
            WORKFLOW_COLUMNS
        ))
        .bind(tenant_id)
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await?;

        self.load_workflows(records).await
    }

    async fn record_workflow_execution(&self, workflow_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE workflows SET execution_count = execution_count + 1, last_executed_at = $2 WHERE id = $1",
        )
        .bind(workflow_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Workflow"));
        }
        Ok(())
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        let record = execution_to_record(execution);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions
            (id, workflow_id, tenant_id, entity_id, entity_type, status, created_at, started_at,
             completed_at, triggered_by, trigger_data, current_step_order, total_steps,
             completed_steps, failed_steps, error_message, resume_at, delay_served_step)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                current_step_order = EXCLUDED.current_step_order,
                completed_steps = EXCLUDED.completed_steps,
                failed_steps = EXCLUDED.failed_steps,
                error_message = EXCLUDED.error_message,
                resume_at = EXCLUDED.resume_at,
                delay_served_step = EXCLUDED.delay_served_step
            "#,
        )
        .bind(record.id)
        .bind(record.workflow_id)
        .bind(record.tenant_id)
        .bind(record.entity_id)
        .bind(&record.entity_type)
        .bind(&record.status)
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.triggered_by)
        .bind(&record.trigger_data)
        .bind(record.current_step_order)
        .bind(record.total_steps)
        .bind(record.completed_steps)
        .bind(record.failed_steps)
        .bind(&record.error_message)
        .bind(record.resume_at)
        .bind(record.delay_served_step)
        .execute(&mut *tx)
        .await?;

        for step_execution in &execution.step_executions {
            let se = step_execution_to_record(step_execution);
            sqlx::query(
                r#"
                INSERT INTO workflow_step_executions
                (id, execution_id, step_id, step_name, action_type, step_order, status,
                 started_at, completed_at, input_data, output_data, error_message, retry_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    started_at = EXCLUDED.started_at,
                    completed_at = EXCLUDED.completed_at,
                    input_data = EXCLUDED.input_data,
                    output_data = EXCLUDED.output_data,
                    error_message = EXCLUDED.error_message,
                    retry_count = EXCLUDED.retry_count
                "#,
            )
            .bind(se.id)
            .bind(se.execution_id)
            .bind(se.step_id)
            .bind(&se.step_name)
            .bind(&se.action_type)
            .bind(se.step_order)
            .bind(&se.status)
            .bind(se.started_at)
            .bind(se.completed_at)
            .bind(&se.input_data)
            .bind(&se.output_data)
            .bind(&se.error_message)
            .bind(se.retry_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<WorkflowExecution>> {
        let record = sqlx::query_as::<_, WorkflowExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => Ok(self.load_executions(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_due_executions(&self, now: DateTime<Utc>) -> AppResult<Vec<WorkflowExecution>> {
        let records = sqlx::query_as::<_, WorkflowExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions \
             WHERE status = 'waiting' AND (resume_at IS NULL OR resume_at <= $1) \
             ORDER BY resume_at ASC NULLS FIRST",
            EXECUTION_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        self.load_executions(records).await
    }

    async fn list_unfinished_executions(&self) -> AppResult<Vec<WorkflowExecution>> {
        let records = sqlx::query_as::<_, WorkflowExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions \
             WHERE status IN ('pending', 'running', 'waiting') \
             ORDER BY created_at ASC",
            EXECUTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        self.load_executions(records).await
    }

    async fn list_executions(&self, workflow_id: Uuid, limit: usize) -> AppResult<Vec<WorkflowExecution>> {
        let records = sqlx::query_as::<_, WorkflowExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions WHERE workflow_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
            EXECUTION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        self.load_executions(records).await
    }
}

// ===== Record conversions =====

fn workflow_to_record(workflow: &Workflow) -> AppResult<WorkflowRecord> {
    Ok(WorkflowRecord {
        id: workflow.id,
        tenant_id: workflow.tenant_id,
        name: workflow.name.clone(),
        description: workflow.description.clone(),
        trigger_type: serde_json::to_value(&workflow.trigger_type)?,
        target_entity_type: workflow.target_entity_type.clone(),
        trigger_condition: workflow
            .trigger_condition
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
        is_active: workflow.is_active,
        execution_order: workflow.execution_order,
        created_by: workflow.created_by,
        created_at: workflow.created_at,
        updated_at: workflow.updated_at,
        last_executed_at: workflow.last_executed_at,
        execution_count: workflow.execution_count,
    })
}

fn workflow_from_record(record: WorkflowRecord, steps: Vec<WorkflowStep>) -> AppResult<Workflow> {
    Ok(Workflow {
        id: record.id,
        tenant_id: record.tenant_id,
        name: record.name,
        description: record.description,
        trigger_type: serde_json::from_value(record.trigger_type)?,
        target_entity_type: record.target_entity_type,
        trigger_condition: record.trigger_condition.map(serde_json::from_value).transpose()?,
        is_active: record.is_active,
        execution_order: record.execution_order,
        created_by: record.created_by,
        created_at: record.created_at,
        updated_at: record.updated_at,
        last_executed_at: record.last_executed_at,
        execution_count: record.execution_count,
        steps,
    })
}

fn step_to_record(step: &WorkflowStep) -> AppResult<WorkflowStepRecord> {
    Ok(WorkflowStepRecord {
        id: step.id,
        workflow_id: step.workflow_id,
        name: step.name.clone(),
        description: step.description.clone(),
        action_type: step.action_type().as_str().to_string(),
        action: serde_json::to_value(&step.action)?,
        step_order: step.step_order,
        conditions: step.conditions.as_ref().map(serde_json::to_value).transpose()?,
        delay_minutes: step.delay_minutes,
        is_enabled: step.is_enabled,
        continue_on_error: step.continue_on_error,
    })
}

fn step_from_record(record: WorkflowStepRecord) -> AppResult<WorkflowStep> {
    Ok(WorkflowStep {
        id: record.id,
        workflow_id: record.workflow_id,
        name: record.name,
        description: record.description,
        action: serde_json::from_value(record.action)?,
        step_order: record.step_order,
        conditions: record.conditions.map(serde_json::from_value).transpose()?,
        delay_minutes: record.delay_minutes,
        is_enabled: record.is_enabled,
        continue_on_error: record.continue_on_error,
    })
}

fn execution_to_record(execution: &WorkflowExecution) -> WorkflowExecutionRecord {
    WorkflowExecutionRecord {
        id: execution.id,
        workflow_id: execution.workflow_id,
        tenant_id: execution.tenant_id,
        entity_id: execution.entity_id,
        entity_type: execution.entity_type.clone(),
        status: execution.status.as_str().to_string(),
        created_at: execution.created_at,
        started_at: execution.started_at,
        completed_at: execution.completed_at,
        triggered_by: execution.triggered_by,
        trigger_data: execution.trigger_data.clone(),
        current_step_order: execution.current_step_order,
        total_steps: execution.total_steps,
        completed_steps: execution.completed_steps,
        failed_steps: execution.failed_steps,
        error_message: execution.error_message.clone(),
        resume_at: execution.resume_at,
        delay_served_step: execution.delay_served_step,
    }
}

fn execution_from_record(
    record: WorkflowExecutionRecord,
    step_executions: Vec<WorkflowStepExecution>,
) -> AppResult<WorkflowExecution> {
    Ok(WorkflowExecution {
        id: record.id,
        workflow_id: record.workflow_id,
        tenant_id: record.tenant_id,
        entity_id: record.entity_id,
        entity_type: record.entity_type,
        status: record.status.parse()?,
        created_at: record.created_at,
        started_at: record.started_at,
        completed_at: record.completed_at,
        triggered_by: record.triggered_by,
        trigger_data: record.trigger_data,
        current_step_order: record.current_step_order,
        total_steps: record.total_steps,
        completed_steps: record.completed_steps,
        failed_steps: record.failed_steps,
        error_message: record.error_message,
        resume_at: record.resume_at,
        delay_served_step: record.delay_served_step,
        step_executions,
    })
}

fn step_execution_to_record(se: &WorkflowStepExecution) -> WorkflowStepExecutionRecord {
    WorkflowStepExecutionRecord {
        id: se.id,
        execution_id: se.execution_id,
        step_id: se.step_id,
        step_name: se.step_name.clone(),
        action_type: se.action_type.as_str().to_string(),
        step_order: se.step_order,
        status: se.status.as_str().to_string(),
        started_at: se.started_at,
        completed_at: se.completed_at,
        input_data: se.input_data.clone(),
        output_data: se.output_data.clone(),
        error_message: se.error_message.clone(),
        retry_count: se.retry_count,
    }
}

fn step_execution_from_record(record: WorkflowStepExecutionRecord) -> AppResult<WorkflowStepExecution> {
    let action_type: ActionKind = serde_json::from_value(serde_json::Value::String(record.action_type))?;

    Ok(WorkflowStepExecution {
        id: record.id,
        execution_id: record.execution_id,
        step_id: record.step_id,
        step_name: record.step_name,
        action_type,
        step_order: record.step_order,
        status: record.status.parse()?,
        started_at: record.started_at,
        completed_at: record.completed_at,
        input_data: record.input_data,
        output_data: record.output_data,
        error_message: record.error_message,
        retry_count: record.retry_count,
    })
}
