// Workflow - Definition aggregate: trigger, target entity, ordered steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConditionGroup, TriggerType, WorkflowStep};
use crate::error::{AppError, AppResult, validation_error};
use crate::validation::{Validator, number, string};

pub const MAX_WORKFLOW_NAME_LENGTH: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    /// Entity tag such as "Customer" or "Deal"
    pub target_entity_type: String,
    pub trigger_condition: Option<ConditionGroup>,
    pub is_active: bool,
    /// Tie-break when several workflows match one event
    pub execution_order: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: i64,
    pub(crate) steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// New workflows start inactive with no steps
    pub fn create(
        name: &str,
        description: Option<String>,
        trigger_type: TriggerType,
        target_entity_type: &str,
        trigger_condition: Option<ConditionGroup>,
        tenant_id: Uuid,
        created_by: Uuid,
    ) -> AppResult<Self> {
        Validator::new()
            .required_string(name, "name")
            .max_length(name.trim(), "name", MAX_WORKFLOW_NAME_LENGTH)
            .required_string(target_entity_type, "target_entity_type")
            .required_id(&tenant_id, "tenant_id")
            .required_id(&created_by, "created_by")
            .validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.trim().to_string(),
            description,
            trigger_type,
            target_entity_type: target_entity_type.trim().to_string(),
            trigger_condition,
            is_active: false,
            execution_order: 0,
            created_by,
            created_at: Utc::now(),
            updated_at: None,
            last_executed_at: None,
            execution_count: 0,
            steps: Vec::new(),
        })
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Steps in execution sequence
    pub fn ordered_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }

    pub fn step(&self, step_id: Uuid) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Edit one step in place. The edit is applied to a copy and only committed
    /// when it succeeds and keeps the step identity and order unique.
    pub fn update_step<F>(&mut self, step_id: Uuid, edit: F) -> AppResult<()>
    where
        F: FnOnce(&mut WorkflowStep) -> AppResult<()>,
    {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| AppError::not_found("Workflow step"))?;

        let mut candidate = self.steps[index].clone();
        edit(&mut candidate)?;

        if candidate.id != step_id || candidate.workflow_id != self.id {
            return Err(validation_error("id", "Step identity cannot change"));
        }
        self.ensure_order_free(step_id, candidate.step_order)?;

        self.steps[index] = candidate;
        self.touch();
        Ok(())
    }

    /// No renumbering happens; the caller picks the step order
    pub fn add_step(&mut self, step: WorkflowStep) -> AppResult<()> {
        if step.workflow_id != self.id {
            return Err(validation_error(
                "workflow_id",
                "Step belongs to a different workflow",
            ));
        }
        self.ensure_order_free(step.id, step.step_order)?;

        self.steps.push(step);
        self.touch();
        Ok(())
    }

    pub fn remove_step(&mut self, step_id: Uuid) -> AppResult<WorkflowStep> {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| AppError::not_found("Workflow step"))?;

        self.touch();
        Ok(self.steps.remove(index))
    }

    /// Move one step to a new order, keeping orders unique
    pub fn reorder_step(&mut self, step_id: Uuid, step_order: i32) -> AppResult<()> {
        self.update_step(step_id, |step| step.set_step_order(step_order))
    }

    fn ensure_order_free(&self, step_id: Uuid, step_order: i32) -> AppResult<()> {
        if self
            .steps
            .iter()
            .any(|s| s.id != step_id && s.step_order == step_order)
        {
            return Err(AppError::conflict(format!(
                "Step order {} is already used in this workflow",
                step_order
            )));
        }
        Ok(())
    }

    pub fn activate(&mut self) -> AppResult<()> {
        if self.is_active {
            return Err(AppError::conflict("Workflow is already active"));
        }
        if self.steps.is_empty() {
            return Err(validation_error("steps", "Workflow has no steps"));
        }

        self.is_active = true;
        self.touch();
        Ok(())
    }

    pub fn deactivate(&mut self) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::conflict("Workflow is already inactive"));
        }

        self.is_active = false;
        self.touch();
        Ok(())
    }

    pub fn update_details(&mut self, name: &str, description: Option<String>) -> AppResult<()> {
        self.name = string::required_length(name, "name", MAX_WORKFLOW_NAME_LENGTH)?;
        self.description = description;
        self.touch();
        Ok(())
    }

    pub fn update_trigger(&mut self, trigger_type: TriggerType, trigger_condition: Option<ConditionGroup>) {
        self.trigger_type = trigger_type;
        self.trigger_condition = trigger_condition;
        self.touch();
    }

    pub fn set_execution_order(&mut self, order: i32) -> AppResult<()> {
        number::non_negative(order as i64, "execution_order")?;
        self.execution_order = order;
        self.touch();
        Ok(())
    }

    /// Bump the run statistics after an execution finishes
    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_executed_at = Some(at);
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
