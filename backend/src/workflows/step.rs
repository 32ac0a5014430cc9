// Workflow Step - One ordered, configurable unit of work inside a workflow

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActionKind, ConditionGroup, StepAction};
use crate::error::{AppResult, validation_error};
use crate::validation::{Validator, number, string};

pub const MAX_STEP_NAME_LENGTH: usize = 200;
/// 30 days
pub const MAX_DELAY_MINUTES: i32 = 43_200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub action: StepAction,
    pub step_order: i32,
    /// Step is skipped when present and false for the entity snapshot
    pub conditions: Option<ConditionGroup>,
    pub delay_minutes: i32,
    pub is_enabled: bool,
    pub continue_on_error: bool,
}

impl WorkflowStep {
    pub fn create(
        workflow_id: Uuid,
        name: &str,
        description: Option<String>,
        action: StepAction,
        step_order: i32,
    ) -> AppResult<Self> {
        Validator::new()
            .required_string(name, "name")
            .max_length(name.trim(), "name", MAX_STEP_NAME_LENGTH)
            .required_id(&workflow_id, "workflow_id")
            .non_negative(step_order as i64, "step_order")
            .error_if(
                wait_minutes(&action) > MAX_DELAY_MINUTES as i64,
                "delay_minutes",
                "Total delay must not exceed 43200 minutes",
            )
            .validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.trim().to_string(),
            description,
            action,
            step_order,
            conditions: None,
            delay_minutes: 0,
            is_enabled: true,
            continue_on_error: false,
        })
    }

    pub fn action_type(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn update_details(&mut self, name: &str, description: Option<String>) -> AppResult<()> {
        self.name = string::required_length(name, "name", MAX_STEP_NAME_LENGTH)?;
        self.description = description;
        Ok(())
    }

    /// Leaves the delay unchanged when out of range
    pub fn set_delay(&mut self, minutes: i32) -> AppResult<()> {
        number::in_range(minutes as i64, "delay_minutes", 0, MAX_DELAY_MINUTES as i64)?;
        check_total_delay(minutes, &self.action)?;
        self.delay_minutes = minutes;
        Ok(())
    }

    /// Order changes on a step that belongs to a workflow go through `Workflow::reorder_step`
    pub(crate) fn set_step_order(&mut self, step_order: i32) -> AppResult<()> {
        number::non_negative(step_order as i64, "step_order")?;
        self.step_order = step_order;
        Ok(())
    }

    /// Leaves the step unchanged when a wait action would push the delay over the cap
    pub fn update_configuration(&mut self, action: StepAction, conditions: Option<ConditionGroup>) -> AppResult<()> {
        check_total_delay(self.delay_minutes, &action)?;
        self.action = action;
        self.conditions = conditions;
        Ok(())
    }

    pub fn enable(&mut self) {
        self.is_enabled = true;
    }

    pub fn disable(&mut self) {
        self.is_enabled = false;
    }

    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.continue_on_error = continue_on_error;
    }

    pub fn with_conditions(mut self, conditions: ConditionGroup) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Delay before the step runs; a wait action adds its own minutes
    pub fn effective_delay_minutes(&self) -> i64 {
        self.delay_minutes as i64 + wait_minutes(&self.action)
    }
}

fn wait_minutes(action: &StepAction) -> i64 {
    match action {
        StepAction::Wait(cfg) => cfg.minutes as i64,
        _ => 0,
    }
}

fn check_total_delay(delay_minutes: i32, action: &StepAction) -> AppResult<()> {
    if delay_minutes as i64 + wait_minutes(action) > MAX_DELAY_MINUTES as i64 {
        return Err(validation_error(
            "delay_minutes",
            "Total delay must not exceed 43200 minutes",
        ));
    }
    Ok(())
}
