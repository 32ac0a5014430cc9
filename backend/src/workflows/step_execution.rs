// Step Execution - One concrete run of a workflow step

use chrono::{DateTime, Duration, Utc};
use salesflow_shared::StepExecutionStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActionKind, WorkflowStep};
use crate::error::{AppError, AppResult, validation_error};

/// Hard cap on re-attempts of a single step execution
pub const MAX_RETRY_COUNT: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStepExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub step_name: String,
    pub action_type: ActionKind,
    pub step_order: i32,
    pub status: StepExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

impl WorkflowStepExecution {
    pub fn create(execution_id: Uuid, step: &WorkflowStep, input_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id: step.id,
            step_name: step.name.clone(),
            action_type: step.action_type(),
            step_order: step.step_order,
            status: StepExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            input_data,
            output_data: None,
            error_message: None,
            retry_count: 0,
        }
    }

    pub fn start(&mut self) -> AppResult<()> {
        if self.status != StepExecutionStatus::Pending {
            return Err(AppError::conflict(format!(
                "Cannot start step execution in status {}",
                self.status
            )));
        }

        self.status = StepExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        Ok(())
    }

    pub fn complete(&mut self, output_data: Option<serde_json::Value>) -> AppResult<()> {
        match self.status {
            StepExecutionStatus::Completed => {
                Err(validation_error("status", "Step execution is already completed"))
            }
            StepExecutionStatus::Running => {
                self.status = StepExecutionStatus::Completed;
                self.output_data = output_data;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(AppError::conflict(format!(
                "Cannot complete step execution in status {}",
                other
            ))),
        }
    }

    /// A pending step may fail before it starts, e.g. when its input cannot be built
    pub fn fail(&mut self, error_message: &str) -> AppResult<()> {
        if error_message.trim().is_empty() {
            return Err(validation_error("error_message", "Error message is required"));
        }
        if self.status.is_settled() {
            return Err(AppError::conflict(format!(
                "Cannot fail step execution in status {}",
                self.status
            )));
        }

        self.status = StepExecutionStatus::Failed;
        self.error_message = Some(error_message.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn retry(&mut self) -> AppResult<()> {
        if self.status != StepExecutionStatus::Failed {
            return Err(AppError::conflict(format!(
                "Cannot retry step execution in status {}",
                self.status
            )));
        }
        if self.retry_count >= MAX_RETRY_COUNT {
            return Err(validation_error("retry_count", "Maximum retry count exceeded"));
        }

        self.status = StepExecutionStatus::Pending;
        self.error_message = None;
        self.output_data = None;
        self.completed_at = None;
        self.retry_count += 1;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.status == StepExecutionStatus::Failed && self.retry_count < MAX_RETRY_COUNT
    }

    pub fn duration(&self) -> Duration {
        match self.started_at {
            Some(started) => self.completed_at.unwrap_or_else(Utc::now) - started,
            None => Duration::zero(),
        }
    }
}
