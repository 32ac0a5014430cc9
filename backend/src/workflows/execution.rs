// Workflow Execution - One run of a workflow against one entity

use chrono::{DateTime, Duration, Utc};
use salesflow_shared::{ExecutionStatus, ExecutionSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkflowStepExecution;
use crate::error::{AppError, AppResult, validation_error};
use crate::validation::Validator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// User who triggered the run, none for automatic triggers
    pub triggered_by: Option<Uuid>,
    /// Entity snapshot captured at trigger time
    pub trigger_data: serde_json::Value,
    pub current_step_order: i32,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub failed_steps: i32,
    pub error_message: Option<String>,
    /// Set while Waiting
    pub resume_at: Option<DateTime<Utc>>,
    /// Order of the step whose delay has already elapsed
    pub delay_served_step: Option<i32>,
    pub step_executions: Vec<WorkflowStepExecution>,
}

impl WorkflowExecution {
    pub fn create(
        workflow_id: Uuid,
        tenant_id: Uuid,
        entity_id: Uuid,
        entity_type: &str,
        total_steps: i32,
        triggered_by: Option<Uuid>,
        trigger_data: serde_json::Value,
    ) -> AppResult<Self> {
        Validator::new()
            .required_id(&workflow_id, "workflow_id")
            .required_id(&tenant_id, "tenant_id")
            .required_id(&entity_id, "entity_id")
            .required_string(entity_type, "entity_type")
            .error_if(total_steps <= 0, "total_steps", "Execution must have at least one step")
            .validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            workflow_id,
            tenant_id,
            entity_id,
            entity_type: entity_type.to_string(),
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            triggered_by,
            trigger_data,
            current_step_order: 0,
            total_steps,
            completed_steps: 0,
            failed_steps: 0,
            error_message: None,
            resume_at: None,
            delay_served_step: None,
            step_executions: Vec::new(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> AppResult<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(AppError::conflict(format!(
                "Cannot start execution in status {}",
                self.status
            )));
        }

        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Suspend until `resume_at`; the engine's tick picks the run back up
    pub fn set_waiting(&mut self, resume_at: DateTime<Utc>) -> AppResult<()> {
        if self.status != ExecutionStatus::Running {
            return Err(AppError::conflict(format!(
                "Cannot wait from status {}",
                self.status
            )));
        }

        self.status = ExecutionStatus::Waiting;
        self.resume_at = Some(resume_at);
        Ok(())
    }

    pub fn resume(&mut self) -> AppResult<()> {
        if self.status != ExecutionStatus::Waiting {
            return Err(AppError::conflict(format!(
                "Cannot resume execution in status {}",
                self.status
            )));
        }

        self.status = ExecutionStatus::Running;
        self.resume_at = None;
        self.delay_served_step = Some(self.current_step_order);
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Waiting && self.resume_at.is_none_or(|at| at <= now)
    }

    pub fn complete(&mut self) -> AppResult<()> {
        match self.status {
            ExecutionStatus::Completed => {
                Err(validation_error("status", "Execution is already completed"))
            }
            ExecutionStatus::Running => {
                self.status = ExecutionStatus::Completed;
                self.completed_at = Some(Utc::now());
                self.resume_at = None;
                Ok(())
            }
            other => Err(AppError::conflict(format!(
                "Cannot complete execution in status {}",
                other
            ))),
        }
    }

    /// Engine-level abort; valid from every non-terminal state
    pub fn fail(&mut self, error_message: &str) -> AppResult<()> {
        if error_message.trim().is_empty() {
            return Err(validation_error("error_message", "Error message is required"));
        }
        self.ensure_not_terminal("fail")?;

        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error_message.to_string());
        self.completed_at = Some(Utc::now());
        self.resume_at = None;
        Ok(())
    }

    pub fn cancel(&mut self) -> AppResult<()> {
        if matches!(self.status, ExecutionStatus::Completed | ExecutionStatus::Failed) {
            return Err(AppError::conflict("Cannot cancel completed or failed execution"));
        }
        self.ensure_not_terminal("cancel")?;

        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.resume_at = None;
        Ok(())
    }

    /// Watchdog transition
    pub fn timeout(&mut self) -> AppResult<()> {
        self.ensure_not_terminal("time out")?;

        self.status = ExecutionStatus::TimedOut;
        self.completed_at = Some(Utc::now());
        self.resume_at = None;
        Ok(())
    }

    pub fn update_progress(&mut self, current_step_order: i32, completed_steps: i32, failed_steps: i32) {
        self.current_step_order = current_step_order;
        self.completed_steps = completed_steps;
        self.failed_steps = failed_steps;
    }

    pub fn duration(&self) -> Duration {
        match self.started_at {
            Some(started) => self.completed_at.unwrap_or_else(Utc::now) - started,
            None => Duration::zero(),
        }
    }

    pub fn success_rate(&self) -> u32 {
        if self.total_steps <= 0 {
            return 0;
        }
        let rate = (self.completed_steps as f64 * 100.0 / self.total_steps as f64).round();
        rate.max(0.0) as u32
    }

    pub fn step_execution_for(&self, step_id: Uuid) -> Option<&WorkflowStepExecution> {
        self.step_executions.iter().find(|se| se.step_id == step_id)
    }

    pub fn step_execution_for_mut(&mut self, step_id: Uuid) -> Option<&mut WorkflowStepExecution> {
        self.step_executions.iter_mut().find(|se| se.step_id == step_id)
    }

    pub fn push_step_execution(&mut self, step_execution: WorkflowStepExecution) {
        self.step_executions.push(step_execution);
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            id: self.id,
            workflow_id: self.workflow_id,
            entity_id: self.entity_id,
            entity_type: self.entity_type.clone(),
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_steps: self.total_steps,
            completed_steps: self.completed_steps,
            failed_steps: self.failed_steps,
            success_rate: self.success_rate(),
            error_message: self.error_message.clone(),
        }
    }

    fn ensure_not_terminal(&self, action: &str) -> AppResult<()> {
        if self.is_terminal() {
            return Err(AppError::conflict(format!(
                "Cannot {} execution in status {}",
                action, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(total_steps: i32) -> WorkflowExecution {
        WorkflowExecution::create(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Deal",
            total_steps,
            None,
            serde_json::json!({"stage": "negotiation"}),
        )
        .unwrap()
    }

    fn running(total_steps: i32) -> WorkflowExecution {
        let mut exec = execution(total_steps);
        exec.start().unwrap();
        exec
    }

    #[test]
    fn test_create_validation() {
        let err = WorkflowExecution::create(Uuid::nil(), Uuid::new_v4(), Uuid::new_v4(), "Deal", 0, None, serde_json::json!({}))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.field_errors("workflow_id").len(), 1);
        assert_eq!(err.field_errors("total_steps").len(), 1);
    }

    #[test]
    fn test_start_only_from_pending() {
        let mut exec = execution(1);
        exec.start().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.started_at.is_some());
        assert!(exec.start().unwrap_err().is_conflict());
    }

    #[test]
    fn test_waiting_round_trip_marks_delay_served() {
        let mut exec = execution(2);
        assert!(exec.set_waiting(Utc::now()).unwrap_err().is_conflict());

        exec.start().unwrap();
        exec.update_progress(4, 0, 0);
        let resume_at = Utc::now() + Duration::minutes(10);
        exec.set_waiting(resume_at).unwrap();
        assert!(!exec.is_due(Utc::now()));
        assert!(exec.is_due(resume_at));

        exec.resume().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.delay_served_step, Some(4));
        assert!(exec.resume_at.is_none());
        assert!(exec.resume().unwrap_err().is_conflict());
    }

    #[test]
    fn test_success_rate_after_progress() {
        let mut exec = running(5);
        exec.update_progress(3, 3, 0);
        exec.complete().unwrap();
        assert_eq!(exec.success_rate(), 60);
        assert_eq!(exec.summary().success_rate, 60);
    }

    #[test]
    fn test_success_rate_rounds() {
        let mut exec = running(3);
        exec.update_progress(2, 2, 0);
        assert_eq!(exec.success_rate(), 67);
        exec.total_steps = 0;
        assert_eq!(exec.success_rate(), 0);
    }

    #[test]
    fn test_complete_twice_keeps_completed_at() {
        let mut exec = running(1);
        exec.complete().unwrap();
        let completed_at = exec.completed_at;

        let err = exec.complete().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(exec.completed_at, completed_at);
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_complete_requires_running() {
        let mut exec = execution(1);
        assert!(exec.complete().unwrap_err().is_conflict());
    }

    #[test]
    fn test_cancel_completed_execution() {
        let mut exec = running(1);
        exec.complete().unwrap();
        let before = exec.clone();

        let err = exec.cancel().unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.message(), "Cannot cancel completed or failed execution");
        assert_eq!(exec, before);
    }

    #[test]
    fn test_cancel_failed_execution() {
        let mut exec = running(1);
        exec.fail("Webhook rejected").unwrap();
        assert_eq!(
            exec.cancel().unwrap_err().message(),
            "Cannot cancel completed or failed execution"
        );
    }

    #[test]
    fn test_cancel_succeeds_from_live_states() {
        let mut pending = execution(1);
        pending.cancel().unwrap();
        assert_eq!(pending.status, ExecutionStatus::Cancelled);
        assert!(pending.completed_at.is_some());
        assert!(pending.cancel().unwrap_err().is_conflict());

        let mut run = running(1);
        run.cancel().unwrap();
        assert_eq!(run.status, ExecutionStatus::Cancelled);

        let mut waiting = running(1);
        waiting.set_waiting(Utc::now()).unwrap();
        waiting.cancel().unwrap();
        assert_eq!(waiting.status, ExecutionStatus::Cancelled);
        assert!(waiting.resume_at.is_none());
    }

    #[test]
    fn test_fail_requires_message_and_live_state() {
        let mut exec = execution(1);
        assert!(exec.fail("  ").unwrap_err().is_validation());
        assert_eq!(exec.status, ExecutionStatus::Pending);

        exec.fail("Workflow definition was deleted").unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.completed_at.is_some());
        assert!(exec.fail("again").unwrap_err().is_conflict());
    }

    #[test]
    fn test_timeout() {
        let mut exec = running(1);
        exec.set_waiting(Utc::now()).unwrap();
        exec.timeout().unwrap();
        assert_eq!(exec.status, ExecutionStatus::TimedOut);
        assert!(exec.timeout().unwrap_err().is_conflict());
        assert!(exec.start().is_err());
        assert!(exec.complete().is_err());
    }

    #[test]
    fn test_no_transition_after_terminal() {
        let mut exec = running(2);
        exec.cancel().unwrap();
        assert!(exec.start().is_err());
        assert!(exec.set_waiting(Utc::now()).is_err());
        assert!(exec.resume().is_err());
        assert!(exec.complete().is_err());
        assert!(exec.fail("late failure").is_err());
        assert!(exec.timeout().is_err());
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn test_duration() {
        let exec = execution(1);
        assert_eq!(exec.duration(), Duration::zero());

        let mut exec = running(1);
        exec.started_at = Some(Utc::now() - Duration::minutes(5));
        exec.complete().unwrap();
        assert!(exec.duration() >= Duration::minutes(5));
    }
}
