// Workflow Engine - Trigger intake and the re-entrant execution loop

use chrono::{DateTime, Duration, Utc};
use salesflow_shared::{ExecutionStatus, ExecutionSummary, StepExecutionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::step_execution::MAX_RETRY_COUNT;
use super::store::WorkflowStore;
use super::{
    ActionRegistry, ConditionEvaluator, ExecutionContext, TriggerEvent, Workflow, WorkflowExecution,
    WorkflowExecutor, WorkflowStep, WorkflowStepExecution,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Decides whether and when a failed step is attempted again
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Re-attempts after the first failure, never above the step cap
    pub max_retries: i32,
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_COUNT,
            initial_backoff: Duration::seconds(60),
            backoff_coefficient: 2.0,
            max_backoff: Duration::hours(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::zero(),
            backoff_coefficient: 1.0,
            max_backoff: Duration::zero(),
        }
    }

    /// Retries run in the same pass, without suspending the execution
    pub fn immediate(max_retries: i32) -> Self {
        Self::fixed(Duration::zero(), max_retries)
    }

    pub fn fixed(backoff: Duration, max_retries: i32) -> Self {
        Self {
            max_retries: max_retries.clamp(0, MAX_RETRY_COUNT),
            initial_backoff: backoff,
            backoff_coefficient: 1.0,
            max_backoff: backoff,
        }
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn should_retry(&self, step_execution: &WorkflowStepExecution) -> bool {
        step_execution.can_retry() && step_execution.retry_count < self.max_retries.min(MAX_RETRY_COUNT)
    }

    /// Backoff before the given retry (1-based)
    pub fn backoff_for(&self, retry: i32) -> Duration {
        if self.initial_backoff <= Duration::zero() {
            return Duration::zero();
        }

        let factor = self.backoff_coefficient.powi((retry - 1).max(0));
        let millis = (self.initial_backoff.num_milliseconds() as f64 * factor) as i64;
        Duration::milliseconds(millis).min(self.max_backoff.max(self.initial_backoff))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub retry_policy: RetryPolicy,
    /// Executions running longer than this are timed out by the sweep
    pub execution_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            execution_timeout: Duration::hours(24),
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry_policy: RetryPolicy::fixed(
                Duration::seconds(config.retry_backoff_seconds),
                config.max_step_retries,
            ),
            execution_timeout: Duration::minutes(config.execution_timeout_minutes),
        }
    }
}

/// Pending external request against an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interrupt {
    Cancel,
    Timeout,
}

enum StepAttempt {
    Succeeded { next_step_order: Option<i32> },
    Failed(String),
}

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    executor: WorkflowExecutor,
    config: EngineConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    interrupts: RwLock<HashMap<Uuid, Interrupt>>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: ActionRegistry,
        evaluator: Arc<dyn ConditionEvaluator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            executor: WorkflowExecutor::new(registry, evaluator),
            config,
            locks: Mutex::new(HashMap::new()),
            interrupts: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ===== Definitions =====

    pub async fn register_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        self.store.save_workflow(workflow).await?;
        info!("Registered workflow '{}' ({})", workflow.name, workflow.id);
        Ok(())
    }

    pub async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        if self.store.get_workflow(workflow.id).await?.is_none() {
            return Err(AppError::not_found("Workflow"));
        }
        self.store.save_workflow(workflow).await
    }

    pub async fn delete_workflow(&self, workflow_id: Uuid) -> AppResult<()> {
        if !self.store.delete_workflow(workflow_id).await? {
            return Err(AppError::not_found("Workflow"));
        }
        info!("Deleted workflow {}", workflow_id);
        Ok(())
    }

    pub async fn get_workflow(&self, workflow_id: Uuid) -> AppResult<Workflow> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workflow"))
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> AppResult<WorkflowExecution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workflow execution"))
    }

    // ===== Trigger intake =====

    /// Start one execution per matching active workflow. Returns the ids of
    /// the executions created for the event.
    pub async fn process_event(&self, event: &TriggerEvent) -> AppResult<Vec<Uuid>> {
        let mut workflows = self
            .store
            .list_active_workflows(event.tenant_id, &event.entity_type)
            .await?;
        workflows.sort_by_key(|w| w.execution_order);

        let mut started = Vec::new();

        for workflow in &workflows {
            if !workflow.trigger_type.matches(&event.change_kind) {
                continue;
            }

            if let Some(condition) = &workflow.trigger_condition {
                if !self.executor.evaluator().evaluate(condition, &event.snapshot) {
                    debug!("Workflow '{}' conditions not met", workflow.name);
                    continue;
                }
            }

            info!(
                "Workflow '{}' triggered by {} {} ({})",
                workflow.name,
                event.entity_type,
                event.entity_id,
                workflow.trigger_type.label()
            );

            match self
                .start_execution(workflow, event.entity_id, event.snapshot.clone(), event.actor)
                .await
            {
                Ok(execution) => started.push(execution.id),
                Err(e) => error!("Workflow '{}' could not start: {}", workflow.name, e),
            }
        }

        Ok(started)
    }

    /// Run an active workflow on demand, whatever its trigger type
    pub async fn start_manual(
        &self,
        workflow_id: Uuid,
        entity_id: Uuid,
        snapshot: serde_json::Value,
        actor: Uuid,
    ) -> AppResult<WorkflowExecution> {
        let workflow = self.get_workflow(workflow_id).await?;
        if !workflow.is_active {
            return Err(AppError::conflict("Workflow is not active"));
        }

        self.start_execution(&workflow, entity_id, snapshot, Some(actor)).await
    }

    async fn start_execution(
        &self,
        workflow: &Workflow,
        entity_id: Uuid,
        snapshot: serde_json::Value,
        triggered_by: Option<Uuid>,
    ) -> AppResult<WorkflowExecution> {
        let execution = WorkflowExecution::create(
            workflow.id,
            workflow.tenant_id,
            entity_id,
            &workflow.target_entity_type,
            workflow.step_count() as i32,
            triggered_by,
            snapshot,
        )?;
        self.store.save_execution(&execution).await?;

        self.run_execution(execution.id).await
    }

    // ===== Execution loop =====

    pub async fn run_execution(&self, execution_id: Uuid) -> AppResult<WorkflowExecution> {
        self.run_execution_at(execution_id, Utc::now()).await
    }

    async fn run_execution_at(&self, execution_id: Uuid, now: DateTime<Utc>) -> AppResult<WorkflowExecution> {
        let lock = self.lock_for(execution_id).await;
        let guard = lock.lock().await;

        let mut execution = match self.get_execution(execution_id).await {
            Ok(execution) => execution,
            Err(e) => {
                if e.error_code() == "NOT_FOUND" {
                    self.release_lock(execution_id).await;
                }
                return Err(e);
            }
        };
        let result = self.drive(&mut execution, now).await;

        // A request may have arrived after the loop's last check
        let interrupted = self.apply_interrupt(&mut execution).await;

        if execution.is_terminal() {
            self.release_lock(execution_id).await;
        }
        drop(guard);

        if let Err(e) = &result {
            error!("Execution {} stopped with error: {}", execution_id, e);
        }
        result?;
        interrupted?;

        // Requests recorded between the last check and the release
        if !execution.is_terminal() {
            if let Some(settled) = self.settle_interrupt(execution_id).await? {
                execution = settled;
            }
        }
        Ok(execution)
    }

    async fn drive(&self, execution: &mut WorkflowExecution, now: DateTime<Utc>) -> AppResult<()> {
        if self.apply_interrupt(execution).await? {
            return Ok(());
        }

        match execution.status {
            ExecutionStatus::Pending => execution.start()?,
            ExecutionStatus::Waiting => {
                if !execution.is_due(now) {
                    debug!("Execution {} is not due yet", execution.id);
                    return Ok(());
                }
                execution.resume()?;
                info!("Resuming execution {} at step {}", execution.id, execution.current_step_order);
            }
            ExecutionStatus::Running => {
                warn!("Execution {} was left running, continuing", execution.id);
            }
            _ => return Ok(()),
        }
        self.store.save_execution(execution).await?;

        let workflow = match self.store.get_workflow(execution.workflow_id).await? {
            Some(w) => w,
            None => {
                execution.fail("Workflow definition was deleted")?;
                self.store.save_execution(execution).await?;
                warn!("Execution {} failed: workflow {} no longer exists", execution.id, execution.workflow_id);
                return Ok(());
            }
        };

        let steps: Vec<WorkflowStep> = workflow.ordered_steps().into_iter().cloned().collect();

        for step in &steps {
            if step.step_order < execution.current_step_order {
                continue;
            }
            if execution
                .step_execution_for(step.id)
                .is_some_and(|se| se.status.is_settled())
            {
                continue;
            }

            if !step.is_enabled {
                debug!("Skipping disabled step '{}'", step.name);
                continue;
            }
            if let Some(conditions) = &step.conditions {
                if !self.executor.evaluator().evaluate(conditions, &execution.trigger_data) {
                    debug!("Skipping step '{}': conditions not met", step.name);
                    continue;
                }
            }

            let delay = step.effective_delay_minutes();
            if delay > 0 && execution.delay_served_step != Some(step.step_order) {
                execution.update_progress(step.step_order, execution.completed_steps, execution.failed_steps);
                execution.set_waiting(now + Duration::minutes(delay))?;
                self.store.save_execution(execution).await?;
                info!("Execution {} waiting {} minutes before step '{}'", execution.id, delay, step.name);
                return Ok(());
            }

            execution.update_progress(step.step_order, execution.completed_steps, execution.failed_steps);

            loop {
                if self.apply_interrupt(execution).await? {
                    return Ok(());
                }

                match self.attempt_step(execution, step).await? {
                    StepAttempt::Succeeded { next_step_order } => {
                        let current = next_step_order.unwrap_or(step.step_order);
                        if next_step_order.is_some() {
                            debug!("Branch at step '{}' jumps to order {}", step.name, current);
                        }
                        execution.update_progress(current, execution.completed_steps + 1, execution.failed_steps);
                        self.store.save_execution(execution).await?;
                        break;
                    }
                    StepAttempt::Failed(message) => {
                        let policy = &self.config.retry_policy;
                        let retry = execution
                            .step_execution_for_mut(step.id)
                            .filter(|se| policy.should_retry(se));

                        if let Some(se) = retry {
                            se.retry()?;
                            let attempt = se.retry_count;
                            let backoff = policy.backoff_for(attempt);

                            if backoff <= Duration::zero() {
                                warn!("Step '{}' failed, retrying ({}/{})", step.name, attempt, policy.max_retries);
                                self.store.save_execution(execution).await?;
                                continue;
                            }

                            execution.set_waiting(now + backoff)?;
                            self.store.save_execution(execution).await?;
                            warn!(
                                "Step '{}' failed, retry {}/{} in {}s",
                                step.name,
                                attempt,
                                policy.max_retries,
                                backoff.num_seconds()
                            );
                            return Ok(());
                        }

                        let failed = execution.failed_steps + 1;
                        execution.update_progress(step.step_order, execution.completed_steps, failed);

                        if step.continue_on_error {
                            warn!("Step '{}' failed, continuing: {}", step.name, message);
                            self.store.save_execution(execution).await?;
                            break;
                        }

                        execution.fail(&format!("Step '{}' failed: {}", step.name, message))?;
                        self.store.save_execution(execution).await?;
                        error!("Execution {} failed at step '{}': {}", execution.id, step.name, message);
                        self.record_run(execution).await;
                        return Ok(());
                    }
                }
            }
        }

        execution.complete()?;
        self.store.save_execution(execution).await?;
        info!(
            "Execution {} completed ({}/{} steps, {} failed)",
            execution.id, execution.completed_steps, execution.total_steps, execution.failed_steps
        );
        self.record_run(execution).await;
        Ok(())
    }

    async fn attempt_step(&self, execution: &mut WorkflowExecution, step: &WorkflowStep) -> AppResult<StepAttempt> {
        let context = ExecutionContext::for_execution(execution);
        let prepared = self.executor.prepare(&step.action, &context);
        let input = match &prepared {
            Ok(action) => serde_json::to_value(action)?,
            Err(_) => serde_json::to_value(&step.action)?,
        };

        if execution.step_execution_for(step.id).is_none() {
            let created = WorkflowStepExecution::create(execution.id, step, input.clone());
            execution.push_step_execution(created);
        }
        let execution_id = execution.id;
        let se = execution
            .step_execution_for_mut(step.id)
            .ok_or_else(|| AppError::InternalError(format!("Missing step execution in {}", execution_id)))?;

        if se.status == StepExecutionStatus::Running {
            let message = "Step was interrupted before it finished";
            se.fail(message)?;
            return Ok(StepAttempt::Failed(message.to_string()));
        }

        se.input_data = input;
        se.start()?;

        let action = match prepared {
            Ok(action) => action,
            Err(e) => {
                let message = format!("Invalid action configuration: {}", e);
                se.fail(&message)?;
                return Ok(StepAttempt::Failed(message));
            }
        };

        let outcome = self.executor.execute(&action, &context).await;
        if !outcome.result.success {
            let message = outcome.result.error_message();
            se.fail(&message)?;
            return Ok(StepAttempt::Failed(message));
        }

        if let Some(target) = outcome.next_step_order {
            if target <= step.step_order {
                let message = format!(
                    "Branch target {} must come after step order {}",
                    target, step.step_order
                );
                se.fail(&message)?;
                return Ok(StepAttempt::Failed(message));
            }
        }

        se.complete(outcome.result.output)?;
        Ok(StepAttempt::Succeeded {
            next_step_order: outcome.next_step_order,
        })
    }

    async fn record_run(&self, execution: &WorkflowExecution) {
        let at = execution.completed_at.unwrap_or_else(Utc::now);
        if let Err(e) = self.store.record_workflow_execution(execution.workflow_id, at).await {
            warn!("Could not record run of workflow {}: {}", execution.workflow_id, e);
        }
    }

    // ===== Resumption, cancellation, timeouts =====

    /// Resume every waiting execution that is due. Returns the ids touched.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let requested: Vec<Uuid> = self.interrupts.read().await.keys().copied().collect();
        for id in requested {
            if let Err(e) = self.settle_interrupt(id).await {
                warn!("Could not apply requested interrupt to execution {}: {}", id, e);
            }
        }

        let due = self.store.list_due_executions(now).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Resuming {} due executions", due.len());
        let runs = due.iter().map(|e| self.run_execution_at(e.id, now));
        let results = futures::future::join_all(runs).await;

        let mut resumed = Vec::new();
        for (execution, result) in due.iter().zip(results) {
            match result {
                Ok(_) => resumed.push(execution.id),
                Err(e) => error!("Failed to resume execution {}: {}", execution.id, e),
            }
        }
        Ok(resumed)
    }

    /// Continue executions left Pending or Running by a previous process
    pub async fn recover_interrupted(&self) -> AppResult<Vec<Uuid>> {
        let stranded: Vec<Uuid> = self
            .store
            .list_unfinished_executions()
            .await?
            .into_iter()
            .filter(|e| matches!(e.status, ExecutionStatus::Pending | ExecutionStatus::Running))
            .map(|e| e.id)
            .collect();

        for id in &stranded {
            if let Err(e) = self.run_execution(*id).await {
                error!("Failed to recover execution {}: {}", id, e);
            }
        }
        Ok(stranded)
    }

    /// Cancel an execution. Applied at once when no run is in flight, otherwise
    /// before the running loop's next step.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> AppResult<WorkflowExecution> {
        self.interrupt(execution_id, Interrupt::Cancel).await
    }

    /// Time out every unfinished execution older than the configured limit
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let cutoff = now - self.config.execution_timeout;
        let expired: Vec<Uuid> = self
            .store
            .list_unfinished_executions()
            .await?
            .into_iter()
            .filter(|e| e.started_at.unwrap_or(e.created_at) <= cutoff)
            .map(|e| e.id)
            .collect();

        let mut timed_out = Vec::new();
        for id in expired {
            match self.interrupt(id, Interrupt::Timeout).await {
                Ok(_) => timed_out.push(id),
                Err(e) => warn!("Could not time out execution {}: {}", id, e),
            }
        }

        if !timed_out.is_empty() {
            info!("Timed out {} executions", timed_out.len());
        }
        Ok(timed_out)
    }

    async fn interrupt(&self, execution_id: Uuid, interrupt: Interrupt) -> AppResult<WorkflowExecution> {
        let lock = self.lock_for(execution_id).await;
        let result = self.interrupt_with(&lock, execution_id, interrupt).await;

        let finished = match &result {
            Ok(execution) => execution.is_terminal(),
            Err(e) => e.is_conflict() || e.error_code() == "NOT_FOUND",
        };
        if finished {
            self.release_lock(execution_id).await;
        }
        result
    }

    async fn interrupt_with(
        &self,
        lock: &Mutex<()>,
        execution_id: Uuid,
        interrupt: Interrupt,
    ) -> AppResult<WorkflowExecution> {
        let Ok(_guard) = lock.try_lock() else {
            let execution = self.get_execution(execution_id).await?;
            // Surface the same conflict the transition would raise
            apply(&mut execution.clone(), interrupt)?;
            self.interrupts.write().await.insert(execution_id, interrupt);
            info!("{:?} requested for running execution {}", interrupt, execution_id);

            // The run may have released the lock after its last check
            return Ok(self.settle_interrupt(execution_id).await?.unwrap_or(execution));
        };

        let mut execution = self.get_execution(execution_id).await?;
        apply(&mut execution, interrupt)?;
        self.store.save_execution(&execution).await?;
        info!("Execution {} is now {}", execution_id, execution.status);
        Ok(execution)
    }

    /// Apply a recorded interrupt when no run holds the execution. A run that
    /// does hold it applies the interrupt itself before releasing.
    async fn settle_interrupt(&self, execution_id: Uuid) -> AppResult<Option<WorkflowExecution>> {
        if !self.interrupts.read().await.contains_key(&execution_id) {
            return Ok(None);
        }

        let lock = self.lock_for(execution_id).await;
        let Ok(_guard) = lock.try_lock() else {
            return Ok(None);
        };

        let mut execution = match self.get_execution(execution_id).await {
            Ok(execution) => execution,
            Err(e) => {
                self.interrupts.write().await.remove(&execution_id);
                self.release_lock(execution_id).await;
                return Err(e);
            }
        };
        self.apply_interrupt(&mut execution).await?;
        if execution.is_terminal() {
            self.release_lock(execution_id).await;
        }
        Ok(Some(execution))
    }

    async fn apply_interrupt(&self, execution: &mut WorkflowExecution) -> AppResult<bool> {
        let Some(interrupt) = self.interrupts.write().await.remove(&execution.id) else {
            return Ok(false);
        };
        if execution.is_terminal() {
            return Ok(false);
        }

        apply(execution, interrupt)?;
        self.store.save_execution(execution).await?;
        info!("Execution {} is now {}", execution.id, execution.status);
        Ok(true)
    }

    async fn lock_for(&self, execution_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(execution_id).or_default().clone()
    }

    async fn release_lock(&self, execution_id: Uuid) {
        self.locks.lock().await.remove(&execution_id);
    }

    // ===== History =====

    pub async fn execution_history(&self, workflow_id: Uuid, limit: usize) -> AppResult<Vec<ExecutionSummary>> {
        Ok(self
            .store
            .list_executions(workflow_id, limit)
            .await?
            .iter()
            .map(WorkflowExecution::summary)
            .collect())
    }
}

fn apply(execution: &mut WorkflowExecution, interrupt: Interrupt) -> AppResult<()> {
    match interrupt {
        Interrupt::Cancel => execution.cancel(),
        Interrupt::Timeout => execution.timeout(),
    }
}
