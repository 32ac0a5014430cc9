// Workflow Executor - Runs a single step attempt

use regex::Regex;
use salesflow_shared::StepExecutionStatus;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::conditions::lookup_path;
use super::{ActionRegistry, ActionResult, ConditionEvaluator, StepAction, WorkflowExecution};
use crate::error::AppResult;

static TEMPLATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("template pattern is valid"));

/// Context for one step attempt
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub snapshot: Value,
    /// Outputs of completed steps keyed by step name
    pub variables: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn for_execution(execution: &WorkflowExecution) -> Self {
        let variables = execution
            .step_executions
            .iter()
            .filter(|se| se.status == StepExecutionStatus::Completed)
            .filter_map(|se| se.output_data.clone().map(|out| (se.step_name.clone(), out)))
            .collect();

        Self {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            tenant_id: execution.tenant_id,
            entity_id: execution.entity_id,
            entity_type: execution.entity_type.clone(),
            snapshot: execution.trigger_data.clone(),
            variables,
        }
    }

    /// Resolve a placeholder path: entity snapshot first, then step outputs
    /// (`Step name.field`).
    pub fn resolve(&self, path: &str) -> Option<Value> {
        if let Some(value) = lookup_path(&self.snapshot, path) {
            return Some(value.clone());
        }
        if let Some(value) = self.variables.get(path) {
            return Some(value.clone());
        }

        let (head, rest) = path.split_once('.')?;
        self.variables
            .get(head)
            .and_then(|output| lookup_path(output, rest))
            .cloned()
    }
}

/// Result of one step attempt
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: ActionResult,
    /// Forward jump chosen by a branch action
    pub next_step_order: Option<i32>,
}

pub struct WorkflowExecutor {
    registry: ActionRegistry,
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl WorkflowExecutor {
    pub fn new(registry: ActionRegistry, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self { registry, evaluator }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &Arc<dyn ConditionEvaluator> {
        &self.evaluator
    }

    /// Expand `{{path}}` placeholders in every string of the action configuration.
    /// Unresolved placeholders are left as written.
    pub fn prepare(&self, action: &StepAction, context: &ExecutionContext) -> AppResult<StepAction> {
        let raw = serde_json::to_value(action)?;
        let expanded = process_templates(&raw, context);
        Ok(serde_json::from_value(expanded)?)
    }

    /// Execute an already prepared action
    pub async fn execute(&self, action: &StepAction, context: &ExecutionContext) -> StepOutcome {
        let start = Instant::now();
        let kind = action.kind();

        info!("Executing {} action for execution {}", kind, context.execution_id);

        let mut next_step_order = None;
        let result = match action {
            StepAction::Wait(cfg) => ActionResult::success(Some(serde_json::json!({
                "waited_minutes": cfg.minutes
            }))),
            StepAction::Branch(cfg) => {
                let matched = self.evaluator.evaluate(&cfg.condition, &context.snapshot);
                next_step_order = if matched { cfg.on_true } else { cfg.on_false };
                debug!("Branch condition {} -> next step {:?}", matched, next_step_order);
                ActionResult::success(Some(serde_json::json!({
                    "condition_met": matched,
                    "next_step_order": next_step_order
                })))
            }
            _ => match self.registry.get(kind) {
                Some(handler) => handler.execute(action, context).await,
                None => ActionResult::failure(&format!("No handler registered for action '{}'", kind)),
            },
        };

        let duration = start.elapsed().as_millis() as i64;
        if !result.success {
            error!("Action {} failed: {}", kind, result.error_message());
        }

        StepOutcome {
            result: result.with_duration(duration),
            next_step_order,
        }
    }
}

fn process_templates(config: &Value, context: &ExecutionContext) -> Value {
    match config {
        Value::String(s) => Value::String(replace_template_vars(s, context)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), process_templates(v, context)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| process_templates(v, context)).collect()),
        _ => config.clone(),
    }
}

fn replace_template_vars(template: &str, context: &ExecutionContext) -> String {
    TEMPLATE_PATTERN
        .replace_all(template, |caps: &regex::Captures| match context.resolve(&caps[1]) {
            Some(Value::String(s)) => s,
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
