// Workflow Automation Engine
//
// Event-driven sales automation: workflows react to CRM entity changes,
// run ordered steps with conditions and delays, and track every execution.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod execution;
pub mod executor;
pub mod handlers;
pub mod pg_store;
pub mod step;
pub mod step_execution;
pub mod store;
pub mod triggers;
pub mod workflow;

pub use actions::{
    ActionHandler, ActionKind, ActionRegistry, ActionResult, AddTagConfig, AssignOwnerConfig, BranchConfig,
    CreateActivityConfig, CreateTaskConfig, SendEmailConfig, StepAction, UpdateFieldConfig, WaitConfig, WebhookConfig,
};
pub use conditions::{
    ConditionEvaluator, ConditionGroup, ConditionOperator, FieldCondition, JsonConditionEvaluator, LogicOperator,
};
pub use engine::{EngineConfig, Interrupt, RetryPolicy, WorkflowEngine};
pub use execution::WorkflowExecution;
pub use executor::{ExecutionContext, StepOutcome, WorkflowExecutor};
pub use handlers::{LogOnlyHandler, WebhookHandler};
pub use pg_store::PgWorkflowStore;
pub use step::WorkflowStep;
pub use step_execution::WorkflowStepExecution;
pub use store::{InMemoryWorkflowStore, WorkflowStore};
pub use triggers::{ChangeKind, TriggerEvent, TriggerType};
pub use workflow::Workflow;
