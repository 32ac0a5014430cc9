// Workflow Actions - Typed step actions and the handlers that perform them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::{ConditionGroup, ExecutionContext};

/// Tag identifying which kind of action a step performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    CreateTask,
    UpdateField,
    CreateActivity,
    WebhookCall,
    AssignOwner,
    AddTag,
    Wait,
    Branch,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::SendEmail,
        ActionKind::CreateTask,
        ActionKind::UpdateField,
        ActionKind::CreateActivity,
        ActionKind::WebhookCall,
        ActionKind::AssignOwner,
        ActionKind::AddTag,
        ActionKind::Wait,
        ActionKind::Branch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::CreateTask => "create_task",
            ActionKind::UpdateField => "update_field",
            ActionKind::CreateActivity => "create_activity",
            ActionKind::WebhookCall => "webhook_call",
            ActionKind::AssignOwner => "assign_owner",
            ActionKind::AddTag => "add_tag",
            ActionKind::Wait => "wait",
            ActionKind::Branch => "branch",
        }
    }

    /// Control-flow actions are resolved by the executor, never by a handler
    pub fn is_control_flow(&self) -> bool {
        matches!(self, ActionKind::Wait | ActionKind::Branch)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendEmailConfig {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_in_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateFieldConfig {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateActivityConfig {
    pub activity_type: String,
    pub subject: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignOwnerConfig {
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddTagConfig {
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitConfig {
    pub minutes: u32,
}

/// Forward jump: `on_true`/`on_false` name the step order to continue at.
/// `None` continues with the next step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchConfig {
    pub condition: ConditionGroup,
    #[serde(default)]
    pub on_true: Option<i32>,
    #[serde(default)]
    pub on_false: Option<i32>,
}

/// An action with its strongly-typed configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum StepAction {
    SendEmail(SendEmailConfig),
    CreateTask(CreateTaskConfig),
    UpdateField(UpdateFieldConfig),
    CreateActivity(CreateActivityConfig),
    WebhookCall(WebhookConfig),
    AssignOwner(AssignOwnerConfig),
    AddTag(AddTagConfig),
    Wait(WaitConfig),
    Branch(BranchConfig),
}

impl StepAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            StepAction::SendEmail(_) => ActionKind::SendEmail,
            StepAction::CreateTask(_) => ActionKind::CreateTask,
            StepAction::UpdateField(_) => ActionKind::UpdateField,
            StepAction::CreateActivity(_) => ActionKind::CreateActivity,
            StepAction::WebhookCall(_) => ActionKind::WebhookCall,
            StepAction::AssignOwner(_) => ActionKind::AssignOwner,
            StepAction::AddTag(_) => ActionKind::AddTag,
            StepAction::Wait(_) => ActionKind::Wait,
            StepAction::Branch(_) => ActionKind::Branch,
        }
    }

    // ===== Builders =====

    pub fn send_email(to: &str, subject: &str, body: &str) -> Self {
        StepAction::SendEmail(SendEmailConfig {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            template_id: None,
        })
    }

    pub fn create_task(title: &str, assignee_id: Option<Uuid>, due_in_days: Option<u32>) -> Self {
        StepAction::CreateTask(CreateTaskConfig {
            title: title.to_string(),
            description: None,
            assignee_id,
            due_in_days,
        })
    }

    pub fn update_field(field: &str, value: serde_json::Value) -> Self {
        StepAction::UpdateField(UpdateFieldConfig {
            field: field.to_string(),
            value,
        })
    }

    pub fn create_activity(activity_type: &str, subject: &str) -> Self {
        StepAction::CreateActivity(CreateActivityConfig {
            activity_type: activity_type.to_string(),
            subject: subject.to_string(),
            notes: None,
        })
    }

    pub fn webhook(url: &str, payload: serde_json::Value) -> Self {
        StepAction::WebhookCall(WebhookConfig {
            url: url.to_string(),
            method: default_method(),
            headers: HashMap::new(),
            payload: Some(payload),
        })
    }

    pub fn assign_owner(owner_id: Uuid) -> Self {
        StepAction::AssignOwner(AssignOwnerConfig { owner_id })
    }

    pub fn add_tag(tag: &str) -> Self {
        StepAction::AddTag(AddTagConfig { tag: tag.to_string() })
    }

    pub fn wait(minutes: u32) -> Self {
        StepAction::Wait(WaitConfig { minutes })
    }

    pub fn branch(condition: ConditionGroup, on_true: Option<i32>, on_false: Option<i32>) -> Self {
        StepAction::Branch(BranchConfig {
            condition,
            on_true,
            on_false,
        })
    }
}

/// Result of executing an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl ActionResult {
    pub fn success(output: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(error: &str) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "Action failed without an error message".to_string())
    }
}

/// Performs the side effect of one action kind. Failures are reported as
/// `ActionResult::failure`, never as panics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: &StepAction, context: &ExecutionContext) -> ActionResult;
}

/// Dispatch table from action kind to handler
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn with_handler(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Register one handler for every action kind that needs one
    pub fn with_fallback(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        for kind in ActionKind::ALL.iter().filter(|k| !k.is_control_flow()) {
            self.handlers.entry(*kind).or_insert_with(|| handler.clone());
        }
        self
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}
