// Workflow Triggers - Entity events that can start a workflow execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of entity change a workflow listens for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerType {
    OnCreate,
    OnUpdate,
    OnDelete,
    /// Fires on updates that touch the named field
    FieldChange { field: String },
    /// Fires when the external scheduler emits the named schedule
    Scheduled { schedule: String },
    Manual,
}

impl TriggerType {
    /// Whether an entity change of this kind fires the trigger
    pub fn matches(&self, change: &ChangeKind) -> bool {
        match (self, change) {
            (TriggerType::OnCreate, ChangeKind::Created) => true,
            (TriggerType::OnUpdate, ChangeKind::Updated { .. }) => true,
            (TriggerType::OnDelete, ChangeKind::Deleted) => true,
            (TriggerType::FieldChange { field }, ChangeKind::Updated { changed_fields }) => {
                changed_fields.iter().any(|f| f == field)
            }
            (TriggerType::Scheduled { schedule }, ChangeKind::Scheduled { schedule: fired }) => {
                schedule == fired
            }
            (TriggerType::Manual, ChangeKind::Manual) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TriggerType::OnCreate => "on_create",
            TriggerType::OnUpdate => "on_update",
            TriggerType::OnDelete => "on_delete",
            TriggerType::FieldChange { .. } => "field_change",
            TriggerType::Scheduled { .. } => "scheduled",
            TriggerType::Manual => "manual",
        }
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated {
        #[serde(default)]
        changed_fields: Vec<String>,
    },
    Deleted,
    Scheduled { schedule: String },
    Manual,
}

/// Entity state at trigger time
pub type EntitySnapshot = serde_json::Value;

/// An entity event supplied by the CRM domain layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub change_kind: ChangeKind,
    pub snapshot: EntitySnapshot,
    /// Absent for automatic triggers
    pub actor: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    /// Create a new trigger event
    pub fn new(
        tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        change_kind: ChangeKind,
        snapshot: EntitySnapshot,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id,
            entity_type: entity_type.to_string(),
            entity_id,
            change_kind,
            snapshot,
            actor: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an entity created event
    pub fn created(tenant_id: Uuid, entity_type: &str, entity_id: Uuid, snapshot: EntitySnapshot) -> Self {
        Self::new(tenant_id, entity_type, entity_id, ChangeKind::Created, snapshot)
    }

    /// Create an entity updated event
    pub fn updated(
        tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        changed_fields: &[&str],
        snapshot: EntitySnapshot,
    ) -> Self {
        Self::new(
            tenant_id,
            entity_type,
            entity_id,
            ChangeKind::Updated {
                changed_fields: changed_fields.iter().map(|f| f.to_string()).collect(),
            },
            snapshot,
        )
    }

    /// Create an entity deleted event
    pub fn deleted(tenant_id: Uuid, entity_type: &str, entity_id: Uuid, snapshot: EntitySnapshot) -> Self {
        Self::new(tenant_id, entity_type, entity_id, ChangeKind::Deleted, snapshot)
    }

    /// Create a scheduled event
    pub fn scheduled(
        tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        schedule: &str,
        snapshot: EntitySnapshot,
    ) -> Self {
        Self::new(
            tenant_id,
            entity_type,
            entity_id,
            ChangeKind::Scheduled {
                schedule: schedule.to_string(),
            },
            snapshot,
        )
    }

    /// Create a manual invocation event
    pub fn manual(
        tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        actor: Uuid,
        snapshot: EntitySnapshot,
    ) -> Self {
        Self::new(tenant_id, entity_type, entity_id, ChangeKind::Manual, snapshot).with_actor(actor)
    }

    /// Record the user who caused the change
    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }
}
