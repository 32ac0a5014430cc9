//! Standardized error handling for the workflow engine
//!
//! Entity operations return typed failures instead of panicking: malformed
//! input is a `ValidationError` naming the failing field, an illegal state
//! transition is a `Conflict`.

use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> list of messages.
pub type ValidationDetails = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("Validation failed: {}", render_details(.details))]
    ValidationError { details: ValidationDetails },

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::ValidationError { details } => details
                .values()
                .flatten()
                .next()
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string()),
            Self::Conflict(msg) => msg.clone(),
            Self::NotFound(resource) => format!("{} not found", resource),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Messages recorded against one field of a validation error.
    pub fn field_errors(&self, field: &str) -> &[String] {
        match self {
            Self::ValidationError { details } => {
                details.get(field).map(Vec::as_slice).unwrap_or(&[])
            }
            _ => &[],
        }
    }
}

fn render_details(details: &ValidationDetails) -> String {
    details
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(format!("Malformed payload: {}", err))
    }
}

impl From<salesflow_shared::UnknownStatus> for AppError {
    fn from(err: salesflow_shared::UnknownStatus) -> Self {
        Self::InternalError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Helper to create validation errors
pub fn validation_error(field: &str, message: &str) -> AppError {
    let mut details = ValidationDetails::new();
    details.insert(field.to_string(), vec![message.to_string()]);
    AppError::ValidationError { details }
}

/// Helper to add multiple validation errors
pub struct ValidationBuilder {
    details: ValidationDetails,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: ValidationDetails::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
