//! Input validation for workflow definitions
//!
//! Provides type-safe validation with clear error messages.

use crate::error::{AppResult, ValidationBuilder, validation_error};

/// Validation result type
pub type ValidationResult<T> = AppResult<T>;

/// String validation helpers
pub mod string {
    use super::*;

    /// Validate required non-empty string
    pub fn required(value: &str, field: &str) -> ValidationResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(validation_error(field, &format!("{} is required", field)));
        }
        Ok(trimmed.to_string())
    }

    /// Validate string with max length
    pub fn max_length(value: &str, field: &str, max: usize) -> ValidationResult<()> {
        if value.chars().count() > max {
            return Err(validation_error(
                field,
                &format!("{} must be {} characters or less", field, max),
            ));
        }
        Ok(())
    }

    /// Validate required string with an upper length bound
    pub fn required_length(value: &str, field: &str, max: usize) -> ValidationResult<String> {
        let s = required(value, field)?;
        max_length(&s, field, max)?;
        Ok(s)
    }
}

/// UUID validation
pub mod uuid {
    use super::*;

    /// A nil UUID stands for a missing reference.
    pub fn required(value: &::uuid::Uuid, field: &str) -> ValidationResult<::uuid::Uuid> {
        if value.is_nil() {
            return Err(validation_error(field, &format!("{} is required", field)));
        }
        Ok(*value)
    }
}

/// Numeric validation
pub mod number {
    use super::*;

    /// Validate number in range
    pub fn in_range(value: i64, field: &str, min: i64, max: i64) -> ValidationResult<i64> {
        if value < min || value > max {
            return Err(validation_error(
                field,
                &format!("{} must be between {} and {}", field, min, max),
            ));
        }
        Ok(value)
    }

    pub fn non_negative(value: i64, field: &str) -> ValidationResult<i64> {
        if value < 0 {
            return Err(validation_error(
                field,
                &format!("{} cannot be negative", field),
            ));
        }
        Ok(value)
    }
}

/// Validator builder for validations that report every failing field at once
pub struct Validator {
    builder: ValidationBuilder,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            builder: ValidationBuilder::new(),
        }
    }

    /// Add error for a field
    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.builder = self.builder.error(field, message);
        self
    }

    /// Add error if condition is true
    pub fn error_if(self, condition: bool, field: &str, message: &str) -> Self {
        if condition {
            self.error(field, message)
        } else {
            self
        }
    }

    /// Validate required string
    pub fn required_string(self, value: &str, field: &str) -> Self {
        let empty = value.trim().is_empty();
        self.error_if(empty, field, &format!("{} is required", field))
    }

    /// Validate max length
    pub fn max_length(self, value: &str, field: &str, max: usize) -> Self {
        let too_long = value.chars().count() > max;
        self.error_if(
            too_long,
            field,
            &format!("{} must be {} characters or less", field, max),
        )
    }

    /// Validate required reference
    pub fn required_id(self, value: &::uuid::Uuid, field: &str) -> Self {
        self.error_if(value.is_nil(), field, &format!("{} is required", field))
    }

    /// Validate non-negative integer
    pub fn non_negative(self, value: i64, field: &str) -> Self {
        self.error_if(value < 0, field, &format!("{} cannot be negative", field))
    }

    /// Finish validation
    pub fn validate(self) -> ValidationResult<()> {
        match self.builder.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.builder.has_errors()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
