// Workflow Conditions - Boolean expressions over an entity snapshot

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Condition operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    // Equality
    Equals,
    NotEquals,

    // String operations
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,

    // Numeric comparisons
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,

    // Array operations
    In,
    NotIn,
    ArrayContains,

    // Null/Empty checks
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,

    // Boolean
    IsTrue,
    IsFalse,

    // Date comparisons
    DateBefore,
    DateAfter,
}

/// A single field comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldCondition {
    /// Field name to evaluate (supports dot notation for nested fields)
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
}

/// Group of conditions with AND/OR logic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConditionGroup {
    #[serde(default)]
    pub logic: LogicOperator,
    #[serde(default)]
    pub conditions: Vec<FieldCondition>,
    /// Nested condition groups for complex logic
    #[serde(default)]
    pub groups: Vec<ConditionGroup>,
}

impl FieldCondition {
    pub fn new(field: &str, operator: ConditionOperator, value: Option<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
            case_sensitive: false,
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, Some(value))
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, Some(value))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Some(Value::String(value.to_string())))
    }

    pub fn is_null(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsNull, None)
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsNotNull, None)
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, Some(serde_json::json!(value)))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, Some(serde_json::json!(value)))
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        Self::new(field, ConditionOperator::In, Some(Value::Array(values)))
    }

    pub fn regex(field: &str, pattern: &str) -> Self {
        Self::new(field, ConditionOperator::Regex, Some(Value::String(pattern.to_string())))
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

impl ConditionGroup {
    pub fn and(conditions: Vec<FieldCondition>) -> Self {
        Self {
            logic: LogicOperator::And,
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn or(conditions: Vec<FieldCondition>) -> Self {
        Self {
            logic: LogicOperator::Or,
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn with_nested_group(mut self, group: ConditionGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn add_condition(mut self, condition: FieldCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.groups.is_empty()
    }
}

/// Decides whether a condition group holds for an entity snapshot
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, group: &ConditionGroup, snapshot: &Value) -> bool;
}

/// Evaluates conditions directly against a JSON snapshot
#[derive(Debug, Clone, Default)]
pub struct JsonConditionEvaluator;

impl ConditionEvaluator for JsonConditionEvaluator {
    fn evaluate(&self, group: &ConditionGroup, snapshot: &Value) -> bool {
        if group.is_empty() {
            return true;
        }

        let mut results = group
            .conditions
            .iter()
            .map(|c| evaluate_field(c, snapshot))
            .chain(group.groups.iter().map(|g| self.evaluate(g, snapshot)));

        match group.logic {
            LogicOperator::And => results.all(|r| r),
            LogicOperator::Or => results.any(|r| r),
        }
    }
}

/// Resolve a dot-separated path (`owner.email`, `lines.0.sku`) inside a snapshot
pub fn lookup_path<'a>(snapshot: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = snapshot;

    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn evaluate_field(condition: &FieldCondition, snapshot: &Value) -> bool {
    let field_value = lookup_path(snapshot, &condition.field).filter(|v| !v.is_null());
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOperator::Equals => match (field_value, expected) {
            (Some(v), Some(e)) => values_equal(v, e, condition.case_sensitive),
            (None, None) | (None, Some(Value::Null)) => true,
            _ => false,
        },
        ConditionOperator::NotEquals => match (field_value, expected) {
            (Some(v), Some(e)) => !values_equal(v, e, condition.case_sensitive),
            (None, None) | (None, Some(Value::Null)) => false,
            _ => true,
        },
        ConditionOperator::Contains => {
            string_pair(field_value, expected, condition.case_sensitive)
                .map(|(s, p)| s.contains(&p))
                .unwrap_or(false)
        }
        ConditionOperator::NotContains => {
            string_pair(field_value, expected, condition.case_sensitive)
                .map(|(s, p)| !s.contains(&p))
                .unwrap_or(true)
        }
        ConditionOperator::StartsWith => {
            string_pair(field_value, expected, condition.case_sensitive)
                .map(|(s, p)| s.starts_with(&p))
                .unwrap_or(false)
        }
        ConditionOperator::EndsWith => {
            string_pair(field_value, expected, condition.case_sensitive)
                .map(|(s, p)| s.ends_with(&p))
                .unwrap_or(false)
        }
        ConditionOperator::Regex => {
            if let (Some(Value::String(s)), Some(Value::String(pattern))) = (field_value, expected) {
                if let Ok(re) = regex::Regex::new(pattern) {
                    return re.is_match(s);
                }
            }
            false
        }
        ConditionOperator::GreaterThan => compare_numbers(field_value, expected, |v, c| v > c),
        ConditionOperator::GreaterThanOrEquals => compare_numbers(field_value, expected, |v, c| v >= c),
        ConditionOperator::LessThan => compare_numbers(field_value, expected, |v, c| v < c),
        ConditionOperator::LessThanOrEquals => compare_numbers(field_value, expected, |v, c| v <= c),
        ConditionOperator::In => match (field_value, expected) {
            (Some(v), Some(Value::Array(options))) => options
                .iter()
                .any(|o| values_equal(v, o, condition.case_sensitive)),
            _ => false,
        },
        ConditionOperator::NotIn => match (field_value, expected) {
            (Some(v), Some(Value::Array(options))) => !options
                .iter()
                .any(|o| values_equal(v, o, condition.case_sensitive)),
            _ => true,
        },
        ConditionOperator::ArrayContains => match (field_value, expected) {
            (Some(Value::Array(items)), Some(e)) => items
                .iter()
                .any(|i| values_equal(i, e, condition.case_sensitive)),
            _ => false,
        },
        ConditionOperator::IsNull => field_value.is_none(),
        ConditionOperator::IsNotNull => field_value.is_some(),
        ConditionOperator::IsEmpty => field_value.map(is_empty_value).unwrap_or(true),
        ConditionOperator::IsNotEmpty => field_value.map(|v| !is_empty_value(v)).unwrap_or(false),
        ConditionOperator::IsTrue => matches!(field_value, Some(Value::Bool(true))),
        ConditionOperator::IsFalse => matches!(field_value, Some(Value::Bool(false))),
        ConditionOperator::DateBefore => compare_dates(field_value, expected, |v, c| v < c),
        ConditionOperator::DateAfter => compare_dates(field_value, expected, |v, c| v > c),
    }
}

fn values_equal(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) if !case_sensitive => a.to_lowercase() == b.to_lowercase(),
        (Value::Number(_), Value::Number(_)) => actual.as_f64() == expected.as_f64(),
        _ => actual == expected,
    }
}

fn string_pair(actual: Option<&Value>, expected: Option<&Value>, case_sensitive: bool) -> Option<(String, String)> {
    match (actual?, expected?) {
        (Value::String(s), Value::String(p)) if case_sensitive => Some((s.clone(), p.clone())),
        (Value::String(s), Value::String(p)) => Some((s.to_lowercase(), p.to_lowercase())),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers(actual: Option<&Value>, expected: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_number), expected.and_then(as_number)) {
        (Some(v), Some(c)) => cmp(v, c),
        _ => false,
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn compare_dates(
    actual: Option<&Value>,
    expected: Option<&Value>,
    cmp: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> bool {
    match (actual.and_then(as_datetime), expected.and_then(as_datetime)) {
        (Some(v), Some(c)) => cmp(v, c),
        _ => false,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Common condition presets for sales workflows
pub mod presets {
    use super::*;

    /// Deal reached the given pipeline stage
    pub fn stage(stage: &str) -> FieldCondition {
        FieldCondition::equals("stage", serde_json::json!(stage))
    }

    /// Record has no owner assigned
    pub fn unassigned() -> FieldCondition {
        FieldCondition::is_null("owner_id")
    }

    /// Deal amount above threshold
    pub fn amount_above(amount: f64) -> FieldCondition {
        FieldCondition::greater_than("amount", amount)
    }

    /// Customer flagged as a key account
    pub fn key_account() -> FieldCondition {
        FieldCondition::new("account.is_key_account", ConditionOperator::IsTrue, None)
    }

    /// Contact email belongs to a domain
    pub fn email_domain(domain: &str) -> FieldCondition {
        FieldCondition::new(
            "email",
            ConditionOperator::EndsWith,
            Some(Value::String(format!("@{}", domain.trim_start_matches('@')))),
        )
    }
}
