//! Query conditions.
//!
//! A [`Where`] names a field, an operator, a value, and the boolean
//! combinator joining it to the *previous* condition. Operator validity
//! per field type is enforced when the index compiles the condition, not
//! at construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Pseudo-field that compiles to a full-text predicate, bypassing
/// normal field resolution.
pub const FULLTEXT_FIELD: &str = "*";

/// How a condition joins with the prior one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

/// Unit of a relative date-interval operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// Direction of a relative date-interval operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalDirection {
    Last,
    Next,
}

/// Condition operators. Which are legal depends on the resolved field's
/// type; the index drops illegal combinations as typed no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    BeginsWith,
    Contains,
    DayIsEqual,
    MonthIsEqual,
    YearIsEqual,
    LastNumDays,
    LastNumWeeks,
    LastNumMonths,
    LastNumYears,
    NextNumDays,
    NextNumWeeks,
    NextNumMonths,
    NextNumYears,
}

impl Operator {
    /// True for the four ordering comparisons.
    #[must_use]
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::GreaterOrEqual
                | Operator::LessThan
                | Operator::LessOrEqual
        )
    }

    /// True for day/month/year bucket equality.
    #[must_use]
    pub fn is_date_bucket(&self) -> bool {
        matches!(
            self,
            Operator::DayIsEqual | Operator::MonthIsEqual | Operator::YearIsEqual
        )
    }

    /// Unit and direction for the relative-interval operators.
    #[must_use]
    pub fn interval(&self) -> Option<(IntervalUnit, IntervalDirection)> {
        let pair = match self {
            Operator::LastNumDays => (IntervalUnit::Days, IntervalDirection::Last),
            Operator::LastNumWeeks => (IntervalUnit::Weeks, IntervalDirection::Last),
            Operator::LastNumMonths => (IntervalUnit::Months, IntervalDirection::Last),
            Operator::LastNumYears => (IntervalUnit::Years, IntervalDirection::Last),
            Operator::NextNumDays => (IntervalUnit::Days, IntervalDirection::Next),
            Operator::NextNumWeeks => (IntervalUnit::Weeks, IntervalDirection::Next),
            Operator::NextNumMonths => (IntervalUnit::Months, IntervalDirection::Next),
            Operator::NextNumYears => (IntervalUnit::Years, IntervalDirection::Next),
            _ => return None,
        };
        Some(pair)
    }
}

/// One typed predicate in a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Where {
    pub field_name: String,
    pub operator: Operator,
    pub value: Value,
    pub combiner: LogicalOp,
}

impl Where {
    /// A condition AND-joined to the previous one.
    #[must_use]
    pub fn and(field_name: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value,
            combiner: LogicalOp::And,
        }
    }

    /// A condition OR-joined to the previous one.
    #[must_use]
    pub fn or(field_name: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value,
            combiner: LogicalOp::Or,
        }
    }

    /// True when this condition targets the full-text pseudo-field.
    #[must_use]
    pub fn is_fulltext(&self) -> bool {
        self.field_name == FULLTEXT_FIELD
    }

    /// True when the field name dereferences across entities
    /// (e.g. `owner.team_id`).
    #[must_use]
    pub fn is_dereference(&self) -> bool {
        !self.is_fulltext() && self.field_name.contains('.')
    }
}
