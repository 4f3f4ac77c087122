//! The query aggregate: conditions, sorts, pagination, aggregations.

use crate::condition::Where;
use crate::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One ORDER BY spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Kinds of aggregation a query can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Min,
    Max,
    Avg,
    Sum,
    /// Min, max, avg, sum plus the filtered row count.
    Stats,
    /// One bucket per distinct value with its row count.
    Terms,
    /// Reuses the query's total row count; no extra statement.
    Count,
}

/// A named aggregation request over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub name: String,
    pub agg_type: AggregationType,
    pub field: String,
}

/// A typed query against a single object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub obj_type: String,
    pub wheres: Vec<Where>,
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
}

impl EntityQuery {
    /// Creates an unfiltered query for one object type.
    #[must_use]
    pub fn new(obj_type: &str) -> Self {
        Self {
            obj_type: obj_type.into(),
            wheres: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            aggregations: Vec::new(),
        }
    }

    /// Appends an AND-joined condition.
    #[must_use]
    pub fn and_where(mut self, field: &str, operator: Operator, value: Value) -> Self {
        self.wheres.push(Where::and(field, operator, value));
        self
    }

    /// Appends an OR-joined condition.
    #[must_use]
    pub fn or_where(mut self, field: &str, operator: Operator, value: Value) -> Self {
        self.wheres.push(Where::or(field, operator, value));
        self
    }

    /// Appends a sort spec.
    #[must_use]
    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page offset.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Adds a named aggregation request.
    #[must_use]
    pub fn add_aggregation(mut self, name: &str, agg_type: AggregationType, field: &str) -> Self {
        self.aggregations.push(Aggregation {
            name: name.into(),
            agg_type,
            field: field.into(),
        });
        self
    }

    /// True when any condition references the named field. Used by the
    /// index to decide whether to add the implicit soft-delete filter.
    #[must_use]
    pub fn has_condition_on(&self, field: &str) -> bool {
        self.wheres.iter().any(|w| w.field_name == field)
    }
}
