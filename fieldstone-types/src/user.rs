//! Authenticated-user context.
//!
//! Queries may carry sentinel values meaning "the current user"; the
//! query index substitutes the real user id before compiling conditions
//! on user-reference fields.

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// Sentinel values accepted in condition values on user-reference fields.
pub const CURRENT_USER_SENTINELS: &[&str] = &["-3", "current_user"];

/// The user a request runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: EntityId,
    pub name: String,
}

impl UserContext {
    /// Creates a user context.
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Returns true if the given condition value is a current-user sentinel.
    #[must_use]
    pub fn is_current_user_sentinel(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::String(s) => CURRENT_USER_SENTINELS.contains(&s.as_str()),
            serde_json::Value::Number(n) => n.as_i64() == Some(-3),
            _ => false,
        }
    }
}
