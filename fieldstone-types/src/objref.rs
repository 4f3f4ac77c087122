//! Typed object references.
//!
//! Reference values for object fields are stored in entity documents as
//! `"objType:id"` or `"objType:id|cachedName"`. This module gives that
//! encoding a single parse/format home so the save and query-compile
//! paths never split the string themselves.

use crate::{EntityId, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reference to another entity: object type, id, and an optional
/// cached display name.
///
/// The cached name is denormalized convenience data only — the
/// foreign-key refresh step of the save pipeline is what keeps it honest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjRef {
    pub obj_type: String,
    pub id: EntityId,
    pub name: Option<String>,
}

impl ObjRef {
    /// Creates a reference without a cached name.
    #[must_use]
    pub fn new(obj_type: impl Into<String>, id: EntityId) -> Self {
        Self {
            obj_type: obj_type.into(),
            id,
            name: None,
        }
    }

    /// Creates a reference carrying a cached display name.
    #[must_use]
    pub fn with_name(obj_type: impl Into<String>, id: EntityId, name: impl Into<String>) -> Self {
        Self {
            obj_type: obj_type.into(),
            id,
            name: Some(name.into()),
        }
    }

    /// Encodes to the stored string form, `objType:id` or `objType:id|name`.
    #[must_use]
    pub fn encode(&self) -> String {
        match &self.name {
            Some(name) => format!("{}:{}|{}", self.obj_type, self.id, name),
            None => format!("{}:{}", self.obj_type, self.id),
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for ObjRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, name) = match s.split_once('|') {
            Some((head, name)) => (head, Some(name.to_string())),
            None => (s, None),
        };
        let (obj_type, id) = head
            .split_once(':')
            .ok_or_else(|| Error::InvalidObjRef(s.to_string()))?;
        if obj_type.is_empty() {
            return Err(Error::InvalidObjRef(s.to_string()));
        }
        let id: EntityId = id
            .parse()
            .map_err(|_| Error::InvalidObjRef(s.to_string()))?;
        Ok(Self {
            obj_type: obj_type.to_string(),
            id,
            name,
        })
    }
}
