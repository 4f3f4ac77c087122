//! Entity type definitions.
//!
//! An [`EntityDefinition`] describes one object type: its typed fields,
//! the table its documents live in, and the structural metadata the query
//! index and save pipeline consult (hierarchy parent field, unique-name
//! settings, revision policy). Definitions are immutable once loaded and
//! cached per objType.

use serde::{Deserialize, Serialize};

/// Name of the implicit soft-delete flag field present on every type.
pub const DELETED_FIELD: &str = "f_deleted";

/// The data type of an entity field.
///
/// The type determines which query operators are legal and how values are
/// encoded in the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Bool,
    Number,
    Date,
    Timestamp,
    /// Single reference to another entity by id.
    Object,
    /// Multi-valued references backed by the association table.
    ObjectMulti,
    /// Single-select categorical reference into the grouping table.
    Grouping,
    /// Multi-valued grouping membership.
    GroupingMulti,
}

impl FieldType {
    /// True for types whose values are lists backed by side tables.
    #[must_use]
    pub fn is_multi_value(&self) -> bool {
        matches!(self, FieldType::ObjectMulti | FieldType::GroupingMulti)
    }

    /// True for types that reference other records and carry a cached
    /// display name.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            FieldType::Object
                | FieldType::ObjectMulti
                | FieldType::Grouping
                | FieldType::GroupingMulti
        )
    }
}

/// When a field default fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultOn {
    /// Only when the entity is first created.
    Create,
    /// On every save, create included.
    Update,
}

/// What value a field default resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Current epoch seconds at save time.
    Now,
    /// The authenticated user's id.
    CurrentUser,
    /// A fixed JSON value.
    Literal(serde_json::Value),
}

/// A field's default-resolution rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefault {
    pub on: DefaultOn,
    pub value: DefaultValue,
}

/// One typed field of an entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Referenced objType for object fields; grouping namespace for
    /// grouping fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
}

impl Field {
    fn simple(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            subtype: None,
            readonly: false,
            default: None,
        }
    }

    /// Shorthand for a text field.
    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldType::Text)
    }

    /// Shorthand for a boolean field.
    pub fn bool(name: &str) -> Self {
        Self::simple(name, FieldType::Bool)
    }

    /// Shorthand for a numeric field.
    pub fn number(name: &str) -> Self {
        Self::simple(name, FieldType::Number)
    }

    /// Shorthand for a date field (epoch seconds, day precision).
    pub fn date(name: &str) -> Self {
        Self::simple(name, FieldType::Date)
    }

    /// Shorthand for a timestamp field (epoch seconds).
    pub fn timestamp(name: &str) -> Self {
        Self::simple(name, FieldType::Timestamp)
    }

    /// Shorthand for a single object reference.
    pub fn object(name: &str, subtype: &str) -> Self {
        Self {
            subtype: Some(subtype.into()),
            ..Self::simple(name, FieldType::Object)
        }
    }

    /// Shorthand for a multi-valued object reference.
    pub fn object_multi(name: &str, subtype: &str) -> Self {
        Self {
            subtype: Some(subtype.into()),
            ..Self::simple(name, FieldType::ObjectMulti)
        }
    }

    /// Shorthand for a single-select grouping.
    pub fn grouping(name: &str) -> Self {
        Self::simple(name, FieldType::Grouping)
    }

    /// Shorthand for a multi-valued grouping.
    pub fn grouping_multi(name: &str) -> Self {
        Self::simple(name, FieldType::GroupingMulti)
    }

    /// Marks the field readonly (set only by the system, not callers).
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Attaches a default-resolution rule.
    #[must_use]
    pub fn with_default(mut self, on: DefaultOn, value: DefaultValue) -> Self {
        self.default = Some(FieldDefault { on, value });
        self
    }

    /// True when this field holds user references (drives current-user
    /// sentinel substitution in the query index).
    #[must_use]
    pub fn is_user_reference(&self) -> bool {
        matches!(self.field_type, FieldType::Object | FieldType::ObjectMulti)
            && self.subtype.as_deref() == Some("user")
    }
}

/// Describes one entity type. Immutable once loaded; cached per objType.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub obj_type: String,
    pub fields: Vec<Field>,
    pub table_name: String,
    /// Object field pointing back at this type; enables hierarchy
    /// operators and descendant traversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    /// Colon-delimited unique-name settings path, e.g. `"parent_field:name"`.
    /// The last segment names the seed field (`"name"` means the computed
    /// display name); earlier segments are namespace filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name_path: Option<String>,
    /// Soft cap on the number of live rows for this type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capped: Option<u64>,
    #[serde(default = "default_true")]
    pub store_revisions: bool,
    /// Whether entities of this type may belong to a recurring series.
    #[serde(default)]
    pub recurs: bool,
}

fn default_true() -> bool {
    true
}

impl EntityDefinition {
    /// Creates a definition with the conventional table name and the
    /// implicit soft-delete field.
    #[must_use]
    pub fn new(obj_type: &str) -> Self {
        Self {
            obj_type: obj_type.into(),
            fields: vec![Field::bool(DELETED_FIELD).readonly()],
            table_name: format!("entities_{obj_type}"),
            parent_field: None,
            unique_name_path: None,
            capped: None,
            store_revisions: true,
            recurs: false,
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the hierarchy parent field.
    #[must_use]
    pub fn with_parent_field(mut self, name: &str) -> Self {
        self.parent_field = Some(name.into());
        self
    }

    /// Declares the unique-name settings path.
    #[must_use]
    pub fn with_unique_name(mut self, path: &str) -> Self {
        self.unique_name_path = Some(path.into());
        self
    }

    /// Caps the live row count for this type.
    #[must_use]
    pub fn with_capped(mut self, limit: u64) -> Self {
        self.capped = Some(limit);
        self
    }

    /// Disables revision-history snapshots.
    #[must_use]
    pub fn without_revisions(mut self) -> Self {
        self.store_revisions = false;
        self
    }

    /// Marks this type as recurrence-capable.
    #[must_use]
    pub fn with_recurrence(mut self) -> Self {
        self.recurs = true;
        self
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True when the named field is the declared hierarchy parent.
    #[must_use]
    pub fn is_parent_field(&self, name: &str) -> bool {
        self.parent_field.as_deref() == Some(name)
    }

    /// True when this type carries the soft-delete flag (always, by
    /// construction, unless a caller stripped it).
    #[must_use]
    pub fn has_deleted_field(&self) -> bool {
        self.field(DELETED_FIELD).is_some()
    }
}
