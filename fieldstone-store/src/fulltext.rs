//! Derived search text.
//!
//! Each entity row carries a `tsv_fulltext` column rebuilt on every save
//! from the document's text fields and cached reference display names.
//! The full-text pseudo-condition matches rows containing every token of
//! the query value, case-insensitively.

use fieldstone_model::{Entity, EntityDefinition, FieldType};

/// Concatenates the searchable text of an entity for the full-text column.
pub(crate) fn build_search_text(def: &EntityDefinition, entity: &Entity) -> String {
    let mut text = String::new();
    for field in &def.fields {
        match field.field_type {
            FieldType::Text => {
                if let Some(v) = entity.get_str(&field.name) {
                    text.push_str(v);
                    text.push(' ');
                }
            }
            ft if ft.is_reference() => {
                if let Some(names) = entity.value_names(&field.name) {
                    for name in names.values() {
                        text.push_str(name);
                        text.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
    text
}

/// Compiles a full-text predicate: every whitespace token of `value`
/// must appear in the search text. Returns None for an empty value.
pub(crate) fn fulltext_fragment(value: &str) -> Option<String> {
    let tokens: Vec<String> = value
        .split_whitespace()
        .map(|t| t.to_lowercase().replace('\'', "''"))
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let parts: Vec<String> = tokens
        .iter()
        .map(|t| format!("LOWER(tsv_fulltext) LIKE '%{t}%'"))
        .collect();
    Some(format!("({})", parts.join(" AND ")))
}
