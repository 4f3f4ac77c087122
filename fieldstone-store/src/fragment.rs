//! Condition-to-SQL compilation.
//!
//! One fragment per condition, produced by a per-type-per-operator
//! dispatch. An operator that is not implemented for a field's type
//! compiles to [`CompiledCondition::Unsupported`]; the executor drops
//! those conditions rather than erroring, so callers can rely on
//! unsupported combinations being no-ops.

use crate::error::{StoreError, StoreResult};
use crate::{fulltext, hierarchy};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use fieldstone_model::{EntityDefinition, Field, FieldType, DELETED_FIELD};
use fieldstone_query::{
    EntityQuery, IntervalDirection, IntervalUnit, LogicalOp, Operator, Where,
};
use fieldstone_types::{ObjRef, UserContext};
use rusqlite::Connection;
use serde_json::Value;
use tracing::debug;

/// The outcome of compiling one condition.
pub(crate) enum CompiledCondition {
    Sql(String),
    Unsupported,
}

/// Quotes a string literal for SQL.
pub(crate) fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// The JSON-extraction expression for a document field.
pub(crate) fn json_field(field: &str) -> String {
    format!("json_extract(field_data, '$.{field}')")
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Normalizes boolean-ish condition values ("yes", "true", "t", "1").
fn normalize_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_i64()? != 0),
        Value::String(s) => match s.to_lowercase().as_str() {
            "yes" | "true" | "t" | "1" => Some(true),
            "no" | "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Normalizes a numeric or structured date value to epoch seconds.
fn normalize_epoch(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return Some(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt.and_utc().timestamp());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
            }
            None
        }
        _ => None,
    }
}

/// Extracts a referenced entity/grouping id from a condition value:
/// a number, a numeric string, or an encoded `objType:id` reference.
pub(crate) fn ref_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return Some(n);
            }
            s.parse::<ObjRef>().ok().map(|r| r.id.as_i64())
        }
        _ => None,
    }
}

fn numeric_literal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            s.parse::<f64>().ok()?;
            Some(s.clone())
        }
        _ => None,
    }
}

fn ordering_sql(op: Operator) -> &'static str {
    match op {
        Operator::GreaterThan => ">",
        Operator::GreaterOrEqual => ">=",
        Operator::LessThan => "<",
        Operator::LessOrEqual => "<=",
        _ => unreachable!("not an ordering operator"),
    }
}

fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compiles one condition against a definition.
///
/// Unresolvable field names are a hard error; unimplemented
/// operator-and-type combinations come back as `Unsupported`.
pub(crate) fn compile_condition(
    conn: &Connection,
    def: &EntityDefinition,
    w: &Where,
    user: Option<&UserContext>,
) -> StoreResult<CompiledCondition> {
    if w.is_fulltext() {
        let term = w.value.as_str().unwrap_or_default();
        return Ok(match fulltext::fulltext_fragment(term) {
            Some(sql) => CompiledCondition::Sql(sql),
            None => CompiledCondition::Unsupported,
        });
    }

    // Cross-entity dereference (e.g. owner.team_id): recognized but not
    // compiled; the condition degrades to a no-op.
    if w.is_dereference() {
        debug!(field = %w.field_name, "dropping cross-entity dereference condition");
        return Ok(CompiledCondition::Unsupported);
    }

    let field = def
        .field(&w.field_name)
        .ok_or_else(|| StoreError::UnknownField {
            obj_type: def.obj_type.clone(),
            field: w.field_name.clone(),
        })?;

    // Current-user sentinel substitution on user-reference fields.
    let mut value = w.value.clone();
    if field.is_user_reference() && UserContext::is_current_user_sentinel(&value) {
        if let Some(user) = user {
            value = Value::from(user.id.as_i64());
        }
    }

    let fragment = match field.field_type {
        FieldType::Text => compile_text(field, w.operator, &value),
        FieldType::Bool => compile_bool(field, w.operator, &value),
        FieldType::Number => compile_number(field, w.operator, &value),
        FieldType::Date | FieldType::Timestamp => compile_datetime(field, w.operator, &value),
        FieldType::Object => compile_object(conn, def, field, w.operator, &value)?,
        FieldType::ObjectMulti => compile_object_multi(def, field, w.operator, &value),
        FieldType::Grouping => compile_grouping(conn, field, w.operator, &value)?,
        FieldType::GroupingMulti => compile_grouping_multi(conn, def, field, w.operator, &value)?,
    };
    Ok(fragment)
}

fn compile_text(field: &Field, op: Operator, value: &Value) -> CompiledCondition {
    let jf = json_field(&field.name);
    let frag = match op {
        Operator::Equal => {
            if is_empty_value(value) {
                format!("({jf} IS NULL OR {jf} = '')")
            } else {
                let v = sql_quote(value.as_str().unwrap_or_default());
                format!("LOWER({jf}) = LOWER({v})")
            }
        }
        Operator::NotEqual => {
            if is_empty_value(value) {
                format!("({jf} IS NOT NULL AND {jf} != '')")
            } else {
                let v = sql_quote(value.as_str().unwrap_or_default());
                format!("({jf} IS NULL OR LOWER({jf}) != LOWER({v}))")
            }
        }
        Operator::BeginsWith => {
            let Some(v) = value.as_str() else {
                return CompiledCondition::Unsupported;
            };
            let v = v.to_lowercase().replace('\'', "''");
            format!("LOWER({jf}) LIKE '{v}%'")
        }
        Operator::Contains => {
            let Some(v) = value.as_str() else {
                return CompiledCondition::Unsupported;
            };
            let v = v.to_lowercase().replace('\'', "''");
            format!("LOWER({jf}) LIKE '%{v}%'")
        }
        _ => return CompiledCondition::Unsupported,
    };
    CompiledCondition::Sql(frag)
}

fn compile_bool(field: &Field, op: Operator, value: &Value) -> CompiledCondition {
    let jf = json_field(&field.name);
    let Some(b) = normalize_bool(value) else {
        return CompiledCondition::Unsupported;
    };
    // An absent flag reads as false.
    let truthy = format!("{jf} = 1");
    let falsy = format!("({jf} IS NULL OR {jf} = 0)");
    let frag = match (op, b) {
        (Operator::Equal, true) | (Operator::NotEqual, false) => truthy,
        (Operator::Equal, false) | (Operator::NotEqual, true) => falsy,
        _ => return CompiledCondition::Unsupported,
    };
    CompiledCondition::Sql(frag)
}

fn compile_number(field: &Field, op: Operator, value: &Value) -> CompiledCondition {
    let jf = json_field(&field.name);
    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => format!("{jf} IS NULL"),
            Operator::NotEqual => format!("{jf} IS NOT NULL"),
            _ => return CompiledCondition::Unsupported,
        };
        return CompiledCondition::Sql(frag);
    }
    let Some(n) = numeric_literal(value) else {
        return CompiledCondition::Unsupported;
    };
    let frag = match op {
        Operator::Equal => format!("{jf} = {n}"),
        Operator::NotEqual => format!("({jf} IS NULL OR {jf} != {n})"),
        o if o.is_ordering() => format!("{jf} {} {n}", ordering_sql(o)),
        _ => return CompiledCondition::Unsupported,
    };
    CompiledCondition::Sql(frag)
}

fn interval_modifier(unit: IntervalUnit, count: i64, sign: char) -> String {
    // SQLite date modifiers have days/months/years; weeks become days.
    match unit {
        IntervalUnit::Days => format!("'{sign}{count} days'"),
        IntervalUnit::Weeks => format!("'{sign}{} days'", count * 7),
        IntervalUnit::Months => format!("'{sign}{count} months'"),
        IntervalUnit::Years => format!("'{sign}{count} years'"),
    }
}

fn compile_datetime(field: &Field, op: Operator, value: &Value) -> CompiledCondition {
    let jf = json_field(&field.name);

    if op.is_date_bucket() {
        let Some(n) = value.as_i64().or_else(|| value.as_str()?.parse().ok()) else {
            return CompiledCondition::Unsupported;
        };
        let part = match op {
            Operator::DayIsEqual => "%d",
            Operator::MonthIsEqual => "%m",
            Operator::YearIsEqual => "%Y",
            _ => unreachable!(),
        };
        return CompiledCondition::Sql(format!(
            "CAST(strftime('{part}', {jf}, 'unixepoch') AS INTEGER) = {n}"
        ));
    }

    if let Some((unit, direction)) = op.interval() {
        let Some(n) = value.as_i64().or_else(|| value.as_str()?.parse().ok()) else {
            return CompiledCondition::Unsupported;
        };
        let now = "CAST(strftime('%s', 'now') AS INTEGER)";
        let frag = match direction {
            IntervalDirection::Last => {
                let floor = format!(
                    "CAST(strftime('%s', 'now', {}) AS INTEGER)",
                    interval_modifier(unit, n, '-')
                );
                format!("({jf} >= {floor} AND {jf} <= {now})")
            }
            IntervalDirection::Next => {
                let ceil = format!(
                    "CAST(strftime('%s', 'now', {}) AS INTEGER)",
                    interval_modifier(unit, n, '+')
                );
                format!("({jf} >= {now} AND {jf} <= {ceil})")
            }
        };
        return CompiledCondition::Sql(frag);
    }

    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => format!("{jf} IS NULL"),
            Operator::NotEqual => format!("{jf} IS NOT NULL"),
            _ => return CompiledCondition::Unsupported,
        };
        return CompiledCondition::Sql(frag);
    }

    let Some(epoch) = normalize_epoch(value) else {
        return CompiledCondition::Unsupported;
    };
    let frag = match op {
        Operator::Equal => format!("{jf} = {epoch}"),
        Operator::NotEqual => format!("({jf} IS NULL OR {jf} != {epoch})"),
        o if o.is_ordering() => format!("{jf} {} {epoch}", ordering_sql(o)),
        _ => return CompiledCondition::Unsupported,
    };
    CompiledCondition::Sql(frag)
}

fn compile_object(
    conn: &Connection,
    def: &EntityDefinition,
    field: &Field,
    op: Operator,
    value: &Value,
) -> StoreResult<CompiledCondition> {
    let jf = json_field(&field.name);

    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => format!("({jf} IS NULL OR {jf} = '')"),
            Operator::NotEqual => format!("({jf} IS NOT NULL AND {jf} != '')"),
            _ => return Ok(CompiledCondition::Unsupported),
        };
        return Ok(CompiledCondition::Sql(frag));
    }

    let Some(id) = ref_id(value) else {
        return Ok(CompiledCondition::Unsupported);
    };

    if def.is_parent_field(&field.name) {
        // Hierarchy-aware operators on the declared parent field.
        let frag = match op {
            Operator::Equal => format!("{jf} = {id}"),
            Operator::NotEqual => {
                let subtree = hierarchy::descendant_entity_ids(conn, def, id)?;
                format!("({jf} IS NULL OR {jf} NOT IN ({}))", id_list(&subtree))
            }
            Operator::GreaterOrEqual => {
                let subtree = hierarchy::descendant_entity_ids(conn, def, id)?;
                format!("id IN ({})", id_list(&subtree))
            }
            Operator::LessOrEqual => {
                let ancestors = hierarchy::ancestor_entity_ids(conn, def, id)?;
                format!("id IN ({})", id_list(&ancestors))
            }
            _ => return Ok(CompiledCondition::Unsupported),
        };
        return Ok(CompiledCondition::Sql(frag));
    }

    let frag = match op {
        Operator::Equal => format!("{jf} = {id}"),
        Operator::NotEqual => format!("({jf} IS NULL OR {jf} != {id})"),
        _ => return Ok(CompiledCondition::Unsupported),
    };
    Ok(CompiledCondition::Sql(frag))
}

fn compile_object_multi(
    def: &EntityDefinition,
    field: &Field,
    op: Operator,
    value: &Value,
) -> CompiledCondition {
    let scope = format!(
        "a.obj_type = {} AND a.field = {} AND a.entity_id = {}.id",
        sql_quote(&def.obj_type),
        sql_quote(&field.name),
        def.table_name
    );

    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => {
                format!("NOT EXISTS (SELECT 1 FROM object_assoc a WHERE {scope})")
            }
            Operator::NotEqual => {
                format!("EXISTS (SELECT 1 FROM object_assoc a WHERE {scope})")
            }
            _ => return CompiledCondition::Unsupported,
        };
        return CompiledCondition::Sql(frag);
    }

    let Some(id) = ref_id(value) else {
        return CompiledCondition::Unsupported;
    };
    let target_type = match value.as_str().and_then(|s| s.parse::<ObjRef>().ok()) {
        Some(r) => Some(r.obj_type),
        None => field.subtype.clone(),
    };
    let mut filter = format!("{scope} AND a.target_id = {id}");
    if let Some(t) = target_type {
        filter.push_str(&format!(" AND a.target_obj_type = {}", sql_quote(&t)));
    }

    let frag = match op {
        Operator::Equal => format!("EXISTS (SELECT 1 FROM object_assoc a WHERE {filter})"),
        Operator::NotEqual => format!("NOT EXISTS (SELECT 1 FROM object_assoc a WHERE {filter})"),
        _ => return CompiledCondition::Unsupported,
    };
    CompiledCondition::Sql(frag)
}

fn compile_grouping(
    conn: &Connection,
    field: &Field,
    op: Operator,
    value: &Value,
) -> StoreResult<CompiledCondition> {
    let jf = json_field(&field.name);

    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => format!("({jf} IS NULL OR {jf} = '')"),
            Operator::NotEqual => format!("({jf} IS NOT NULL AND {jf} != '')"),
            _ => return Ok(CompiledCondition::Unsupported),
        };
        return Ok(CompiledCondition::Sql(frag));
    }

    let Some(id) = ref_id(value) else {
        return Ok(CompiledCondition::Unsupported);
    };
    let frag = match op {
        Operator::Equal => format!("{jf} = {id}"),
        Operator::NotEqual => format!("({jf} IS NULL OR {jf} != {id})"),
        Operator::GreaterOrEqual => {
            let ids = hierarchy::descendant_grouping_ids(conn, id)?;
            format!("{jf} IN ({})", id_list(&ids))
        }
        Operator::LessOrEqual => {
            let ids = hierarchy::ancestor_grouping_ids(conn, id)?;
            format!("{jf} IN ({})", id_list(&ids))
        }
        _ => return Ok(CompiledCondition::Unsupported),
    };
    Ok(CompiledCondition::Sql(frag))
}

fn compile_grouping_multi(
    conn: &Connection,
    def: &EntityDefinition,
    field: &Field,
    op: Operator,
    value: &Value,
) -> StoreResult<CompiledCondition> {
    let scope = format!(
        "m.obj_type = {} AND m.field = {} AND m.entity_id = {}.id",
        sql_quote(&def.obj_type),
        sql_quote(&field.name),
        def.table_name
    );

    if is_empty_value(value) {
        let frag = match op {
            Operator::Equal => {
                format!("NOT EXISTS (SELECT 1 FROM grouping_mem m WHERE {scope})")
            }
            Operator::NotEqual => {
                format!("EXISTS (SELECT 1 FROM grouping_mem m WHERE {scope})")
            }
            _ => return Ok(CompiledCondition::Unsupported),
        };
        return Ok(CompiledCondition::Sql(frag));
    }

    let Some(id) = ref_id(value) else {
        return Ok(CompiledCondition::Unsupported);
    };
    // Hierarchy expansion: membership in the group or any descendant.
    let ids = hierarchy::descendant_grouping_ids(conn, id)?;
    let filter = format!("{scope} AND m.grouping_id IN ({})", id_list(&ids));

    let frag = match op {
        Operator::Equal => format!("EXISTS (SELECT 1 FROM grouping_mem m WHERE {filter})"),
        Operator::NotEqual => format!("NOT EXISTS (SELECT 1 FROM grouping_mem m WHERE {filter})"),
        _ => return Ok(CompiledCondition::Unsupported),
    };
    Ok(CompiledCondition::Sql(frag))
}

/// Compiles the full WHERE clause for a query.
///
/// Fragments join left-to-right: consecutive AND conditions accumulate
/// into one parenthesized group, an OR closes the group. `A AND B OR C`
/// therefore compiles as `((A AND B) OR (C))` — order-sensitive by
/// design; this grouping is pinned by tests and must not be "fixed" to
/// standard precedence. Unless the query already filters on the
/// soft-delete field, a not-deleted clause is ANDed in.
///
/// Returns the clause (with leading `WHERE`, or empty) and the number of
/// dropped unsupported conditions.
pub(crate) fn build_where(
    conn: &Connection,
    def: &EntityDefinition,
    query: &EntityQuery,
    user: Option<&UserContext>,
) -> StoreResult<(String, usize)> {
    let mut fragments: Vec<(String, LogicalOp)> = Vec::new();
    let mut dropped = 0usize;

    for w in &query.wheres {
        match compile_condition(conn, def, w, user)? {
            CompiledCondition::Sql(sql) => fragments.push((sql, w.combiner)),
            CompiledCondition::Unsupported => {
                debug!(field = %w.field_name, operator = ?w.operator, "condition dropped");
                dropped += 1;
            }
        }
    }

    let mut groups: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for (frag, combiner) in fragments {
        if combiner == LogicalOp::Or && !current.is_empty() {
            groups.push(format!("({})", current.join(" AND ")));
            current = vec![frag];
        } else {
            current.push(frag);
        }
    }
    if !current.is_empty() {
        groups.push(format!("({})", current.join(" AND ")));
    }

    let conditions = match groups.len() {
        0 => String::new(),
        1 => groups.remove(0),
        _ => format!("({})", groups.join(" OR ")),
    };

    let implicit_deleted = def.has_deleted_field() && !query.has_condition_on(DELETED_FIELD);
    let deleted_clause = format!("COALESCE({}, 0) = 0", json_field(DELETED_FIELD));

    let clause = match (conditions.is_empty(), implicit_deleted) {
        (true, true) => format!("WHERE {deleted_clause}"),
        (true, false) => String::new(),
        (false, true) => format!("WHERE {conditions} AND {deleted_clause}"),
        (false, false) => format!("WHERE {conditions}"),
    };
    Ok((clause, dropped))
}
