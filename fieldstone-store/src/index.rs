//! The entity query index: compiles typed queries to SQL, executes them,
//! and decodes rows back into entities.
//!
//! Each execution issues 2–3 statement classes: the page rows, a
//! separate `COUNT(*)` with the same WHERE for pagination metadata, and
//! one statement per aggregation request. They are not batched.

use crate::error::{StoreError, StoreResult};
use crate::fragment::{self, json_field};
use crate::schema;
use fieldstone_model::{DefinitionCache, Entity, EntityFactory};
use fieldstone_query::{
    AggregateValue, Aggregation, AggregationType, EntityQuery, QueryPluginRegistry, Results,
    TermCount,
};
use fieldstone_types::{CommitId, EntityId, Guid, UserContext};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Compiler and executor for entity queries.
pub struct EntityQueryIndex {
    conn: Arc<Mutex<Connection>>,
    definitions: Arc<DefinitionCache>,
    factory: Arc<EntityFactory>,
    plugins: QueryPluginRegistry,
    user: Option<UserContext>,
}

impl EntityQueryIndex {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        definitions: Arc<DefinitionCache>,
        factory: Arc<EntityFactory>,
    ) -> Self {
        Self {
            conn,
            definitions,
            factory,
            plugins: QueryPluginRegistry::new(),
            user: None,
        }
    }

    /// Sets the authenticated user for sentinel substitution.
    #[must_use]
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// Access to the plugin registry for per-objType and universal hooks.
    pub fn plugins_mut(&mut self) -> &mut QueryPluginRegistry {
        &mut self.plugins
    }

    /// Executes a query, reusing `existing` as the result page if given.
    ///
    /// A missing definition for the query's object type is a
    /// programming-contract violation and fails hard.
    pub fn execute_query(
        &self,
        query: &EntityQuery,
        existing: Option<Results>,
    ) -> StoreResult<Results> {
        let mut query = query.clone();
        self.plugins.run_before(&mut query);

        let def = self
            .definitions
            .get(&query.obj_type)
            .ok_or_else(|| StoreError::MissingDefinition(query.obj_type.clone()))?;

        let mut results = existing.unwrap_or_default();
        results.clear_entities();

        {
            let conn = self.conn.lock().unwrap();
            schema::ensure_entity_table(&conn, &def)?;

            let (where_clause, dropped) =
                fragment::build_where(&conn, &def, &query, self.user.as_ref())?;
            if dropped > 0 {
                debug!(obj_type = %query.obj_type, dropped, "query compiled with dropped conditions");
            }

            // Page rows.
            let mut sql = format!(
                "SELECT id, guid, field_data, revision, commit_id FROM {}",
                def.table_name
            );
            if !where_clause.is_empty() {
                sql.push(' ');
                sql.push_str(&where_clause);
            }
            if !query.order_by.is_empty() {
                let specs: Vec<String> = query
                    .order_by
                    .iter()
                    .map(|o| {
                        let expr = if o.field == "id" {
                            "id".to_string()
                        } else {
                            json_field(&o.field)
                        };
                        format!("{expr} {}", o.direction)
                    })
                    .collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&specs.join(", "));
            }
            match (query.limit, query.offset) {
                (Some(limit), 0) => sql.push_str(&format!(" LIMIT {limit}")),
                (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
                (None, offset) if offset > 0 => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                _ => {}
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<(i64, String, String, i64, Option<i64>)> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);

            for (id, guid, field_data, revision, commit_id) in rows {
                let entity = decode_row(
                    &self.factory,
                    &query.obj_type,
                    id,
                    &guid,
                    &field_data,
                    revision,
                    commit_id,
                )?;
                results.add_entity(entity);
            }

            // Total count: a genuinely separate round-trip, never derived
            // from the page size.
            let count_sql = format!("SELECT COUNT(*) FROM {} {}", def.table_name, where_clause);
            let total: i64 = conn.query_row(&count_sql, [], |row| row.get(0))?;
            results.total_num = total as usize;

            for agg in &query.aggregations {
                let value =
                    run_aggregation(&conn, &def.table_name, &where_clause, agg, results.total_num)?;
                results.set_aggregation(&agg.name, value);
            }
        }

        self.plugins.run_after(&query, &mut results);
        Ok(results)
    }
}

/// Decodes one stored row into an entity via the per-objType factory.
///
/// `<field>_fval` side keys (id → display name maps) move into the
/// entity's display-name cache; the changelog is reset because the
/// entity was loaded, not edited.
pub(crate) fn decode_row(
    factory: &EntityFactory,
    obj_type: &str,
    id: i64,
    guid: &str,
    field_data: &str,
    revision: i64,
    commit_id: Option<i64>,
) -> StoreResult<Entity> {
    let mut entity = factory.create(obj_type);
    entity.id = Some(EntityId::new(id));
    entity.guid = Guid::parse(guid)
        .map_err(|e| StoreError::InvalidData(format!("bad guid on row {id}: {e}")))?;
    entity.revision = revision;
    entity.commit_id = commit_id.map(CommitId::new);

    let mut doc: serde_json::Map<String, Value> = serde_json::from_str(field_data)?;
    let fval_keys: Vec<String> = doc
        .keys()
        .filter(|k| k.ends_with("_fval"))
        .cloned()
        .collect();
    for key in fval_keys {
        let field = key[..key.len() - "_fval".len()].to_string();
        if let Some(Value::Object(names)) = doc.remove(&key) {
            for (ref_key, name) in names {
                if let Value::String(name) = name {
                    entity.set_value_name(&field, &ref_key, &name);
                }
            }
        }
    }
    entity.set_values_raw(doc);
    entity.reset_dirty();
    Ok(entity)
}

fn run_aggregation(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    agg: &Aggregation,
    total: usize,
) -> StoreResult<AggregateValue> {
    let jf = json_field(&agg.field);

    let and_not_null = |clause: &str| {
        if clause.is_empty() {
            format!("WHERE {jf} IS NOT NULL")
        } else {
            format!("{clause} AND {jf} IS NOT NULL")
        }
    };

    let value = match agg.agg_type {
        AggregationType::Count => AggregateValue::Number(total as f64),
        AggregationType::Min | AggregationType::Max | AggregationType::Avg | AggregationType::Sum => {
            let func = match agg.agg_type {
                AggregationType::Min => "MIN",
                AggregationType::Max => "MAX",
                AggregationType::Avg => "AVG",
                _ => "SUM",
            };
            let sql = format!("SELECT {func}({jf}) FROM {table} {where_clause}");
            let n: Option<f64> = conn.query_row(&sql, [], |row| row.get(0))?;
            AggregateValue::Number(n.unwrap_or(0.0))
        }
        AggregationType::Stats => {
            let sql = format!(
                "SELECT MIN({jf}), MAX({jf}), AVG({jf}), SUM({jf}), COUNT(*) FROM {table} {where_clause}"
            );
            conn.query_row(&sql, [], |row| {
                Ok(AggregateValue::Stats {
                    min: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    max: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    avg: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    sum: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    count: row.get(4)?,
                })
            })?
        }
        AggregationType::Terms => {
            let sql = format!(
                "SELECT CAST({jf} AS TEXT), COUNT(*) FROM {table} {} GROUP BY 1 ORDER BY 2 DESC",
                and_not_null(where_clause)
            );
            let mut stmt = conn.prepare(&sql)?;
            let terms: Vec<TermCount> = stmt
                .query_map([], |row| {
                    Ok(TermCount {
                        term: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            AggregateValue::Terms(terms)
        }
    };
    Ok(value)
}
