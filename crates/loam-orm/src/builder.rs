//! The relation-resolving query builder.
//!
//! `evaluate()` runs in two phases. The row phase fetches candidate ids
//! first so the cache can be consulted before any hydration, then fetches
//! only the rows the cache does not cover. The relation phase walks every
//! foreign-key and list field of the result set, materializes the related
//! objects with the same row phase, and recurses into their relations.
//!
//! Related objects are attached by primary key, never by row position, and
//! a visited set of (entity, ids) per resolution chain stops the recursion
//! from re-descending into objects already materialized, so cyclic data
//! resolves instead of looping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use loam_sql::{Expr, Limit, SelectQuery};

use crate::error::{OrmError, Result};
use crate::instance::{borrow, FieldValue, Instance, Reference, SharedInstance};
use crate::repository::Repository;
use crate::schema::{EntitySchema, FieldDef, FieldKind};
use crate::store::SqlValue;

/// Entities and ids already materialized in the current resolution chain.
type Visited = HashMap<String, HashSet<i64>>;

/// A selection over one entity, with an optional condition and limit.
///
/// # Example
///
/// ```ignore
/// let adults = repo
///     .select("Person")?
///     .filter(Expr::gt(person.column_ref("age")?, 17))?
///     .limit(50)?
///     .evaluate()
///     .await?;
/// ```
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    repo: &'a mut Repository,
    schema: Arc<EntitySchema>,
    condition: Option<Expr>,
    limit: Option<Limit>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(repo: &'a mut Repository, schema: Arc<EntitySchema>) -> Self {
        Self {
            repo,
            schema,
            condition: None,
            limit: None,
        }
    }

    /// Attaches the filter condition.
    ///
    /// # Errors
    ///
    /// [`OrmError::MultipleWhereClauses`] if a condition is already set.
    pub fn filter(mut self, condition: Expr) -> Result<Self> {
        if self.condition.is_some() {
            return Err(OrmError::MultipleWhereClauses);
        }
        self.condition = Some(condition);
        Ok(self)
    }

    /// Caps the number of primary rows.
    ///
    /// # Errors
    ///
    /// [`OrmError::MultipleLimitClauses`] if a limit is already set.
    pub fn limit(mut self, rows: u64) -> Result<Self> {
        if self.limit.is_some() {
            return Err(OrmError::MultipleLimitClauses);
        }
        self.limit = Some(Limit::new(rows));
        Ok(self)
    }

    /// Renders the top-level query without executing it. Relation
    /// sub-queries are issued only by [`evaluate`](Self::evaluate).
    ///
    /// # Errors
    ///
    /// Construction errors from the descriptor layer.
    pub fn to_sql(&self) -> Result<String> {
        Ok(row_query(&self.schema, self.condition.clone(), self.limit)?.to_sql())
    }

    /// Executes the query and returns the matching instances with every
    /// foreign-key and list field resolved, recursively.
    ///
    /// # Errors
    ///
    /// Store and construction errors propagate unchanged;
    /// [`OrmError::UnresolvedEntityReference`] if a relation targets an
    /// unregistered entity.
    pub async fn evaluate(self) -> Result<Vec<SharedInstance>> {
        let Self {
            repo,
            schema,
            condition,
            limit,
        } = self;

        let objects = collect_objects(repo, &schema, condition, limit).await?;
        if objects.is_empty() {
            return Ok(objects);
        }

        let mut visited = Visited::new();
        mark_visited(&mut visited, &schema, &objects);
        resolve_relations(repo, schema, objects.clone(), &mut visited).await?;
        Ok(objects)
    }
}

/// Builds the SELECT over an entity's non-list fields.
fn row_query(
    schema: &EntitySchema,
    condition: Option<Expr>,
    limit: Option<Limit>,
) -> Result<SelectQuery> {
    let projection = schema
        .fields()
        .iter()
        .filter(|field| !field.kind().is_list())
        .map(|field| schema.column_ref(field.name()))
        .collect::<Result<Vec<_>>>()?;
    Ok(SelectQuery::new(
        projection,
        condition,
        limit,
        Some(schema.table_name()),
    )?)
}

/// Fetches the instances matching `condition`, serving already-cached rows
/// from the cache and hydrating only the remainder.
async fn collect_objects(
    repo: &mut Repository,
    schema: &Arc<EntitySchema>,
    condition: Option<Expr>,
    limit: Option<Limit>,
) -> Result<Vec<SharedInstance>> {
    let key_column = schema.column_ref(schema.primary_key().name())?;

    // Candidate ids first, so cached objects can be recognized before any
    // row is hydrated.
    let id_query = SelectQuery::new(vec![key_column.clone()], condition.clone(), limit, None)?;
    let candidate_ids = integer_column(repo.get_rows(&id_query.to_sql()).await?);

    let cached = repo.get_objects(schema.name(), &candidate_ids);
    let cached_ids: Vec<i64> = cached.iter().filter_map(|object| borrow(object).id()).collect();

    let missing = Expr::not_in(key_column, cached_ids);
    let remainder_condition = match condition {
        Some(existing) => Expr::and(existing, missing),
        None => missing,
    };

    let query = row_query(schema, Some(remainder_condition), limit)?;
    let rows = repo.get_rows(&query.to_sql()).await?;

    let key_index = schema
        .fields()
        .iter()
        .filter(|field| !field.kind().is_list())
        .position(|field| field.kind().is_primary_key());

    let mut fresh = Vec::with_capacity(rows.len());
    for row in rows {
        // A limit makes the remainder scan run past the candidate set once
        // some candidates are served from cache; only candidate rows become
        // objects.
        let id = key_index.and_then(|index| match row.get(index) {
            Some(SqlValue::Integer(id)) => Some(*id),
            _ => None,
        });
        if id.is_some_and(|id| candidate_ids.contains(&id)) {
            fresh.push(hydrate(schema, row)?);
        }
    }
    repo.update_cache(&fresh);

    let mut objects = cached;
    objects.extend(fresh);
    Ok(objects)
}

/// Builds an instance from one row, zipping the non-list fields with the
/// row's values. Foreign-key columns become pending references, resolved by
/// the relation phase.
fn hydrate(schema: &Arc<EntitySchema>, row: Vec<SqlValue>) -> Result<SharedInstance> {
    let mut instance = Instance::new(schema.clone());
    let fields = schema.fields().iter().filter(|field| !field.kind().is_list());

    for (field, value) in fields.zip(row) {
        match (field.kind(), value) {
            (FieldKind::PrimaryKey, SqlValue::Integer(id)) => {
                instance.set(field.name(), FieldValue::Integer(id))?;
            }
            (FieldKind::Integer, SqlValue::Integer(value)) => {
                instance.set(field.name(), FieldValue::Integer(value))?;
            }
            (FieldKind::Real, SqlValue::Real(value)) => {
                instance.set(field.name(), FieldValue::Real(value))?;
            }
            (FieldKind::Real, SqlValue::Integer(value)) => {
                // SQLite hands back an integer for round-valued REAL cells.
                #[allow(clippy::cast_precision_loss)]
                instance.set(field.name(), FieldValue::Real(value as f64))?;
            }
            (FieldKind::Text, SqlValue::Text(value)) => {
                instance.set(field.name(), FieldValue::Text(value))?;
            }
            (FieldKind::ForeignKey { .. }, SqlValue::Integer(id)) => {
                instance.set(field.name(), FieldValue::Reference(Reference::Pending(id)))?;
            }
            // NULL cells keep the field's default (rows predating an added
            // column read back as NULL).
            (_, SqlValue::Null) => {}
            _ => {
                return Err(OrmError::TypeMismatch {
                    entity: schema.name().to_string(),
                    field: field.name().to_string(),
                })
            }
        }
    }
    Ok(instance.into_shared())
}

/// Records `objects` as materialized for their entity.
fn mark_visited(visited: &mut Visited, schema: &EntitySchema, objects: &[SharedInstance]) {
    let entry = visited.entry(schema.name().to_string()).or_default();
    for object in objects {
        if let Some(id) = borrow(object).id() {
            entry.insert(id);
        }
    }
}

/// Splits `wanted` into the ids not yet materialized in this chain.
fn unvisited_ids(visited: &mut Visited, entity: &str, wanted: &[i64]) -> Vec<i64> {
    let seen = visited.entry(entity.to_string()).or_default();
    wanted.iter().copied().filter(|id| !seen.contains(id)).collect()
}

/// Reads the referenced id of a foreign-key field without holding the
/// owner's lock while the target is inspected.
fn reference_id(object: &SharedInstance, field: &FieldDef) -> Result<Option<i64>> {
    let value = borrow(object).get(field.name())?;
    Ok(match value {
        FieldValue::Reference(reference) => reference.id(),
        _ => None,
    })
}

/// Resolves every foreign-key and list field of `objects`, recursively.
fn resolve_relations<'a>(
    repo: &'a mut Repository,
    schema: Arc<EntitySchema>,
    objects: Vec<SharedInstance>,
    visited: &'a mut Visited,
) -> BoxFuture<'a, Result<()>> {
    async move {
        for field in schema.foreign_keys() {
            let Some(target) = field.kind().target() else {
                continue;
            };
            let target_schema = repo.registry().get(target)?;

            // Referenced ids across all parents, deduplicated, order kept.
            let mut wanted: Vec<i64> = Vec::new();
            for object in &objects {
                if let Some(id) = reference_id(object, field)? {
                    if !wanted.contains(&id) {
                        wanted.push(id);
                    }
                }
            }
            if wanted.is_empty() {
                continue;
            }

            let pending = unvisited_ids(visited, target_schema.name(), &wanted);
            if !pending.is_empty() {
                let key = target_schema.column_ref(target_schema.primary_key().name())?;
                let related =
                    collect_objects(repo, &target_schema, Some(Expr::is_in(key, pending)), None)
                        .await?;
                mark_visited(visited, &target_schema, &related);
                resolve_relations(&mut *repo, target_schema.clone(), related, &mut *visited)
                    .await?;
            }

            // Attach by id; previously materialized targets come from cache.
            let resolved = index_by_id(repo.get_objects(target_schema.name(), &wanted));
            for object in &objects {
                if let Some(id) = reference_id(object, field)? {
                    if let Some(related) = resolved.get(&id) {
                        borrow(object).set(field.name(), FieldValue::reference(related))?;
                    }
                }
            }
        }

        for field in schema.list_fields() {
            let Some(target) = field.kind().target() else {
                continue;
            };
            let target_schema = repo.registry().get(target)?;

            for object in &objects {
                let ids = repo.listed_object_ids(object, field).await?;

                let pending = unvisited_ids(visited, target_schema.name(), &ids);
                if !pending.is_empty() {
                    let key = target_schema.column_ref(target_schema.primary_key().name())?;
                    let related = collect_objects(
                        repo,
                        &target_schema,
                        Some(Expr::is_in(key, pending)),
                        None,
                    )
                    .await?;
                    mark_visited(visited, &target_schema, &related);
                    resolve_relations(&mut *repo, target_schema.clone(), related, &mut *visited)
                        .await?;
                }

                let mut resolved = index_by_id(repo.get_objects(target_schema.name(), &ids));
                let items: Vec<SharedInstance> =
                    ids.iter().filter_map(|id| resolved.remove(id)).collect();
                borrow(object).set(field.name(), FieldValue::List(items))?;
            }
        }

        Ok(())
    }
    .boxed()
}

/// Indexes instances by primary key.
fn index_by_id(objects: Vec<SharedInstance>) -> HashMap<i64, SharedInstance> {
    let mut indexed = HashMap::with_capacity(objects.len());
    for object in objects {
        if let Some(id) = borrow(&object).id() {
            indexed.insert(id, object);
        }
    }
    indexed
}

/// Extracts the first column of each row as an integer.
fn integer_column(rows: Vec<Vec<SqlValue>>) -> Vec<i64> {
    rows.into_iter()
        .filter_map(|row| match row.into_iter().next() {
            Some(SqlValue::Integer(id)) => Some(id),
            _ => None,
        })
        .collect()
}
