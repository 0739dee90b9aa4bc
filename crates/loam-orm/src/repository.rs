//! The repository: migrations, CRUD, and the per-entity object cache.
//!
//! The repository owns the store, the model registry, and the cache, and is
//! passed explicitly to the query builder. The cache is the single source of
//! truth for which rows already have a live object: it is consulted before
//! any hydration, and every insert/update/delete keeps it in step.
//!
//! Mutating operations issue independent statements; there is no transaction
//! wrapping, so a failure partway through a multi-step operation (an object
//! row and its junction rows, say) leaves the store partially updated.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::builder::QueryBuilder;
use crate::error::{OrmError, Result};
use crate::instance::{borrow, FieldValue, Instance, SharedInstance};
use crate::registry::ModelRegistry;
use crate::schema::{EntityDef, EntitySchema, FieldDef, FieldKind};
use crate::store::{SqlValue, Store};

/// Coordinates the store, the model registry, and the object cache.
#[derive(Debug)]
pub struct Repository {
    store: Store,
    registry: ModelRegistry,
    cache: HashMap<String, Vec<SharedInstance>>,
}

impl Repository {
    /// Opens a repository over the SQLite database at `path`, creating the
    /// file on first use.
    pub fn open(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            store: Store::new(path),
            registry: ModelRegistry::new(),
            cache: HashMap::new(),
        }
    }

    /// Returns the model registry.
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Registers an entity declaration.
    ///
    /// # Errors
    ///
    /// See [`ModelRegistry::register`].
    pub fn register(&mut self, def: EntityDef) -> Result<Arc<EntitySchema>> {
        self.registry.register(def)
    }

    /// Creates a fresh, unpersisted instance of a registered entity.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] for unknown entity names.
    pub fn new_object(&self, entity: &str) -> Result<SharedInstance> {
        Ok(Instance::shared(self.registry.get(entity)?))
    }

    /// Starts a selection over a registered entity.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] for unknown entity names.
    pub fn select(&mut self, entity: &str) -> Result<QueryBuilder<'_>> {
        let schema = self.registry.get(entity)?;
        Ok(QueryBuilder::new(self, schema))
    }

    /// Creates or extends the table for a registered entity.
    ///
    /// Root entities get a fresh table: any existing one is dropped first,
    /// so migrating a root entity wipes its rows. Derived entities only add
    /// their own fields to the parent's table. The entity's cache list is
    /// reset either way.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] if the entity or a
    /// foreign-key target is unknown; store errors propagate unchanged.
    pub async fn migrate(&mut self, entity: &str) -> Result<()> {
        let schema = self.registry.get(entity)?;
        info!(entity = %schema.name(), table = %schema.table_name(), "Migrating entity");
        self.cache.insert(schema.name().to_string(), Vec::new());

        if schema.parent().is_some() {
            for field in schema.own_fields() {
                self.add_field(&schema, field).await?;
            }
            return Ok(());
        }

        let table = schema.table_name();
        self.execute_ddl(&format!("DROP TABLE IF EXISTS {table}"))
            .await?;

        let key = schema.primary_key();
        if let Some(column_type) = key.column_type(&self.registry)? {
            self.execute_ddl(&format!(
                "CREATE TABLE IF NOT EXISTS {table} ({} {column_type})",
                key.name()
            ))
            .await?;
        }

        for field in schema.fields() {
            if !field.kind().is_primary_key() {
                self.add_field(&schema, field).await?;
            }
        }
        Ok(())
    }

    /// Persists an instance.
    ///
    /// An instance whose primary key is set and whose row exists is updated
    /// in place, replacing the matching cache entry. Anything else is
    /// inserted, has the assigned id written back, and is added to the
    /// cache. Junction rows for every list field are then rewritten: all
    /// rows for the owner are deleted and one row per related instance is
    /// inserted.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnsavedReference`] if a list field holds an instance
    /// that has never been saved; store errors propagate unchanged.
    pub async fn insert_object(&mut self, object: &SharedInstance) -> Result<()> {
        let (schema, id, columns) = {
            let guard = borrow(object);
            let schema = guard.schema().clone();
            let mut raw = Vec::new();
            for field in schema.fields() {
                match field.kind() {
                    FieldKind::PrimaryKey | FieldKind::List { .. } => {}
                    _ => raw.push((field.name().to_string(), guard.get(field.name())?)),
                }
            }
            (schema, guard.id(), raw)
        };
        let columns: Vec<(String, String)> = columns
            .into_iter()
            .map(|(name, value)| (name, sql_literal(&value)))
            .collect();

        match id {
            Some(id) if self.row_exists(schema.name(), id).await? => {
                self.update_row(&schema, id, &columns).await?;
                self.replace_cached(&schema, id, object);
            }
            _ => {
                let sql = if columns.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", schema.table_name())
                } else {
                    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
                    let values: Vec<&str> =
                        columns.iter().map(|(_, value)| value.as_str()).collect();
                    format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                        schema.table_name(),
                        names.join(", "),
                        values.join(", ")
                    )
                };
                let output = self.store.execute(&sql).await?;
                borrow(object).set_id(output.last_insert_id);
                self.update_cache(std::slice::from_ref(object));
            }
        }

        self.rewrite_junctions(object, &schema).await
    }

    /// Deletes an instance's junction rows and table row.
    ///
    /// Deletion is keyed on cache membership: an object the cache does not
    /// know is left alone, even if a row with its id exists.
    ///
    /// # Errors
    ///
    /// Store errors propagate unchanged.
    pub async fn delete_object(&mut self, object: &SharedInstance) -> Result<()> {
        let schema = borrow(object).schema().clone();
        let cached = self
            .cache
            .get(schema.name())
            .and_then(|entries| entries.iter().position(|entry| Arc::ptr_eq(entry, object)));
        let Some(index) = cached else {
            return Ok(());
        };

        if let Some(id) = borrow(object).id() {
            let table = schema.table_name();
            for field in schema.list_fields() {
                let junction = junction_table(table, field);
                self.store
                    .execute(&format!("DELETE FROM {junction} WHERE {table}_id = {id}"))
                    .await?;
            }
            self.store
                .execute(&format!(
                    "DELETE FROM {table} WHERE {} = {id}",
                    schema.primary_key().name()
                ))
                .await?;
        }

        if let Some(entries) = self.cache.get_mut(schema.name()) {
            entries.remove(index);
        }
        Ok(())
    }

    /// Drops an entity's junction tables and its own table, and purges its
    /// cache entry.
    ///
    /// Foreign keys held by other entities are not cascaded; rows that
    /// referenced the dropped table keep their dangling ids.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] for unknown entity names;
    /// store errors propagate unchanged.
    pub async fn delete_model(&mut self, entity: &str) -> Result<()> {
        let schema = self.registry.get(entity)?;
        info!(entity = %schema.name(), "Dropping entity tables");

        let table = schema.table_name();
        for field in schema.list_fields() {
            self.execute_ddl(&format!(
                "DROP TABLE IF EXISTS {}",
                junction_table(table, field)
            ))
            .await?;
        }
        self.execute_ddl(&format!("DROP TABLE IF EXISTS {table}"))
            .await?;
        self.cache.remove(schema.name());
        Ok(())
    }

    /// Executes a raw SELECT and returns the decoded row tuples.
    ///
    /// # Errors
    ///
    /// Store errors propagate unchanged.
    pub async fn get_rows(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        Ok(self.store.execute(sql).await?.rows)
    }

    /// Returns the cached instances of `entity` whose primary key is in
    /// `ids`.
    pub fn get_objects(&self, entity: &str, ids: &[i64]) -> Vec<SharedInstance> {
        self.cache.get(entity).map_or_else(Vec::new, |entries| {
            entries
                .iter()
                .filter(|entry| borrow(entry).id().is_some_and(|id| ids.contains(&id)))
                .cloned()
                .collect()
        })
    }

    /// Appends instances to their entity's cache list.
    ///
    /// No deduplication happens here; callers decide which instances are
    /// genuinely new.
    pub fn update_cache(&mut self, objects: &[SharedInstance]) {
        for object in objects {
            let entity = borrow(object).schema().name().to_string();
            self.cache.entry(entity).or_default().push(object.clone());
        }
    }

    /// Checks whether a row with `id` exists for `entity`.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] for unknown entity names;
    /// store errors propagate unchanged.
    pub async fn row_exists(&self, entity: &str, id: i64) -> Result<bool> {
        let schema = self.registry.get(entity)?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = {id} LIMIT 1",
            schema.table_name(),
            schema.primary_key().name()
        );
        Ok(!self.store.execute(&sql).await?.rows.is_empty())
    }

    /// Reads the junction table of `field` and returns the related ids for
    /// one owner instance. An owner that has never been saved has no
    /// junction rows and yields an empty list.
    ///
    /// # Errors
    ///
    /// Store errors propagate unchanged.
    pub async fn listed_object_ids(
        &self,
        owner: &SharedInstance,
        field: &FieldDef,
    ) -> Result<Vec<i64>> {
        let (table, owner_id) = {
            let guard = borrow(owner);
            (guard.schema().table_name().to_string(), guard.id())
        };
        let Some(owner_id) = owner_id else {
            return Ok(Vec::new());
        };

        let junction = junction_table(&table, field);
        let sql = format!(
            "SELECT {}_id FROM {junction} WHERE {table}_id = {owner_id}",
            field.name()
        );
        let rows = self.store.execute(&sql).await?.rows;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some(SqlValue::Integer(id)) => Some(id),
                _ => None,
            })
            .collect())
    }

    async fn add_field(&self, schema: &EntitySchema, field: &FieldDef) -> Result<()> {
        let table = schema.table_name();
        if let FieldKind::List { target } = field.kind() {
            let contained = self.registry.get(target)?;
            let junction = junction_table(table, field);
            self.execute_ddl(&format!("DROP TABLE IF EXISTS {junction}"))
                .await?;
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {junction} ({table}_id INTEGER, {field}_id INTEGER, \
                 FOREIGN KEY({table}_id) REFERENCES {table}({key}), \
                 FOREIGN KEY({field}_id) REFERENCES {contained}({contained_key}))",
                field = field.name(),
                key = schema.primary_key().name(),
                contained = contained.table_name(),
                contained_key = contained.primary_key().name(),
            );
            self.execute_ddl(&ddl).await
        } else if let Some(column_type) = field.column_type(&self.registry)? {
            self.execute_ddl(&format!(
                "ALTER TABLE {table} ADD {} {column_type}",
                field.name()
            ))
            .await
        } else {
            Ok(())
        }
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing DDL");
        self.store.execute(sql).await.map(|_| ())
    }

    async fn update_row(
        &self,
        schema: &EntitySchema,
        id: i64,
        columns: &[(String, String)],
    ) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .map(|(name, literal)| format!("{name} = {literal}"))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {id}",
            schema.table_name(),
            assignments.join(", "),
            schema.primary_key().name()
        );
        self.store.execute(&sql).await.map(|_| ())
    }

    fn replace_cached(&mut self, schema: &EntitySchema, id: i64, object: &SharedInstance) {
        if let Some(entries) = self.cache.get_mut(schema.name()) {
            for entry in entries.iter_mut() {
                if borrow(entry).id() == Some(id) {
                    *entry = object.clone();
                    break;
                }
            }
        }
    }

    async fn rewrite_junctions(
        &mut self,
        object: &SharedInstance,
        schema: &EntitySchema,
    ) -> Result<()> {
        let Some(owner_id) = borrow(object).id() else {
            return Ok(());
        };
        let table = schema.table_name();

        for field in schema.list_fields() {
            let junction = junction_table(table, field);
            self.store
                .execute(&format!(
                    "DELETE FROM {junction} WHERE {table}_id = {owner_id}"
                ))
                .await?;

            let items = match borrow(object).get(field.name())? {
                FieldValue::List(items) => items,
                _ => Vec::new(),
            };
            for item in items {
                let (item_id, item_entity) = {
                    let guard = borrow(&item);
                    (guard.id(), guard.schema().name().to_string())
                };
                let Some(item_id) = item_id else {
                    return Err(OrmError::UnsavedReference(item_entity));
                };
                self.store
                    .execute(&format!(
                        "INSERT INTO {junction} ({table}_id, {field}_id) VALUES ({owner_id}, {item_id})",
                        field = field.name()
                    ))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Returns the junction table name for a list field.
fn junction_table(table: &str, field: &FieldDef) -> String {
    format!("{table}_{}", field.name())
}

/// Renders a field value as a SQL literal for INSERT/UPDATE statements.
///
/// Text is embedded single-quoted without escaping. References render as the
/// referenced primary key, or NULL while the related instance is unsaved.
/// List values never reach column rendering.
fn sql_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Null | FieldValue::List(_) => "NULL".to_string(),
        FieldValue::Integer(value) => value.to_string(),
        FieldValue::Real(value) => value.to_string(),
        FieldValue::Text(value) => format!("'{value}'"),
        FieldValue::Reference(reference) => {
            reference.id().map_or("NULL".to_string(), |id| id.to_string())
        }
    }
}
