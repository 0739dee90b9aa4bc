//! Entity instances and typed field values.
//!
//! An [`Instance`] is a runtime record conforming to an [`EntitySchema`].
//! Instances are shared: the repository cache, query results, and relation
//! targets all alias the same object through a [`SharedInstance`] handle, so
//! a mutation made anywhere is visible everywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value as JsonValue};

use crate::error::{OrmError, Result};
use crate::schema::{EntitySchema, FieldKind};

/// A shared handle to a live instance.
pub type SharedInstance = Arc<Mutex<Instance>>;

/// Locks a shared instance, recovering from poisoning.
///
/// Access is sequential by design; a poisoned lock can only come from a
/// panicked caller, whose partial state is still the best available.
pub(crate) fn borrow(instance: &SharedInstance) -> MutexGuard<'_, Instance> {
    instance.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A reference to a related instance.
#[derive(Debug, Clone)]
pub enum Reference {
    /// The raw foreign-key id, before the related object is materialized.
    Pending(i64),
    /// The materialized related instance.
    Loaded(SharedInstance),
}

impl Reference {
    /// Returns the referenced primary key, if known.
    ///
    /// Locks the target of a `Loaded` reference; do not call while holding
    /// a guard that may alias it.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Pending(id) => Some(*id),
            Self::Loaded(instance) => borrow(instance).id(),
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Absent value (a null column or an unassigned reference).
    Null,
    /// Integer scalar.
    Integer(i64),
    /// Floating-point scalar.
    Real(f64),
    /// Text scalar.
    Text(String),
    /// Foreign-key value.
    Reference(Reference),
    /// List-field value.
    List(Vec<SharedInstance>),
}

impl FieldValue {
    /// Creates a loaded reference to `instance`.
    pub fn reference(instance: &SharedInstance) -> Self {
        Self::Reference(Reference::Loaded(instance.clone()))
    }

    /// Creates a list value over `instances`.
    pub fn list(instances: Vec<SharedInstance>) -> Self {
        Self::List(instances)
    }

    /// Returns the construction-time default for a field kind.
    pub(crate) fn default_for(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Integer => Self::Integer(0),
            FieldKind::Real => Self::Real(0.0),
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::List { .. } => Self::List(Vec::new()),
            FieldKind::PrimaryKey | FieldKind::ForeignKey { .. } => Self::Null,
        }
    }

    /// Returns whether this value is assignable to a field of `kind`.
    fn matches(&self, kind: &FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Integer(_), FieldKind::Integer)
                | (Self::Real(_), FieldKind::Real)
                | (Self::Text(_), FieldKind::Text)
                | (
                    Self::Reference(_) | Self::Null,
                    FieldKind::ForeignKey { .. }
                )
                | (Self::List(_), FieldKind::List { .. })
        )
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A runtime record conforming to an entity schema.
///
/// The primary key starts unset and is assigned by the store on first
/// persist; every other field starts at its kind's default.
#[derive(Debug)]
pub struct Instance {
    schema: Arc<EntitySchema>,
    id: Option<i64>,
    values: HashMap<String, FieldValue>,
}

impl Instance {
    /// Creates an instance with default field values and an unset primary
    /// key.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .filter(|field| !field.kind().is_primary_key())
            .map(|field| {
                (
                    field.name().to_string(),
                    FieldValue::default_for(field.kind()),
                )
            })
            .collect();
        Self {
            schema,
            id: None,
            values,
        }
    }

    /// Creates a fresh instance behind a shared handle.
    pub fn shared(schema: Arc<EntitySchema>) -> SharedInstance {
        Self::new(schema).into_shared()
    }

    /// Wraps this instance in a shared handle.
    pub fn into_shared(self) -> SharedInstance {
        Arc::new(Mutex::new(self))
    }

    /// Returns the entity schema.
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Returns the primary key, or `None` if the instance has never been
    /// persisted.
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Returns a field's current value.
    ///
    /// The primary-key field reads as its assigned integer, or
    /// [`FieldValue::Null`] while unset.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnknownField`] if the entity has no such field.
    pub fn get(&self, field: &str) -> Result<FieldValue> {
        let def = self
            .schema
            .field(field)
            .ok_or_else(|| self.unknown_field(field))?;
        if def.kind().is_primary_key() {
            return Ok(self.id.map_or(FieldValue::Null, FieldValue::Integer));
        }
        Ok(self.values[def.name()].clone())
    }

    /// Assigns a field's value after checking it against the declared kind.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnknownField`] if the entity has no such field;
    /// [`OrmError::TypeMismatch`] if the value does not fit the field kind.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let def = self
            .schema
            .field(field)
            .ok_or_else(|| self.unknown_field(field))?;

        if def.kind().is_primary_key() {
            return match value {
                FieldValue::Integer(id) => {
                    self.id = Some(id);
                    Ok(())
                }
                _ => Err(self.type_mismatch(field)),
            };
        }

        if !value.matches(def.kind()) {
            return Err(self.type_mismatch(field));
        }
        self.values.insert(def.name().to_string(), value);
        Ok(())
    }

    /// Renders a shared instance as JSON: scalar fields verbatim, references
    /// and lists as the related primary keys.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible to match the other accessors.
    pub fn to_json(object: &SharedInstance) -> Result<JsonValue> {
        let (name, id, fields) = {
            let guard = borrow(object);
            let fields: Vec<(String, FieldValue)> = guard
                .schema
                .fields()
                .iter()
                .filter(|field| !field.kind().is_primary_key())
                .map(|field| (field.name().to_string(), guard.values[field.name()].clone()))
                .collect();
            (guard.schema.name().to_string(), guard.id, fields)
        };

        let mut rendered = Map::new();
        rendered.insert("entity".to_string(), JsonValue::from(name));
        rendered.insert("id".to_string(), id.map_or(JsonValue::Null, JsonValue::from));
        for (field, value) in fields {
            let json = match value {
                FieldValue::Null => JsonValue::Null,
                FieldValue::Integer(value) => JsonValue::from(value),
                FieldValue::Real(value) => JsonValue::from(value),
                FieldValue::Text(value) => JsonValue::from(value),
                FieldValue::Reference(reference) => {
                    reference.id().map_or(JsonValue::Null, JsonValue::from)
                }
                FieldValue::List(items) => JsonValue::from(
                    items
                        .iter()
                        .filter_map(|item| borrow(item).id())
                        .collect::<Vec<i64>>(),
                ),
            };
            rendered.insert(field, json);
        }
        Ok(JsonValue::Object(rendered))
    }

    fn unknown_field(&self, field: &str) -> OrmError {
        OrmError::UnknownField {
            entity: self.schema.name().to_string(),
            field: field.to_string(),
        }
    }

    fn type_mismatch(&self, field: &str) -> OrmError {
        OrmError::TypeMismatch {
            entity: self.schema.name().to_string(),
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityDef;

    fn person_schema() -> Arc<EntitySchema> {
        Arc::new(
            EntitySchema::resolve(
                EntityDef::new("Person")
                    .primary_key("id")
                    .text("name")
                    .integer("age")
                    .real("height")
                    .foreign_key("employer", "Company")
                    .list("friends", "Person"),
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let instance = Instance::new(person_schema());
        assert_eq!(instance.id(), None);
        assert!(matches!(instance.get("age").unwrap(), FieldValue::Integer(0)));
        assert!(matches!(instance.get("name").unwrap(), FieldValue::Text(name) if name.is_empty()));
        assert!(matches!(instance.get("employer").unwrap(), FieldValue::Null));
        assert!(matches!(instance.get("friends").unwrap(), FieldValue::List(items) if items.is_empty()));
        assert!(matches!(instance.get("id").unwrap(), FieldValue::Null));
    }

    #[test]
    fn test_set_and_get() {
        let mut instance = Instance::new(person_schema());
        instance.set("age", 31).unwrap();
        instance.set("name", "Alice").unwrap();
        instance.set("height", 1.68).unwrap();
        assert!(matches!(instance.get("age").unwrap(), FieldValue::Integer(31)));
        assert!(matches!(instance.get("name").unwrap(), FieldValue::Text(name) if name == "Alice"));
    }

    #[test]
    fn test_unknown_field() {
        let instance = Instance::new(person_schema());
        let err = instance.get("nickname").unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let mut instance = Instance::new(person_schema());
        let err = instance.set("age", "thirty").unwrap_err();
        assert!(matches!(err, OrmError::TypeMismatch { .. }));
    }

    #[test]
    fn test_reference_value() {
        let employer = Instance::shared(person_schema());
        borrow(&employer).set_id(7);

        let mut instance = Instance::new(person_schema());
        instance
            .set("employer", FieldValue::reference(&employer))
            .unwrap();
        let FieldValue::Reference(reference) = instance.get("employer").unwrap() else {
            panic!("expected a reference value");
        };
        assert_eq!(reference.id(), Some(7));
    }

    #[test]
    fn test_primary_key_reads_as_integer_once_set() {
        let mut instance = Instance::new(person_schema());
        instance.set("id", 12).unwrap();
        assert_eq!(instance.id(), Some(12));
        assert!(matches!(instance.get("id").unwrap(), FieldValue::Integer(12)));
    }

    #[test]
    fn test_to_json_uses_related_ids() {
        let friend = Instance::shared(person_schema());
        borrow(&friend).set_id(3);

        let object = Instance::shared(person_schema());
        {
            let mut guard = borrow(&object);
            guard.set_id(1);
            guard.set("name", "Alice").unwrap();
            guard.set("friends", FieldValue::list(vec![friend])).unwrap();
        }

        let json = Instance::to_json(&object).unwrap();
        assert_eq!(json["entity"], "Person");
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["friends"], serde_json::json!([3]));
    }
}
