//! Entity schema descriptors.
//!
//! An entity type is declared as an [`EntityDef`] and turned into a resolved
//! [`EntitySchema`] when it is registered. The resolved form carries the full
//! field list (inherited fields first), the mapped table name, and the
//! primary-key position, so nothing downstream needs to walk a type
//! hierarchy at runtime.

use serde::{Deserialize, Serialize};

use loam_sql::ColumnRef;

use crate::error::{OrmError, Result};
use crate::registry::ModelRegistry;

/// The kind of one declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Auto-incrementing integer identity. Exactly one per entity.
    PrimaryKey,
    /// Integer scalar.
    Integer,
    /// Floating-point scalar.
    Real,
    /// Text scalar.
    Text,
    /// Single reference to another entity, stored as an integer column with
    /// a referential constraint.
    ForeignKey {
        /// Name of the referenced entity, resolved through the registry.
        target: String,
    },
    /// Reference to zero or more instances of another entity, stored in a
    /// junction table and never as a column on the owning table.
    List {
        /// Name of the contained entity, resolved through the registry.
        target: String,
    },
}

impl FieldKind {
    /// Returns whether this is the primary-key kind.
    pub const fn is_primary_key(&self) -> bool {
        matches!(self, Self::PrimaryKey)
    }

    /// Returns whether this is a list kind.
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    /// Returns the referenced entity name for relational kinds.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { target } | Self::List { target } => Some(target),
            _ => None,
        }
    }

    /// Returns a human-readable description of this kind.
    pub fn describe(&self) -> String {
        match self {
            Self::PrimaryKey => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            Self::Integer => "INTEGER".to_string(),
            Self::Real => "REAL".to_string(),
            Self::Text => "TEXT".to_string(),
            Self::ForeignKey { target } => format!("REFERENCES {target}"),
            Self::List { target } => format!("LIST OF {target}"),
        }
    }
}

/// One named, typed member of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
}

impl FieldDef {
    /// Creates a field descriptor.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field kind.
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Returns the SQL column type for this field, or `None` for list
    /// fields, which have no column on the owning table.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] if a foreign-key target is
    /// not registered.
    pub fn column_type(&self, registry: &ModelRegistry) -> Result<Option<String>> {
        match &self.kind {
            FieldKind::PrimaryKey => Ok(Some("INTEGER PRIMARY KEY AUTOINCREMENT".to_string())),
            FieldKind::Integer => Ok(Some("INTEGER".to_string())),
            FieldKind::Real => Ok(Some("REAL".to_string())),
            FieldKind::Text => Ok(Some("TEXT".to_string())),
            FieldKind::ForeignKey { target } => {
                let target = registry.get(target)?;
                Ok(Some(format!(
                    "INTEGER REFERENCES {}({})",
                    target.table_name(),
                    target.primary_key().name()
                )))
            }
            FieldKind::List { .. } => Ok(None),
        }
    }
}

/// Whether an entity stands alone or extends another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A standalone entity with its own table.
    Root,
    /// An entity extending a root entity; its fields are appended to the
    /// parent's table. A single level of inheritance is supported.
    Extends(String),
}

/// An entity declaration under construction.
///
/// # Example
///
/// ```
/// use loam_orm::EntityDef;
///
/// let person = EntityDef::new("Person")
///     .primary_key("id")
///     .text("name")
///     .integer("age")
///     .foreign_key("employer", "Company")
///     .list("friends", "Person");
///
/// let student = EntityDef::extending("Student", "Person").text("school");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    name: String,
    kind: EntityKind,
    fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Starts declaring a root entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Root,
            fields: Vec::new(),
        }
    }

    /// Starts declaring an entity that extends `parent`.
    pub fn extending(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Extends(parent.into()),
            fields: Vec::new(),
        }
    }

    /// Declares the auto-incrementing primary key.
    #[must_use]
    pub fn primary_key(self, name: &str) -> Self {
        self.field(name, FieldKind::PrimaryKey)
    }

    /// Declares an integer field.
    #[must_use]
    pub fn integer(self, name: &str) -> Self {
        self.field(name, FieldKind::Integer)
    }

    /// Declares a floating-point field.
    #[must_use]
    pub fn real(self, name: &str) -> Self {
        self.field(name, FieldKind::Real)
    }

    /// Declares a text field.
    #[must_use]
    pub fn text(self, name: &str) -> Self {
        self.field(name, FieldKind::Text)
    }

    /// Declares a foreign-key field referencing `target`.
    #[must_use]
    pub fn foreign_key(self, name: &str, target: &str) -> Self {
        self.field(
            name,
            FieldKind::ForeignKey {
                target: target.to_string(),
            },
        )
    }

    /// Declares a list field containing `target` instances.
    #[must_use]
    pub fn list(self, name: &str, target: &str) -> Self {
        self.field(
            name,
            FieldKind::List {
                target: target.to_string(),
            },
        )
    }

    /// Declares a field with an explicit kind.
    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Returns the entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entity kind.
    pub const fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Returns the declared fields.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
}

/// A registered, resolved entity schema.
///
/// Derived entities carry their parent's fields first, followed by their own,
/// and map to the parent's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    name: String,
    table: String,
    parent: Option<String>,
    inherited: usize,
    primary_key: usize,
    fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Resolves a declaration against its (already resolved) parent.
    pub(crate) fn resolve(def: EntityDef, parent: Option<&EntitySchema>) -> Result<Self> {
        let EntityDef { name, kind, fields } = def;

        let (table, parent_name, mut all_fields) = match (&kind, parent) {
            (EntityKind::Root, _) => (name.clone(), None, Vec::new()),
            (EntityKind::Extends(parent_name), Some(parent)) => (
                parent.table_name().to_string(),
                Some(parent_name.clone()),
                parent.fields().to_vec(),
            ),
            (EntityKind::Extends(parent_name), None) => {
                return Err(OrmError::UnresolvedEntityReference(parent_name.clone()))
            }
        };

        let inherited = all_fields.len();
        all_fields.extend(fields);

        let mut names = std::collections::HashSet::new();
        for field in &all_fields {
            if !names.insert(field.name()) {
                return Err(OrmError::Schema(format!(
                    "entity '{name}' declares field '{}' more than once",
                    field.name()
                )));
            }
        }

        let mut key_positions = all_fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.kind().is_primary_key())
            .map(|(position, _)| position);
        let primary_key = match (key_positions.next(), key_positions.next()) {
            (Some(position), None) => position,
            _ => {
                return Err(OrmError::Schema(format!(
                    "entity '{name}' must declare exactly one primary key"
                )))
            }
        };

        Ok(Self {
            name,
            table,
            parent: parent_name,
            inherited,
            primary_key,
            fields: all_fields,
        })
    }

    /// Returns the entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mapped table name: the entity's own name for root
    /// entities, the root ancestor's name for derived ones.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the parent entity name, if this entity is derived.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns all fields, inherited ones first.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the fields declared by this entity itself.
    pub fn own_fields(&self) -> &[FieldDef] {
        &self.fields[self.inherited..]
    }

    /// Returns the primary-key field.
    pub fn primary_key(&self) -> &FieldDef {
        &self.fields[self.primary_key]
    }

    /// Returns the foreign-key fields.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|field| matches!(field.kind(), FieldKind::ForeignKey { .. }))
    }

    /// Returns the list fields.
    pub fn list_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| field.kind().is_list())
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name() == name)
    }

    /// Returns a qualified column reference for a field.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnknownField`] if the entity has no such field.
    pub fn column_ref(&self, field: &str) -> Result<ColumnRef> {
        self.field(field)
            .map(|field| self.column(field))
            .ok_or_else(|| OrmError::UnknownField {
                entity: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Returns a qualified column reference for a known field descriptor.
    pub(crate) fn column(&self, field: &FieldDef) -> ColumnRef {
        ColumnRef::new(self.table.clone(), field.name())
    }

    /// Renders the schema as a readable field listing.
    pub fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("  {} {}", field.name(), field.kind().describe()))
            .collect();
        format!("{}\n(\n{}\n)", self.name, fields.join(",\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDef {
        EntityDef::new("Person")
            .primary_key("id")
            .text("name")
            .integer("age")
    }

    #[test]
    fn test_root_resolution() {
        let schema = EntitySchema::resolve(person(), None).unwrap();
        assert_eq!(schema.name(), "Person");
        assert_eq!(schema.table_name(), "Person");
        assert_eq!(schema.parent(), None);
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.own_fields().len(), 3);
        assert_eq!(schema.primary_key().name(), "id");
    }

    #[test]
    fn test_derived_resolution_extends_parent_table() {
        let parent = EntitySchema::resolve(person(), None).unwrap();
        let def = EntityDef::extending("Student", "Person").text("school");
        let schema = EntitySchema::resolve(def, Some(&parent)).unwrap();

        assert_eq!(schema.table_name(), "Person");
        assert_eq!(schema.parent(), Some("Person"));
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(schema.own_fields().len(), 1);
        assert_eq!(schema.own_fields()[0].name(), "school");
        assert_eq!(schema.primary_key().name(), "id");
    }

    #[test]
    fn test_missing_primary_key_is_rejected() {
        let def = EntityDef::new("Tag").text("label");
        let err = EntitySchema::resolve(def, None).unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }

    #[test]
    fn test_double_primary_key_is_rejected() {
        let def = EntityDef::new("Tag").primary_key("id").primary_key("other");
        let err = EntitySchema::resolve(def, None).unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let def = EntityDef::new("Tag").primary_key("id").text("id");
        let err = EntitySchema::resolve(def, None).unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }

    #[test]
    fn test_column_ref() {
        let parent = EntitySchema::resolve(person(), None).unwrap();
        let def = EntityDef::extending("Student", "Person").text("school");
        let schema = EntitySchema::resolve(def, Some(&parent)).unwrap();

        let column = schema.column_ref("school").unwrap();
        assert_eq!(column.to_string(), "Person.school");

        let err = schema.column_ref("missing").unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
    }

    #[test]
    fn test_describe() {
        let schema = EntitySchema::resolve(person(), None).unwrap();
        let rendered = schema.describe();
        assert!(rendered.starts_with("Person\n(\n"));
        assert!(rendered.contains("  id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(rendered.contains("  age INTEGER"));
    }
}
