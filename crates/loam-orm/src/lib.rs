//! # loam-orm
//!
//! An object-relational mapper over SQLite with declarative entity schemas,
//! a per-entity object cache, and recursive relationship resolution.
//!
//! This crate provides:
//! - [`EntityDef`] / [`EntitySchema`] — runtime entity declarations with
//!   scalar, foreign-key, and many-to-many list fields, plus single-level
//!   inheritance
//! - [`Repository`] — schema migration, insert/update/delete with a
//!   synchronized object cache, and raw row access
//! - [`QueryBuilder`] — filtered, limited selections that materialize
//!   related objects recursively
//! - [`Instance`] — dynamically typed records shared between the cache and
//!   query results
//!
//! ## Quick Start
//!
//! ```ignore
//! use loam_orm::{EntityDef, Expr, FieldValue, Repository};
//!
//! let mut repo = Repository::open("app.db");
//!
//! let person = repo.register(
//!     EntityDef::new("Person")
//!         .primary_key("id")
//!         .text("name")
//!         .integer("age"),
//! )?;
//! repo.migrate("Person").await?;
//!
//! let alice = repo.new_object("Person")?;
//! {
//!     let mut guard = alice.lock().unwrap();
//!     guard.set("name", "Alice")?;
//!     guard.set("age", 31)?;
//! }
//! repo.insert_object(&alice).await?;
//!
//! let adults = repo
//!     .select("Person")?
//!     .filter(Expr::gt(person.column_ref("age")?, 17))?
//!     .evaluate()
//!     .await?;
//! ```
//!
//! ## Execution model
//!
//! Every store operation opens a connection, executes one statement, and
//! closes the connection; multi-step mutations are not atomic. The cache is
//! plain shared state intended for one writer at a time. Both are documented
//! constraints of the design, not accidents.

mod builder;
mod error;
mod instance;
mod registry;
mod repository;
mod schema;
mod store;

pub use builder::QueryBuilder;
pub use error::{OrmError, Result};
pub use instance::{FieldValue, Instance, Reference, SharedInstance};
pub use registry::ModelRegistry;
pub use repository::Repository;
pub use schema::{EntityDef, EntityKind, EntitySchema, FieldDef, FieldKind};
pub use store::{SqlValue, StatementOutput, Store};

// Re-export the expression surface so callers need only one crate.
pub use loam_sql::{ColumnRef, Expr, Limit, QueryError, Scalar, SelectQuery};
