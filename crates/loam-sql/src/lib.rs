//! # loam-sql
//!
//! Composable SQL building blocks for the loam ORM.
//!
//! This crate provides:
//! - [`Expr`] — an immutable condition-expression tree (scalars, comparisons,
//!   logical and arithmetic combinators)
//! - [`SelectQuery`] — a validated SELECT descriptor binding a projection,
//!   an optional condition, and an optional limit to one table
//! - [`ColumnRef`] / [`Scalar`] — the operand types expressions are built from
//!
//! Everything here renders to plain SQL text and knows nothing about entity
//! schemas or the database; the ORM layer owns those concerns.
//!
//! ## Quick Start
//!
//! ```
//! use loam_sql::{ColumnRef, Expr, Limit, SelectQuery};
//!
//! let age = ColumnRef::new("Person", "age");
//! let condition = Expr::or(Expr::eq(age.clone(), 20), Expr::eq(age.clone(), 21));
//!
//! let query = SelectQuery::new(
//!     vec![ColumnRef::new("Person", "id"), age],
//!     Some(condition),
//!     Some(Limit::new(10)),
//!     None,
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     query.to_sql(),
//!     "SELECT Person.id, Person.age FROM Person \
//!      WHERE (Person.age = 20) OR (Person.age = 21) LIMIT 10"
//! );
//! ```
//!
//! Known limitation: text scalars are embedded single-quoted without
//! escaping. Do not feed untrusted input into expression literals.

mod error;
mod expr;
mod select;

pub use error::{QueryError, Result};
pub use expr::{ArithmeticOp, ColumnRef, CompareOp, Expr, LogicalOp, Scalar};
pub use select::{Limit, SelectQuery};
