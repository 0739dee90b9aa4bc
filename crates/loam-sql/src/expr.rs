//! Composable condition expressions.
//!
//! Expressions form an immutable tree of scalars, comparisons, logical and
//! arithmetic combinators. Every node renders to a self-contained SQL
//! fragment; composition is purely structural.

use std::fmt;

use crate::error::{QueryError, Result};

/// A column bound to its owning table.
///
/// Renders as `table.column`, the fully qualified form used in projections
/// and conditions alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    table: String,
    column: String,
}

impl ColumnRef {
    /// Creates a reference to `column` on `table`.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns the owning table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the column name.
    pub fn column(&self) -> &str {
        &self.column
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A scalar operand: a literal, a column reference, or a membership list.
///
/// Text scalars render single-quoted and are embedded verbatim, without
/// escaping; quoting of untrusted input is the caller's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Real(f64),
    /// Text literal.
    Text(String),
    /// Bound column reference.
    Column(ColumnRef),
    /// Parenthesized value list, the right-hand side of `IN` / `NOT IN`.
    Tuple(Vec<Scalar>),
}

impl Scalar {
    /// Renders this scalar as a SQL fragment.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => value.to_string(),
            Self::Text(value) => format!("'{value}'"),
            Self::Column(column) => column.to_string(),
            Self::Tuple(values) => {
                let rendered: Vec<String> = values.iter().map(Self::to_sql).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<ColumnRef> for Scalar {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
    /// Membership (IN)
    In,
    /// Negated membership (NOT IN)
    NotIn,
}

impl CompareOp {
    /// Returns the SQL token for this operator.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Logical combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// Conjunction (AND)
    And,
    /// Disjunction (OR)
    Or,
}

impl LogicalOp {
    /// Returns the SQL token for this operator.
    pub const fn token(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
}

impl ArithmeticOp {
    /// Returns the SQL token for this operator.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A condition expression tree.
///
/// Built through the associated constructors, which auto-wrap bare values
/// as [`Scalar`] nodes:
///
/// ```
/// use loam_sql::{ColumnRef, Expr};
///
/// let age = ColumnRef::new("Person", "age");
/// let cond = Expr::or(
///     Expr::eq(age.clone(), 20),
///     Expr::eq(age, 21),
/// );
/// assert_eq!(cond.to_sql(), "(Person.age = 20) OR (Person.age = 21)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A scalar leaf.
    Scalar(Scalar),
    /// A binary comparison.
    Comparison {
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Comparison operator.
        op: CompareOp,
    },
    /// A logical combination of two sub-expressions.
    Logical {
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Logical operator.
        op: LogicalOp,
    },
    /// An arithmetic combination of two operands.
    Arithmetic {
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Arithmetic operator.
        op: ArithmeticOp,
    },
}

impl Expr {
    /// Creates an equality comparison (left = right).
    pub fn eq(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Self::comparison(left, right, CompareOp::Eq)
    }

    /// Creates an inequality comparison (left != right).
    pub fn ne(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Self::comparison(left, right, CompareOp::Ne)
    }

    /// Creates a greater-than comparison (left > right).
    pub fn gt(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Self::comparison(left, right, CompareOp::Gt)
    }

    /// Creates a less-than comparison (left < right).
    pub fn lt(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Self::comparison(left, right, CompareOp::Lt)
    }

    /// Creates a membership test (left IN (values...)).
    pub fn is_in<V>(left: impl Into<Expr>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Scalar>,
    {
        Self::comparison(left, Self::tuple(values), CompareOp::In)
    }

    /// Creates a negated membership test (left NOT IN (values...)).
    pub fn not_in<V>(left: impl Into<Expr>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Scalar>,
    {
        Self::comparison(left, Self::tuple(values), CompareOp::NotIn)
    }

    /// Combines two expressions with AND.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::Logical {
            left: Box::new(left),
            right: Box::new(right),
            op: LogicalOp::And,
        }
    }

    /// Combines two expressions with OR.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Logical {
            left: Box::new(left),
            right: Box::new(right),
            op: LogicalOp::Or,
        }
    }

    /// Creates an addition (left + right).
    ///
    /// Fails with [`QueryError::InvalidOperand`] if an operand is a text or
    /// membership-list scalar.
    pub fn add(left: impl Into<Expr>, right: impl Into<Expr>) -> Result<Self> {
        Self::arithmetic(left, right, ArithmeticOp::Add)
    }

    /// Creates a subtraction (left - right).
    ///
    /// Fails with [`QueryError::InvalidOperand`] if an operand is a text or
    /// membership-list scalar.
    pub fn sub(left: impl Into<Expr>, right: impl Into<Expr>) -> Result<Self> {
        Self::arithmetic(left, right, ArithmeticOp::Sub)
    }

    /// Creates a multiplication (left * right).
    ///
    /// Fails with [`QueryError::InvalidOperand`] if an operand is a text or
    /// membership-list scalar.
    pub fn mul(left: impl Into<Expr>, right: impl Into<Expr>) -> Result<Self> {
        Self::arithmetic(left, right, ArithmeticOp::Mul)
    }

    /// Creates a division (left / right).
    ///
    /// Fails with [`QueryError::InvalidOperand`] if an operand is a text or
    /// membership-list scalar.
    pub fn div(left: impl Into<Expr>, right: impl Into<Expr>) -> Result<Self> {
        Self::arithmetic(left, right, ArithmeticOp::Div)
    }

    /// Renders this expression as a SQL fragment.
    ///
    /// Logical and arithmetic nodes parenthesize both operands. Comparison
    /// operands are rendered bare: the right-hand side of `IN` is already a
    /// parenthesized list, and wrapping it again would turn it into a row
    /// value.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.to_sql(),
            Self::Comparison { left, right, op } => {
                format!("{} {op} {}", left.to_sql(), right.to_sql())
            }
            Self::Logical { left, right, op } => {
                format!("({}) {op} ({})", left.to_sql(), right.to_sql())
            }
            Self::Arithmetic { left, right, op } => {
                format!("({}) {op} ({})", left.to_sql(), right.to_sql())
            }
        }
    }

    fn comparison(left: impl Into<Expr>, right: impl Into<Expr>, op: CompareOp) -> Self {
        Self::Comparison {
            left: Box::new(left.into()),
            right: Box::new(right.into()),
            op,
        }
    }

    fn arithmetic(
        left: impl Into<Expr>,
        right: impl Into<Expr>,
        op: ArithmeticOp,
    ) -> Result<Self> {
        let left = left.into();
        let right = right.into();
        for operand in [&left, &right] {
            if let Self::Scalar(Scalar::Text(_) | Scalar::Tuple(_)) = operand {
                return Err(QueryError::InvalidOperand {
                    operator: op.token(),
                });
            }
        }
        Ok(Self::Arithmetic {
            left: Box::new(left),
            right: Box::new(right),
            op,
        })
    }

    fn tuple<V>(values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Scalar>,
    {
        Self::Scalar(Scalar::Tuple(values.into_iter().map(Into::into).collect()))
    }
}

impl From<Scalar> for Expr {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Self::Scalar(Scalar::Column(column))
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> ColumnRef {
        ColumnRef::new("Person", "age")
    }

    #[test]
    fn test_simple_eq() {
        let expr = Expr::eq(age(), 20);
        assert_eq!(expr.to_sql(), "Person.age = 20");
    }

    #[test]
    fn test_text_is_single_quoted() {
        let expr = Expr::ne(ColumnRef::new("Person", "name"), "Alice");
        assert_eq!(expr.to_sql(), "Person.name != 'Alice'");
    }

    #[test]
    fn test_or_combination() {
        let expr = Expr::or(Expr::eq(age(), 20), Expr::eq(age(), 21));
        assert_eq!(expr.to_sql(), "(Person.age = 20) OR (Person.age = 21)");
    }

    #[test]
    fn test_and_combination() {
        let expr = Expr::and(Expr::gt(age(), 18), Expr::lt(age(), 65));
        assert_eq!(expr.to_sql(), "(Person.age > 18) AND (Person.age < 65)");
    }

    #[test]
    fn test_in_list() {
        let expr = Expr::is_in(ColumnRef::new("Person", "id"), vec![1i64, 2, 3]);
        assert_eq!(expr.to_sql(), "Person.id IN (1, 2, 3)");
    }

    #[test]
    fn test_not_in_empty_list() {
        let ids: Vec<i64> = Vec::new();
        let expr = Expr::not_in(ColumnRef::new("Person", "id"), ids);
        assert_eq!(expr.to_sql(), "Person.id NOT IN ()");
    }

    #[test]
    fn test_arithmetic_nested_in_comparison() {
        let sum = Expr::add(age(), 1).unwrap();
        let expr = Expr::eq(sum, 21);
        assert_eq!(expr.to_sql(), "(Person.age) + (1) = 21");
    }

    #[test]
    fn test_arithmetic_rejects_text() {
        let err = Expr::mul(age(), "two").unwrap_err();
        assert_eq!(err, QueryError::InvalidOperand { operator: "*" });
    }

    #[test]
    fn test_arithmetic_rejects_tuple() {
        let tuple = Expr::Scalar(Scalar::Tuple(vec![Scalar::Integer(1)]));
        let err = Expr::div(tuple, 2).unwrap_err();
        assert_eq!(err, QueryError::InvalidOperand { operator: "/" });
    }

    #[test]
    fn test_real_literal() {
        let expr = Expr::gt(ColumnRef::new("Person", "height"), 1.75);
        assert_eq!(expr.to_sql(), "Person.height > 1.75");
    }
}
