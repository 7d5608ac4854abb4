//! # Expression and Operator Types
//!
//! The plan representation is organized into three layers:
//!
//! ## Scalar Expressions (`Expr`)
//! Row-level computations: column references, literals, arithmetic, comparisons, boolean
//! connectives, casts and function calls. They live inside operators (predicates, projection
//! lists, join conditions, sort keys) and are type-checked against the input `Schema` of the
//! operator that carries them.
//!
//! ## Logical Operators (`LogicalOp`)
//! *What* to compute. Exploration rules rewrite them into equivalent logical alternatives
//! and implementation rules map them onto physical operators.
//!
//! ## Physical Operators (`PhysicalOp`)
//! *How* to compute it. Each physical operator has a cost formula in the cost model and
//! declares the physical properties it produces and requires of its inputs.
//!
//! The `Operator` enum wraps both so the memo can store them uniformly; `OpKind` strips the
//! payload for cheap pattern checks.

use crate::error::{PlanError, PlanResult};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Reference to a column, optionally qualified by the relation that produces it.
///
/// Columns are resolved by name against the input schema of the operator holding the
/// expression. An unqualified reference must match exactly one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// SQL value types known to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Days since 1970-01-01.
    Date,
    /// Type of the untyped `NULL` literal; compatible with every other type.
    Null,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Whether values of the two types can be compared with each other.
    pub fn is_compatible(self, other: DataType) -> bool {
        self == other
            || self == DataType::Null
            || other == DataType::Null
            || (self.is_numeric() && other.is_numeric())
    }
}

/// A named, typed output column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(
        qualifier: Option<&str>,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// A column reference that resolves to exactly this field.
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef {
            table: self.qualifier.clone(),
            name: self.name.clone(),
        }
    }

    pub fn matches(&self, col: &ColumnRef) -> bool {
        self.name == col.name
            && match col.table {
                Some(ref t) => self.qualifier.as_deref() == Some(t.as_str()),
                None => true,
            }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(ref q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Ordered list of output fields of a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the field a column reference resolves to.
    pub fn index_of(&self, col: &ColumnRef) -> PlanResult<usize> {
        let mut found = None;
        for (i, field) in self.fields.iter().enumerate() {
            if field.matches(col) {
                if found.is_some() {
                    return Err(PlanError::AmbiguousColumn(col.clone()));
                }
                found = Some(i);
            }
        }
        found.ok_or_else(|| PlanError::ColumnNotFound(col.clone()))
    }

    pub fn field(&self, col: &ColumnRef) -> PlanResult<&Field> {
        self.index_of(col).map(|i| &self.fields[i])
    }

    pub fn contains(&self, col: &ColumnRef) -> bool {
        self.index_of(col).is_ok()
    }

    /// Concatenation of two schemas, as produced by a join.
    pub fn join(left: &Schema, right: &Schema) -> Schema {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }

    /// Same set of fields, regardless of order.
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().all(|f| other.fields.contains(f))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so literals can take part in Eq/Hash comparisons, which
/// the memo relies on for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Days since Unix epoch (1970-01-01).
    Date(i32),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Date(_) => DataType::Date,
        }
    }

    /// Numeric view of the value, used for range selectivity.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(v.into_inner()),
            ScalarValue::Date(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
            ScalarValue::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

/// Scalar expressions used in predicates, projections, join conditions and sort keys.
///
/// Expressions are immutable trees; structural identity (derived `Eq`/`Hash`) is what the
/// memo uses to recognise duplicate operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Named function call. The planner does not know function signatures, so the
    /// caller supplies the result type.
    Function {
        name: String,
        args: Vec<Expr>,
        return_type: DataType,
    },
    /// Conjunction stored as a flat list to simplify predicate decomposition and pushdown.
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
    },
}

/// Shorthand for a qualified column reference expression.
pub fn col(table: &str, name: &str) -> Expr {
    Expr::Column(ColumnRef::new(table, name))
}

pub fn lit(value: ScalarValue) -> Expr {
    Expr::Literal(value)
}

pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Combine predicates into one, flattening nested conjunctions. An empty input yields
/// the literal `true`.
pub fn make_conjunction(predicates: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(predicates.len());
    for p in predicates {
        match p {
            Expr::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expr::Literal(ScalarValue::Bool(true)),
        1 => flat.remove(0),
        _ => Expr::And(flat),
    }
}

impl Expr {
    /// Return all column references in this expression.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
            Expr::Cast { expr, .. } => expr.collect_columns(out),
        }
    }

    /// Check if this expression references columns from a given table.
    pub fn references_table(&self, table: &str) -> bool {
        self.columns()
            .iter()
            .any(|c| c.table.as_deref() == Some(table))
    }

    /// Whether every column this expression references resolves in `schema`.
    pub fn is_bound_by(&self, schema: &Schema) -> bool {
        self.columns().into_iter().all(|c| schema.contains(c))
    }

    /// Flatten AND-chains: (A AND (B AND C)) → [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self, Expr::Literal(ScalarValue::Bool(true)))
    }

    pub fn is_false_literal(&self) -> bool {
        matches!(self, Expr::Literal(ScalarValue::Bool(false)))
    }

    /// Result type of the expression evaluated over rows of `schema`. Fails when a column
    /// does not resolve or operand types are incompatible.
    pub fn data_type(&self, schema: &Schema) -> PlanResult<DataType> {
        match self {
            Expr::Column(c) => Ok(schema.field(c)?.data_type),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::BinaryOp { op, left, right } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                if op.is_comparison() {
                    if !l.is_compatible(r) {
                        return Err(PlanError::TypeMismatch {
                            context: format!("{}", self),
                            left: l,
                            right: r,
                        });
                    }
                    return Ok(DataType::Boolean);
                }
                let numeric = |t: DataType| t.is_numeric() || t == DataType::Null;
                if !numeric(l) || !numeric(r) {
                    return Err(PlanError::TypeMismatch {
                        context: format!("{}", self),
                        left: l,
                        right: r,
                    });
                }
                if l == DataType::Float64 || r == DataType::Float64 {
                    Ok(DataType::Float64)
                } else {
                    Ok(DataType::Int64)
                }
            }
            Expr::UnaryOp { op, operand } => {
                let t = operand.data_type(schema)?;
                match op {
                    UnaryOp::Not => {
                        expect_type(self, t, DataType::Boolean)?;
                        Ok(DataType::Boolean)
                    }
                    UnaryOp::Neg => {
                        if !t.is_numeric() && t != DataType::Null {
                            return Err(PlanError::TypeMismatch {
                                context: format!("{}", self),
                                left: t,
                                right: DataType::Int64,
                            });
                        }
                        Ok(t)
                    }
                    UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(DataType::Boolean),
                }
            }
            Expr::Function {
                args, return_type, ..
            } => {
                for a in args {
                    a.data_type(schema)?;
                }
                Ok(*return_type)
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    let t = e.data_type(schema)?;
                    expect_type(e, t, DataType::Boolean)?;
                }
                Ok(DataType::Boolean)
            }
            Expr::Cast { expr, data_type } => {
                expr.data_type(schema)?;
                Ok(*data_type)
            }
        }
    }

    pub fn nullable(&self, schema: &Schema) -> PlanResult<bool> {
        match self {
            Expr::Column(c) => Ok(schema.field(c)?.nullable),
            Expr::Literal(v) => Ok(matches!(v, ScalarValue::Null)),
            Expr::UnaryOp {
                op: UnaryOp::IsNull | UnaryOp::IsNotNull,
                ..
            } => Ok(false),
            Expr::UnaryOp { operand, .. } => operand.nullable(schema),
            Expr::BinaryOp { left, right, .. } => {
                Ok(left.nullable(schema)? || right.nullable(schema)?)
            }
            Expr::Function { args, .. } | Expr::And(args) | Expr::Or(args) => {
                for a in args {
                    if a.nullable(schema)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Cast { expr, .. } => expr.nullable(schema),
        }
    }

    /// Type-check a predicate: it must resolve and produce a boolean.
    pub fn check_predicate(&self, schema: &Schema) -> PlanResult<()> {
        let t = self.data_type(schema)?;
        expect_type(self, t, DataType::Boolean)
    }
}

fn expect_type(expr: &Expr, actual: DataType, expected: DataType) -> PlanResult<()> {
    if actual == expected || actual == DataType::Null {
        Ok(())
    } else {
        Err(PlanError::TypeMismatch {
            context: format!("{}", expr),
            left: actual,
            right: expected,
        })
    }
}

/// Split an equi-join condition into (left key, right key) pairs, oriented so the first
/// element of each pair resolves in `left` and the second in `right`. Conjuncts that are
/// not column equalities across the two sides are ignored.
pub fn equi_join_keys(condition: &Expr, left: &Schema, right: &Schema) -> Vec<(Expr, Expr)> {
    let mut keys = Vec::new();
    for conj in condition.conjuncts() {
        if let Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: a,
            right: b,
        } = conj
        {
            if a.is_bound_by(left) && b.is_bound_by(right) && !a.columns().is_empty() {
                keys.push((a.as_ref().clone(), b.as_ref().clone()));
            } else if b.is_bound_by(left) && a.is_bound_by(right) && !b.columns().is_empty() {
                keys.push((b.as_ref().clone(), a.as_ref().clone()));
            }
        }
    }
    keys
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT {}", operand),
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::IsNull => write!(f, "{} IS NULL", operand),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", operand),
            },
            Expr::Function { name, args, .. } => {
                write!(f, "{}(", name)?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::And(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " AND ")?;
                write!(f, ")")
            }
            Expr::Or(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " OR ")?;
                write!(f, ")")
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {:?})", expr, data_type),
        }
    }
}

pub(crate) fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    sep: &str,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// The operator with its operands swapped: `a < b` ⇔ `b > a`.
    pub fn commute(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// SQL join types.
///
/// Only Inner and Cross joins are commutative and associative; the outer, semi and anti
/// variants have fixed left/right semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    /// All rows from the left, matching rows from the right (or NULLs).
    Left,
    /// All rows from the right, matching rows from the left (or NULLs).
    Right,
    Full,
    /// Left rows with at least one match on the right. Produces left columns only.
    Semi,
    /// Left rows with no match on the right. Produces left columns only.
    Anti,
    /// Cartesian product. The condition is the literal `true`.
    Cross,
}

impl JoinType {
    pub fn is_inner_like(self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Cross)
    }

    /// Whether the join produces only the left input's columns.
    pub fn is_left_only(self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Aggregate expression with the name of the column it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Expr,
    pub distinct: bool,
    pub alias: String,
}

impl AggExpr {
    pub fn new(func: AggFunc, arg: Expr, alias: impl Into<String>) -> Self {
        Self {
            func,
            arg,
            distinct: false,
            alias: alias.into(),
        }
    }

    pub fn return_type(&self, schema: &Schema) -> PlanResult<DataType> {
        let arg = self.arg.data_type(schema)?;
        match self.func {
            AggFunc::Count => Ok(DataType::Int64),
            AggFunc::Avg => Ok(DataType::Float64),
            AggFunc::Sum => {
                if arg == DataType::Float64 {
                    Ok(DataType::Float64)
                } else if arg.is_numeric() || arg == DataType::Null {
                    Ok(DataType::Int64)
                } else {
                    Err(PlanError::TypeMismatch {
                        context: format!("{}", self),
                        left: arg,
                        right: DataType::Int64,
                    })
                }
            }
            AggFunc::Min | AggFunc::Max => Ok(arg),
        }
    }
}

impl fmt::Display for AggExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        write!(f, "{:?}({}{}) AS {}", self.func, distinct, self.arg, self.alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    /// Ascending, nulls last.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.expr,
            if self.ascending { "ASC" } else { "DESC" },
            if self.nulls_first { " NULLS FIRST" } else { "" }
        )
    }
}

/// How rows of a relation are spread across workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// All rows in a single stream.
    Single,
    /// Every row replicated to all workers.
    Broadcast,
    /// Hash-partitioned on the given expressions.
    Hash(Vec<Expr>),
    /// Spread evenly with no locality guarantee.
    RoundRobin,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Single => write!(f, "single"),
            Distribution::Broadcast => write!(f, "broadcast"),
            Distribution::Hash(keys) => {
                write!(f, "hash(")?;
                write_list(f, keys, ", ")?;
                write!(f, ")")
            }
            Distribution::RoundRobin => write!(f, "round-robin"),
        }
    }
}

/// Build side for hash joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildSide {
    Left,
    Right,
}

/// How a hash join gets matching rows onto the same worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinDistribution {
    /// Both inputs hash-partitioned on the join key.
    Partitioned,
    /// The build side replicated to every worker; the probe side stays where it is.
    Broadcast,
}

/// Logical operators: *what* to compute.
///
/// Children are not stored inline. In a `LogicalPlan` they are sub-plans, in the memo they
/// are group ids held by the `MemoExpr` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// Leaf reading `columns` of a base table, with an optional pushed-down predicate
    /// evaluated against those columns.
    Scan {
        table: TableRef,
        columns: Vec<Field>,
        predicate: Option<Expr>,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<Expr>,
        aliases: Vec<String>,
    },
    Join {
        join_type: JoinType,
        condition: Expr,
    },
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    Sort {
        order: Vec<SortKey>,
    },
    Limit {
        offset: u64,
        count: u64,
    },
    /// A relation statically known to produce no rows, such as `SELECT * FROM t LIMIT 0`.
    /// It keeps the output fields of the subtree it replaced so the surrounding plan stays
    /// well-typed.
    EmptyRelation {
        projects: Vec<Field>,
    },
    /// Union of two or more inputs with positionally compatible columns. `all = false`
    /// removes duplicates.
    Union {
        all: bool,
    },
}

impl LogicalOp {
    /// Output fields of an `EmptyRelation`; `None` for every other operator.
    pub fn projects(&self) -> Option<&[Field]> {
        match self {
            LogicalOp::EmptyRelation { projects } => Some(projects),
            _ => None,
        }
    }
}

/// Physical operators: *how* to compute it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    /// Full table scan. Produces the table's native distribution and no order.
    SeqScan {
        table: TableRef,
        columns: Vec<Field>,
        predicate: Option<Expr>,
        distribution: Distribution,
    },
    /// Scan through an ordered index. Produces rows in `order` when the table is not
    /// partitioned; a partitioned table only yields per-partition order.
    IndexScan {
        table: TableRef,
        index: String,
        columns: Vec<Field>,
        predicate: Option<Expr>,
        order: Vec<SortKey>,
        distribution: Distribution,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<Expr>,
        aliases: Vec<String>,
    },
    /// Builds a hash table on `build_side` and probes it with the other input.
    /// Requires at least one equi-join key.
    HashJoin {
        join_type: JoinType,
        build_side: BuildSide,
        distribution: JoinDistribution,
        condition: Expr,
    },
    /// Merges two inputs sorted on the equi-join keys.
    MergeJoin {
        join_type: JoinType,
        condition: Expr,
    },
    /// Compares every pair of rows. Works for any condition.
    NestedLoopJoin {
        join_type: JoinType,
        condition: Expr,
    },
    HashAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Single pass over input sorted on the group-by keys.
    StreamAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Full sort into a single stream. Also used as the ordering enforcer.
    SortOp {
        order: Vec<SortKey>,
    },
    Limit {
        offset: u64,
        count: u64,
    },
    /// Produces no rows.
    EmptyRelation {
        projects: Vec<Field>,
    },
    /// Concatenates its inputs.
    UnionAll,
    /// Redistributes rows across workers. Used as the distribution enforcer.
    Exchange {
        distribution: Distribution,
    },
}

/// Unified operator enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Logical(l) => OpKind::Logical(l.kind()),
            Operator::Physical(p) => OpKind::Physical(p.kind()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Logical(l) => write!(f, "{}", l),
            Operator::Physical(p) => write!(f, "{}", p),
        }
    }
}

/// Kind discriminant for pattern matching (without data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOpKind {
    Scan,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Limit,
    EmptyRelation,
    Union,
}

impl LogicalOp {
    pub fn kind(&self) -> LogicalOpKind {
        match self {
            LogicalOp::Scan { .. } => LogicalOpKind::Scan,
            LogicalOp::Filter { .. } => LogicalOpKind::Filter,
            LogicalOp::Project { .. } => LogicalOpKind::Project,
            LogicalOp::Join { .. } => LogicalOpKind::Join,
            LogicalOp::Aggregate { .. } => LogicalOpKind::Aggregate,
            LogicalOp::Sort { .. } => LogicalOpKind::Sort,
            LogicalOp::Limit { .. } => LogicalOpKind::Limit,
            LogicalOp::EmptyRelation { .. } => LogicalOpKind::EmptyRelation,
            LogicalOp::Union { .. } => LogicalOpKind::Union,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    SeqScan,
    IndexScan,
    Filter,
    Project,
    HashJoin,
    MergeJoin,
    NestedLoopJoin,
    HashAggregate,
    StreamAggregate,
    SortOp,
    Limit,
    EmptyRelation,
    UnionAll,
    Exchange,
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::SeqScan { .. } => PhysicalOpKind::SeqScan,
            PhysicalOp::IndexScan { .. } => PhysicalOpKind::IndexScan,
            PhysicalOp::Filter { .. } => PhysicalOpKind::Filter,
            PhysicalOp::Project { .. } => PhysicalOpKind::Project,
            PhysicalOp::HashJoin { .. } => PhysicalOpKind::HashJoin,
            PhysicalOp::MergeJoin { .. } => PhysicalOpKind::MergeJoin,
            PhysicalOp::NestedLoopJoin { .. } => PhysicalOpKind::NestedLoopJoin,
            PhysicalOp::HashAggregate { .. } => PhysicalOpKind::HashAggregate,
            PhysicalOp::StreamAggregate { .. } => PhysicalOpKind::StreamAggregate,
            PhysicalOp::SortOp { .. } => PhysicalOpKind::SortOp,
            PhysicalOp::Limit { .. } => PhysicalOpKind::Limit,
            PhysicalOp::EmptyRelation { .. } => PhysicalOpKind::EmptyRelation,
            PhysicalOp::UnionAll => PhysicalOpKind::UnionAll,
            PhysicalOp::Exchange { .. } => PhysicalOpKind::Exchange,
        }
    }

    /// Whether this operator only exists to establish a physical property.
    pub fn is_enforcer(&self) -> bool {
        matches!(self, PhysicalOp::SortOp { .. } | PhysicalOp::Exchange { .. })
    }
}

fn write_predicate(f: &mut fmt::Formatter<'_>, predicate: &Option<Expr>) -> fmt::Result {
    match predicate {
        Some(p) => write!(f, " WHERE {}", p),
        None => Ok(()),
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::Scan {
                table, predicate, ..
            } => {
                write!(f, "Scan {}", table)?;
                write_predicate(f, predicate)
            }
            LogicalOp::Filter { predicate } => write!(f, "Filter {}", predicate),
            LogicalOp::Project { exprs, .. } => {
                write!(f, "Project [")?;
                write_list(f, exprs, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => write!(f, "Join[{:?}] {}", join_type, condition),
            LogicalOp::Aggregate {
                group_by,
                aggregates,
            } => {
                write!(f, "Aggregate [")?;
                write_list(f, group_by, ", ")?;
                write!(f, "] [")?;
                write_list(f, aggregates, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Sort { order } => {
                write!(f, "Sort [")?;
                write_list(f, order, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Limit { offset, count } => write!(f, "Limit {} OFFSET {}", count, offset),
            LogicalOp::EmptyRelation { projects } => {
                write!(f, "EmptyRelation [")?;
                write_list(f, projects, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Union { all } => write!(f, "Union{}", if *all { " ALL" } else { "" }),
        }
    }
}

impl fmt::Display for PhysicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalOp::SeqScan {
                table, predicate, ..
            } => {
                write!(f, "SeqScan {}", table)?;
                write_predicate(f, predicate)
            }
            PhysicalOp::IndexScan {
                table,
                index,
                predicate,
                ..
            } => {
                write!(f, "IndexScan {} USING {}", table, index)?;
                write_predicate(f, predicate)
            }
            PhysicalOp::Filter { predicate } => write!(f, "Filter {}", predicate),
            PhysicalOp::Project { exprs, .. } => {
                write!(f, "Project [")?;
                write_list(f, exprs, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::HashJoin {
                join_type,
                build_side,
                distribution,
                condition,
            } => write!(
                f,
                "HashJoin[{:?}, build={:?}, {:?}] {}",
                join_type, build_side, distribution, condition
            ),
            PhysicalOp::MergeJoin {
                join_type,
                condition,
            } => write!(f, "MergeJoin[{:?}] {}", join_type, condition),
            PhysicalOp::NestedLoopJoin {
                join_type,
                condition,
            } => write!(f, "NestedLoopJoin[{:?}] {}", join_type, condition),
            PhysicalOp::HashAggregate { group_by, .. } => {
                write!(f, "HashAggregate [")?;
                write_list(f, group_by, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::StreamAggregate { group_by, .. } => {
                write!(f, "StreamAggregate [")?;
                write_list(f, group_by, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::SortOp { order } => {
                write!(f, "Sort [")?;
                write_list(f, order, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::Limit { offset, count } => {
                write!(f, "Limit {} OFFSET {}", count, offset)
            }
            PhysicalOp::EmptyRelation { projects } => {
                write!(f, "EmptyRelation [")?;
                write_list(f, projects, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::UnionAll => write!(f, "UnionAll"),
            PhysicalOp::Exchange { distribution } => write!(f, "Exchange[{}]", distribution),
        }
    }
}
