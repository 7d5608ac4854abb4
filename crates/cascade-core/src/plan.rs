//! # Plan Trees
//!
//! `LogicalPlan` is the tree form of a query handed to the optimizer. Every constructor
//! validates arity and types against the children's schemas, so a `LogicalPlan` that
//! exists is well-formed: each column reference resolves and each predicate is boolean.
//! The output schema is a pure function of the operator and its inputs' schemas
//! (`LogicalOp::derive_schema`), shared by the memo when it computes group properties.
//!
//! `PhysicalPlan` is what the optimizer hands back: an immutable tree of physical
//! operators annotated with cost, estimated row count and the physical properties each
//! node produces.

use crate::cost::{Cost, CostModel};
use crate::error::{PlanError, PlanResult};
use crate::expr::*;
use crate::properties::{provided_props, PhysicalPropertySet};
use crate::stats::{Statistics, DEFAULT_ROW_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of inputs an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

impl LogicalOp {
    pub fn arity(&self) -> Arity {
        match self {
            LogicalOp::Scan { .. } | LogicalOp::EmptyRelation { .. } => Arity::Exact(0),
            LogicalOp::Filter { .. }
            | LogicalOp::Project { .. }
            | LogicalOp::Aggregate { .. }
            | LogicalOp::Sort { .. }
            | LogicalOp::Limit { .. } => Arity::Exact(1),
            LogicalOp::Join { .. } => Arity::Exact(2),
            LogicalOp::Union { .. } => Arity::AtLeast(2),
        }
    }

    /// Output schema of this operator over inputs with the given schemas. Validates the
    /// operator's expressions along the way.
    pub fn derive_schema(&self, inputs: &[&Schema]) -> PlanResult<Schema> {
        let arity = self.arity();
        if !arity.accepts(inputs.len()) {
            return Err(PlanError::InvalidArity {
                op: format!("{:?}", self.kind()),
                expected: arity.to_string(),
                actual: inputs.len(),
            });
        }

        match self {
            LogicalOp::Scan {
                columns, predicate, ..
            } => {
                let schema = Schema::new(columns.clone());
                if let Some(p) = predicate {
                    p.check_predicate(&schema)?;
                }
                Ok(schema)
            }
            LogicalOp::Filter { predicate } => {
                predicate.check_predicate(inputs[0])?;
                Ok(inputs[0].clone())
            }
            LogicalOp::Project { exprs, aliases } => {
                if exprs.len() != aliases.len() {
                    return Err(PlanError::InvalidPlan(format!(
                        "projection has {} expressions but {} aliases",
                        exprs.len(),
                        aliases.len()
                    )));
                }
                let input = inputs[0];
                let mut fields = Vec::with_capacity(exprs.len());
                for (expr, alias) in exprs.iter().zip(aliases) {
                    fields.push(output_field(expr, Some(alias), input)?);
                }
                Ok(Schema::new(fields))
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => {
                let (left, right) = (inputs[0], inputs[1]);
                let combined = Schema::join(left, right);
                condition.check_predicate(&combined)?;
                let nullable = |fields: &[Field]| {
                    fields
                        .iter()
                        .map(|f| Field {
                            nullable: true,
                            ..f.clone()
                        })
                        .collect::<Vec<_>>()
                };
                let fields = match join_type {
                    JoinType::Semi | JoinType::Anti => left.fields.clone(),
                    JoinType::Inner | JoinType::Cross => combined.fields,
                    JoinType::Left => {
                        let mut f = left.fields.clone();
                        f.extend(nullable(&right.fields));
                        f
                    }
                    JoinType::Right => {
                        let mut f = nullable(&left.fields);
                        f.extend(right.fields.iter().cloned());
                        f
                    }
                    JoinType::Full => {
                        let mut f = nullable(&left.fields);
                        f.extend(nullable(&right.fields));
                        f
                    }
                };
                Ok(Schema::new(fields))
            }
            LogicalOp::Aggregate {
                group_by,
                aggregates,
            } => {
                let input = inputs[0];
                let mut fields = Vec::with_capacity(group_by.len() + aggregates.len());
                for expr in group_by {
                    fields.push(output_field(expr, None, input)?);
                }
                for agg in aggregates {
                    let data_type = agg.return_type(input)?;
                    let nullable = agg.func != AggFunc::Count;
                    fields.push(Field::new(None, agg.alias.clone(), data_type, nullable));
                }
                Ok(Schema::new(fields))
            }
            LogicalOp::Sort { order } => {
                for key in order {
                    key.expr.data_type(inputs[0])?;
                }
                Ok(inputs[0].clone())
            }
            LogicalOp::Limit { .. } => Ok(inputs[0].clone()),
            LogicalOp::EmptyRelation { projects } => Ok(Schema::new(projects.clone())),
            LogicalOp::Union { .. } => {
                let first = inputs[0];
                let mut fields = first.fields.clone();
                for input in &inputs[1..] {
                    if input.len() != first.len() {
                        return Err(PlanError::InvalidPlan(format!(
                            "union inputs have {} and {} columns",
                            first.len(),
                            input.len()
                        )));
                    }
                    for (out, field) in fields.iter_mut().zip(&input.fields) {
                        if !out.data_type.is_compatible(field.data_type) {
                            return Err(PlanError::TypeMismatch {
                                context: format!("union column {}", out.name),
                                left: out.data_type,
                                right: field.data_type,
                            });
                        }
                        out.nullable |= field.nullable;
                    }
                }
                Ok(Schema::new(fields))
            }
        }
    }
}

/// Output field produced by `expr`. A plain column keeps the input field (and its
/// qualifier) when it is not renamed.
fn output_field(expr: &Expr, alias: Option<&String>, input: &Schema) -> PlanResult<Field> {
    if let Expr::Column(c) = expr {
        let field = input.field(c)?;
        if alias.map_or(true, |a| *a == c.name) {
            return Ok(field.clone());
        }
    }
    let name = alias.cloned().unwrap_or_else(|| expr.to_string());
    Ok(Field::new(
        None,
        name,
        expr.data_type(input)?,
        expr.nullable(input)?,
    ))
}

/// A validated logical plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLogicalPlan")]
pub struct LogicalPlan {
    op: LogicalOp,
    inputs: Vec<LogicalPlan>,
    schema: Schema,
}

/// Unvalidated wire form of a `LogicalPlan`.
#[derive(Debug, Deserialize)]
struct RawLogicalPlan {
    op: LogicalOp,
    #[serde(default)]
    inputs: Vec<RawLogicalPlan>,
}

impl TryFrom<RawLogicalPlan> for LogicalPlan {
    type Error = PlanError;

    fn try_from(raw: RawLogicalPlan) -> PlanResult<Self> {
        let inputs = raw
            .inputs
            .into_iter()
            .map(LogicalPlan::try_from)
            .collect::<PlanResult<Vec<_>>>()?;
        LogicalPlan::try_new(raw.op, inputs)
    }
}

impl LogicalPlan {
    pub fn try_new(op: LogicalOp, inputs: Vec<LogicalPlan>) -> PlanResult<Self> {
        let schema = {
            let schemas: Vec<&Schema> = inputs.iter().map(|i| &i.schema).collect();
            op.derive_schema(&schemas)?
        };
        Ok(Self { op, inputs, schema })
    }

    pub fn op(&self) -> &LogicalOp {
        &self.op
    }

    pub fn inputs(&self) -> &[LogicalPlan] {
        &self.inputs
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Scan of `columns` of `table`.
    pub fn scan(table: TableRef, columns: Vec<Field>) -> PlanResult<Self> {
        Self::try_new(
            LogicalOp::Scan {
                table,
                columns,
                predicate: None,
            },
            vec![],
        )
    }

    pub fn empty(projects: Vec<Field>) -> PlanResult<Self> {
        Self::try_new(LogicalOp::EmptyRelation { projects }, vec![])
    }

    pub fn filter(self, predicate: Expr) -> PlanResult<Self> {
        Self::try_new(LogicalOp::Filter { predicate }, vec![self])
    }

    pub fn project(self, exprs: Vec<Expr>, aliases: Vec<String>) -> PlanResult<Self> {
        Self::try_new(LogicalOp::Project { exprs, aliases }, vec![self])
    }

    pub fn join(self, right: LogicalPlan, join_type: JoinType, condition: Expr) -> PlanResult<Self> {
        Self::try_new(
            LogicalOp::Join {
                join_type,
                condition,
            },
            vec![self, right],
        )
    }

    pub fn aggregate(self, group_by: Vec<Expr>, aggregates: Vec<AggExpr>) -> PlanResult<Self> {
        Self::try_new(
            LogicalOp::Aggregate {
                group_by,
                aggregates,
            },
            vec![self],
        )
    }

    pub fn sort(self, order: Vec<SortKey>) -> PlanResult<Self> {
        Self::try_new(LogicalOp::Sort { order }, vec![self])
    }

    pub fn limit(self, offset: u64, count: u64) -> PlanResult<Self> {
        Self::try_new(LogicalOp::Limit { offset, count }, vec![self])
    }

    pub fn union(inputs: Vec<LogicalPlan>, all: bool) -> PlanResult<Self> {
        Self::try_new(LogicalOp::Union { all }, inputs)
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.op, indent = indent * 2)?;
        for input in &self.inputs {
            input.fmt_indent(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

/// An executable plan extracted from the memo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPlan {
    pub op: PhysicalOp,
    pub children: Vec<PhysicalPlan>,
    /// Total cost of this subtree.
    pub cost: Cost,
    pub row_count: f64,
    /// Physical properties this node's output carries.
    pub provided: PhysicalPropertySet,
    pub schema: Schema,
}

impl PhysicalPlan {
    /// Indented textual form, one node per line.
    pub fn display(&self, indent: usize) -> String {
        let mut out = format!(
            "{:indent$}{} (cost={:.2}, rows={:.0})\n",
            "",
            self.op,
            self.cost.total,
            self.row_count,
            indent = indent * 2
        );
        for child in &self.children {
            out.push_str(&child.display(indent + 1));
        }
        out
    }

    /// Number of nodes in the tree with the given operator kind.
    pub fn count(&self, kind: PhysicalOpKind) -> usize {
        let own = usize::from(self.op.kind() == kind);
        own + self.children.iter().map(|c| c.count(kind)).sum::<usize>()
    }

    /// Pre-order iterator over every node.
    pub fn nodes(&self) -> Vec<&PhysicalPlan> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.nodes());
        }
        out
    }

    /// Put the output columns in `target` order with a projection on top. Plans already
    /// in that order, or producing other columns, are returned unchanged.
    pub fn reorder_to(self, target: &Schema, cost_model: &dyn CostModel) -> PhysicalPlan {
        let expected: Vec<ColumnRef> = target.fields.iter().map(Field::column_ref).collect();
        let actual: Vec<ColumnRef> = self.schema.fields.iter().map(Field::column_ref).collect();
        if expected == actual || !self.schema.same_columns(target) {
            return self;
        }

        let op = PhysicalOp::Project {
            exprs: expected.iter().cloned().map(Expr::Column).collect(),
            aliases: expected.iter().map(|c| c.name.clone()).collect(),
        };
        let stats = Statistics::new(self.row_count, self.row_count * DEFAULT_ROW_SIZE);
        let any = PhysicalPropertySet::any();
        let cost = cost_model.compute_cost(&op, &[&stats], &[self.cost], &any);
        let provided = provided_props(&op, std::slice::from_ref(&self.provided), &any);
        PhysicalPlan {
            op,
            row_count: self.row_count,
            cost,
            provided,
            schema: target.clone(),
            children: vec![self],
        }
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(0))
    }
}
