//! # Relational Implementation Rules
//!
//! One-to-one implementations of the row-at-a-time logical operators:
//!
//! - **`ImplFilterRule`**: Filter → Filter. Streams its input and keeps its properties.
//! - **`ImplProjectRule`**: Project → Project. Keeps the input order and distribution as
//!   far as the projected columns pass them through.
//! - **`ImplLimitRule`**: Limit → Limit. Needs a single stream to count rows.
//! - **`ImplEmptyRelationRule`**: EmptyRelation → EmptyRelation. Costs nothing and
//!   trivially satisfies any required order or distribution.
//! - **`ImplUnionRule`**: `UNION ALL` → UnionAll. A distinct union is implemented as a
//!   hash aggregate grouping on every output column over a UnionAll of the same inputs.

use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

pub struct ImplFilterRule;

impl Rule for ImplFilterRule {
    fn name(&self) -> &str {
        "ImplFilter"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Filter {
                predicate: predicate.clone(),
            }),
            expr.children.clone(),
        )]
    }
}

pub struct ImplProjectRule;

impl Rule for ImplProjectRule {
    fn name(&self) -> &str {
        "ImplProject"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Project { exprs, aliases }) = &expr.op else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Project {
                exprs: exprs.clone(),
                aliases: aliases.clone(),
            }),
            expr.children.clone(),
        )]
    }
}

pub struct ImplLimitRule;

impl Rule for ImplLimitRule {
    fn name(&self) -> &str {
        "ImplLimit"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::limit()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Limit { offset, count }) = &expr.op else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Limit {
                offset: *offset,
                count: *count,
            }),
            expr.children.clone(),
        )]
    }
}

pub struct ImplEmptyRelationRule;

impl Rule for ImplEmptyRelationRule {
    fn name(&self) -> &str {
        "ImplEmptyRelation"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::empty_relation()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::EmptyRelation { projects }) = &expr.op else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::EmptyRelation {
                projects: projects.clone(),
            }),
            vec![],
        )]
    }
}

pub struct ImplUnionRule;

impl Rule for ImplUnionRule {
    fn name(&self) -> &str {
        "ImplUnion"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::union()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Union { all }) = &expr.op else {
            return vec![];
        };
        if *all {
            return vec![RuleResult::Substitution(
                Operator::Physical(PhysicalOp::UnionAll),
                expr.children.clone(),
            )];
        }

        let Some(schema) = memo.group(expr.group).schema() else {
            return vec![];
        };
        let group_by = schema
            .fields
            .iter()
            .map(|f| Expr::Column(f.column_ref()))
            .collect();
        vec![RuleResult::NewChildren(
            Operator::Physical(PhysicalOp::HashAggregate {
                group_by,
                aggregates: vec![],
            }),
            vec![RuleChild::NewExpr(
                Operator::Logical(LogicalOp::Union { all: true }),
                expr.children.iter().map(|&g| RuleChild::Group(g)).collect(),
            )],
        )]
    }
}
