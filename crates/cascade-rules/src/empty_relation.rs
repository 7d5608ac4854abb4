//! # Empty Relation Rules
//!
//! Relations that provably produce no rows are replaced by an `EmptyRelation` carrying
//! the replaced group's output fields, so the surrounding plan keeps its types.
//!
//! - **`LimitZeroToEmptyRule`**: `Limit(_, 0, X)` → `EmptyRelation`.
//! - **`FalseFilterToEmptyRule`**: `Filter(false, X)` → `EmptyRelation`.
//! - **`EmptyPropagationRule`**: a Filter, Project, Sort, Limit or grouped Aggregate over
//!   an empty input is empty. A global aggregate still produces one row and is kept.
//! - **`EmptyJoinLeftRule`** / **`EmptyJoinRightRule`**: a join with an empty input is
//!   empty when the join type cannot emit rows from the other side alone.
//!
//! | join type          | empty when        |
//! |--------------------|-------------------|
//! | inner, cross, semi | either side empty |
//! | left, anti         | left empty        |
//! | right              | right empty       |
//! | full               | both empty        |

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{GroupId, Memo, MemoExpr};
use cascade_core::pattern::{OpMatcher, Pattern};
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};
use tracing::trace;

fn is_empty_group(memo: &Memo, group: GroupId) -> bool {
    logical_exprs(memo, group)
        .any(|e| matches!(e.op, Operator::Logical(LogicalOp::EmptyRelation { .. })))
}

/// An `EmptyRelation` producing the fields of `expr`'s group.
fn empty_for(expr: &MemoExpr, memo: &Memo) -> Vec<RuleResult> {
    let Some(schema) = memo.group(expr.group).schema() else {
        return vec![];
    };
    // Already there.
    if is_empty_group(memo, expr.group) {
        return vec![];
    }
    trace!(group = expr.group, "{} produces no rows", expr.op);
    vec![RuleResult::Substitution(
        Operator::Logical(LogicalOp::EmptyRelation {
            projects: schema.fields.clone(),
        }),
        vec![],
    )]
}

pub struct LimitZeroToEmptyRule;

impl Rule for LimitZeroToEmptyRule {
    fn name(&self) -> &str {
        "LimitZeroToEmpty"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::limit()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Limit { count: 0, .. }) => empty_for(expr, memo),
            _ => vec![],
        }
    }
}

pub struct FalseFilterToEmptyRule;

impl Rule for FalseFilterToEmptyRule {
    fn name(&self) -> &str {
        "FalseFilterToEmpty"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Filter { predicate })
                if predicate.conjuncts().iter().any(|c| c.is_false_literal()) =>
            {
                empty_for(expr, memo)
            }
            _ => vec![],
        }
    }
}

/// Row-preserving-or-reducing unary operators over an empty input.
pub struct EmptyPropagationRule;

impl Rule for EmptyPropagationRule {
    fn name(&self) -> &str {
        "EmptyPropagation"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::Operator(OpMatcher::AnyLogical, vec![Pattern::empty_relation()])
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let propagates = match &expr.op {
            Operator::Logical(LogicalOp::Filter { .. })
            | Operator::Logical(LogicalOp::Project { .. })
            | Operator::Logical(LogicalOp::Sort { .. })
            | Operator::Logical(LogicalOp::Limit { .. }) => true,
            Operator::Logical(LogicalOp::Aggregate { group_by, .. }) => !group_by.is_empty(),
            _ => false,
        };
        match expr.children.as_slice() {
            [child] if propagates && is_empty_group(memo, *child) => empty_for(expr, memo),
            _ => vec![],
        }
    }
}

fn empty_join(expr: &MemoExpr, memo: &Memo) -> Vec<RuleResult> {
    let Operator::Logical(LogicalOp::Join { join_type, .. }) = &expr.op else {
        return vec![];
    };
    let [left, right] = expr.children.as_slice() else {
        return vec![];
    };
    let left_empty = is_empty_group(memo, *left);
    let right_empty = is_empty_group(memo, *right);
    let empty = match join_type {
        JoinType::Inner | JoinType::Cross | JoinType::Semi => left_empty || right_empty,
        JoinType::Left | JoinType::Anti => left_empty,
        JoinType::Right => right_empty,
        JoinType::Full => left_empty && right_empty,
    };
    if empty {
        empty_for(expr, memo)
    } else {
        vec![]
    }
}

pub struct EmptyJoinLeftRule;

impl Rule for EmptyJoinLeftRule {
    fn name(&self) -> &str {
        "EmptyJoinLeft"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Join),
            vec![Pattern::empty_relation(), Pattern::Any],
        )
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        empty_join(expr, memo)
    }
}

pub struct EmptyJoinRightRule;

impl Rule for EmptyJoinRightRule {
    fn name(&self) -> &str {
        "EmptyJoinRight"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Join),
            vec![Pattern::Any, Pattern::empty_relation()],
        )
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        empty_join(expr, memo)
    }
}
