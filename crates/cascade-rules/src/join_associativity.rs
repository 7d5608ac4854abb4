//! # Join Associativity Rule
//!
//! `(A JOIN_1 B) JOIN_2 C = A JOIN_1 (B JOIN_2 C)` for inner joins.
//!
//! Associativity changes the *shape* of the join tree (left-deep, right-deep, bushy).
//! Combined with commutativity it reaches every join order, which matters for queries
//! over many tables (TPC-H Q5 joins six) where the best order can be orders of magnitude
//! cheaper than a naive one.
//!
//! ## Implementation
//!
//! The rule returns [`RuleResult::NewChildren`] with a [`RuleChild::NewExpr`] for the new
//! inner join. The search materializes it with `memo.add_expr()`, reusing an existing
//! group when the same join was already produced by another path.
//!
//! ## Condition Handling
//!
//! Conjuncts of the outer condition are redistributed by the columns they reference:
//!
//! 1. conjuncts over the moved input and C only go to the new inner join;
//! 2. everything else stays on the new outer join, together with the old inner condition.
//!
//! The rule fires only when the new inner join gets at least one conjunct that links its
//! two inputs, so it never introduces a cross product.
//!
//! ## Both Orientations
//!
//! - `(A ⋈ B) ⋈ C → A ⋈ (B ⋈ C)` when the outer condition connects B and C
//! - `(A ⋈ B) ⋈ C → B ⋈ (A ⋈ C)` when the outer condition connects A and C
//!
//! Every inner join of the left child group is tried, so alternatives found later for
//! that group are reassociated as well.
//!
//! ## Applicability
//!
//! Inner joins only. Outer join reassociation needs the validity matrix from Moerkotte &
//! Neumann and is not attempted.

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{GroupId, Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};
use tracing::trace;

/// Join associativity: `(A ⋈₁ B) ⋈₂ C → A ⋈ (B ⋈ C)`.
pub struct JoinAssociativityRule;

impl Rule for JoinAssociativityRule {
    fn name(&self) -> &str {
        "JoinAssociativity"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join_join_left()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: outer_cond,
        }) = &expr.op
        else {
            return vec![];
        };
        if expr.children.len() != 2 {
            return vec![];
        }
        let (inner_group, c_group) = (expr.children[0], expr.children[1]);

        let mut results = Vec::new();
        for inner in logical_exprs(memo, inner_group) {
            let Operator::Logical(LogicalOp::Join {
                join_type: JoinType::Inner,
                condition: inner_cond,
            }) = &inner.op
            else {
                continue;
            };
            if inner.children.len() != 2 || inner.children.contains(&inner_group) {
                continue;
            }
            let (a, b) = (inner.children[0], inner.children[1]);

            // A ⋈ (B ⋈ C), then B ⋈ (A ⋈ C).
            for (stay, moved) in [(a, b), (b, a)] {
                let Some(result) = try_reassociate(memo, outer_cond, inner_cond, stay, moved, c_group)
                else {
                    continue;
                };
                results.push(result);
            }
        }
        if !results.is_empty() {
            trace!(group = expr.group, alternatives = results.len(), "reassociated join");
        }
        results
    }
}

/// `(stay ⋈_inner moved) ⋈_outer c  →  stay ⋈ (moved ⋈ c)`.
///
/// `None` unless some outer conjunct links `moved` and `c` without touching `stay`.
fn try_reassociate(
    memo: &Memo,
    outer_cond: &Expr,
    inner_cond: &Expr,
    stay: GroupId,
    moved: GroupId,
    c: GroupId,
) -> Option<RuleResult> {
    let moved_schema = memo.group(moved).schema()?;
    let c_schema = memo.group(c).schema()?;
    let (new_inner_preds, remaining) = split_outer_condition(outer_cond, moved_schema, c_schema);
    if new_inner_preds.is_empty() {
        return None;
    }

    let mut outer_parts: Vec<Expr> = inner_cond.conjuncts().into_iter().cloned().collect();
    outer_parts.extend(remaining);

    Some(RuleResult::NewChildren(
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: make_conjunction(outer_parts),
        }),
        vec![
            RuleChild::Group(stay),
            RuleChild::NewExpr(
                Operator::Logical(LogicalOp::Join {
                    join_type: JoinType::Inner,
                    condition: make_conjunction(new_inner_preds),
                }),
                vec![RuleChild::Group(moved), RuleChild::Group(c)],
            ),
        ],
    ))
}

/// Split the outer condition into conjuncts that connect `moved` with `c` (and nothing
/// else) and the rest.
fn split_outer_condition(
    outer_cond: &Expr,
    moved: &Schema,
    c: &Schema,
) -> (Vec<Expr>, Vec<Expr>) {
    let moved_and_c = Schema::join(moved, c);
    let mut linking = Vec::new();
    let mut remaining = Vec::new();
    for pred in outer_cond.conjuncts() {
        let connects = pred.is_bound_by(&moved_and_c)
            && pred.columns().iter().any(|col| moved.contains(col))
            && pred.columns().iter().any(|col| c.contains(col));
        if connects {
            linking.push(pred.clone());
        } else if !pred.is_true_literal() {
            remaining.push(pred.clone());
        }
    }
    (linking, remaining)
}
