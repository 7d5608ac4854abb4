//! # Predicate Pushdown Rule
//!
//! Moves a filter sitting on an inner or cross join into the join:
//!
//! ```text
//! Before: Filter(pred, Join(A, B, cond))
//! After:  Join(Filter(pred_A, A), Filter(pred_B, B), cond AND pred_AB)
//! ```
//!
//! Conjuncts that reference only one input are pushed below the join onto that input;
//! conjuncts spanning both inputs join the condition. A cross join that receives a
//! condition becomes an inner join.
//!
//! ## Memo-Based Approach
//!
//! The rewritten join is added to the filter's group as an equivalent alternative; the
//! original Filter-over-Join stays in the memo and the cost model picks between them.
//!
//! Outer, semi and anti joins are left alone: a WHERE predicate above an outer join does
//! not mean the same thing as the same predicate in its ON clause.

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{GroupId, Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

/// Push filter predicates into and below inner joins.
pub struct PredicatePushdownRule;

impl Rule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_join()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        let Some(&join_group) = expr.children.first() else {
            return vec![];
        };

        logical_exprs(memo, join_group)
            .filter_map(|join| {
                let Operator::Logical(LogicalOp::Join {
                    join_type,
                    condition,
                }) = &join.op
                else {
                    return None;
                };
                if !join_type.is_inner_like() || join.children.len() != 2 {
                    return None;
                }
                push_into_join(memo, predicate, condition, join.children[0], join.children[1])
            })
            .collect()
    }
}

fn push_into_join(
    memo: &Memo,
    predicate: &Expr,
    condition: &Expr,
    left: GroupId,
    right: GroupId,
) -> Option<RuleResult> {
    let left_schema = memo.group(left).schema()?;
    let right_schema = memo.group(right).schema()?;

    let mut left_preds = Vec::new();
    let mut right_preds = Vec::new();
    let mut join_preds: Vec<Expr> = condition
        .conjuncts()
        .into_iter()
        .filter(|c| !c.is_true_literal())
        .cloned()
        .collect();
    for pred in predicate.conjuncts() {
        if pred.columns().is_empty() {
            join_preds.push(pred.clone());
        } else if pred.is_bound_by(left_schema) {
            left_preds.push(pred.clone());
        } else if pred.is_bound_by(right_schema) {
            right_preds.push(pred.clone());
        } else {
            join_preds.push(pred.clone());
        }
    }

    let side = |group: GroupId, preds: Vec<Expr>| {
        if preds.is_empty() {
            RuleChild::Group(group)
        } else {
            RuleChild::NewExpr(
                Operator::Logical(LogicalOp::Filter {
                    predicate: make_conjunction(preds),
                }),
                vec![RuleChild::Group(group)],
            )
        }
    };
    let join_type = if join_preds.is_empty() {
        JoinType::Cross
    } else {
        JoinType::Inner
    };

    Some(RuleResult::NewChildren(
        Operator::Logical(LogicalOp::Join {
            join_type,
            condition: make_conjunction(join_preds),
        }),
        vec![side(left, left_preds), side(right, right_preds)],
    ))
}
