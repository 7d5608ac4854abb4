//! # Join Commutativity Rule
//!
//! `A JOIN B = B JOIN A` for the symmetric join types (inner and cross).
//!
//! ## Why Commutativity Matters
//!
//! - **Hash join build side**: the smaller input should be built into the hash table.
//!   Swapping the inputs lets the cost model consider both orientations under every
//!   implementation, not only hash joins that can pick their build side.
//! - **Join reordering**: together with associativity, commutativity reaches every join
//!   order of a multi-table query.
//!
//! ## Applicability
//!
//! Left, right, full, semi and anti joins have fixed left/right semantics and are left
//! alone.
//!
//! ## Column Order
//!
//! `B JOIN A` produces the same columns as `A JOIN B` in a different order. Groups compare
//! their columns as a set, so both live in the same group; the search restores the
//! requested column order at the root.

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Join commutativity: A JOIN B -> B JOIN A.
pub struct JoinCommutativityRule;

impl Rule for JoinCommutativityRule {
    fn name(&self) -> &str {
        "JoinCommutativity"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };

        if !join_type.is_inner_like() || expr.children.len() != 2 {
            return vec![];
        }

        let swapped = Operator::Logical(LogicalOp::Join {
            join_type: *join_type,
            condition: swap_condition_sides(condition),
        });
        let children = vec![expr.children[1], expr.children[0]];

        // Already present (e.g. the swap of a swap).
        if logical_exprs(memo, expr.group).any(|e| e.op == swapped && e.children == children) {
            return vec![];
        }
        vec![RuleResult::Substitution(swapped, children)]
    }
}

/// Mirror every comparison so that the former right side reads first: `a.x = b.y` becomes
/// `b.y = a.x`, `a.x < b.y` becomes `b.y > a.x`.
pub(crate) fn swap_condition_sides(expr: &Expr) -> Expr {
    match expr {
        Expr::BinaryOp { op, left, right } if op.is_comparison() => Expr::BinaryOp {
            op: op.commute(),
            left: right.clone(),
            right: left.clone(),
        },
        Expr::And(conjuncts) => Expr::And(conjuncts.iter().map(swap_condition_sides).collect()),
        other => other.clone(),
    }
}
