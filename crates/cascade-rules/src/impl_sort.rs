//! # Sort Implementation Rule
//!
//! Maps a logical Sort (an ORDER BY) to a physical SortOp over the same input.
//!
//! ## Sort as an Enforcer
//!
//! A SortOp is also the ordering enforcer: when a parent requires an order that no
//! alternative of the child group delivers, the search adds a SortOp to that group
//! directly, without a logical Sort being present. This rule only covers the explicit
//! case. Since the search compares the SortOp produced here against the child's own
//! alternatives, an ORDER BY over an index scan on the sort key ends up with no sort at
//! all.
//!
//! ## Cost
//!
//! O(n log n) CPU and O(n) memory for n input rows, and the input must first be
//! gathered into a single stream.

use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Implement logical sort as a physical sort operator.
pub struct ImplSortRule;

impl Rule for ImplSortRule {
    fn name(&self) -> &str {
        "ImplSort"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::sort()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Sort { order }) = &expr.op else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SortOp {
                order: order.clone(),
            }),
            expr.children.clone(),
        )]
    }
}
