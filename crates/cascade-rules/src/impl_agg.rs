//! # Aggregate Implementation Rules
//!
//! | rule                      | physical op       | input requirement                   |
//! |---------------------------|-------------------|-------------------------------------|
//! | `ImplHashAggregateRule`   | `HashAggregate`   | hash-partitioned on the keys        |
//! | `ImplStreamAggregateRule` | `StreamAggregate` | sorted on the keys, single stream   |
//!
//! A hash aggregate keeps one accumulator per group in memory, so its memory cost grows
//! with the number of groups. A stream aggregate only holds the current group but needs
//! ordered input; the search prices the Sort enforcer it may need, so the cheaper of
//! (sort + stream) and hash wins per group.
//!
//! Global aggregates (no GROUP BY) produce a single row and need no order, so only the
//! hash form is generated for them.

use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Re-emit a logical aggregate as the physical operator built by `make`.
fn implement(
    expr: &MemoExpr,
    make: impl FnOnce(&[Expr], &[AggExpr]) -> Option<PhysicalOp>,
) -> Vec<RuleResult> {
    let Operator::Logical(LogicalOp::Aggregate {
        group_by,
        aggregates,
    }) = &expr.op
    else {
        return vec![];
    };
    make(group_by, aggregates)
        .map(|op| RuleResult::Substitution(Operator::Physical(op), expr.children.clone()))
        .into_iter()
        .collect()
}

pub struct ImplHashAggregateRule;

impl Rule for ImplHashAggregateRule {
    fn name(&self) -> &str {
        "ImplHashAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        implement(expr, |group_by, aggregates| {
            Some(PhysicalOp::HashAggregate {
                group_by: group_by.to_vec(),
                aggregates: aggregates.to_vec(),
            })
        })
    }
}

/// Single-pass aggregation over input sorted on the group-by keys.
pub struct ImplStreamAggregateRule;

impl Rule for ImplStreamAggregateRule {
    fn name(&self) -> &str {
        "ImplStreamAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        implement(expr, |group_by, aggregates| {
            (!group_by.is_empty()).then(|| PhysicalOp::StreamAggregate {
                group_by: group_by.to_vec(),
                aggregates: aggregates.to_vec(),
            })
        })
    }
}
