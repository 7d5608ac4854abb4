//! # Join Implementation Rules
//!
//! This module provides three implementation rules that map a logical Join to
//! physical join operators. Each physical join has different cost characteristics
//! and applicability constraints:
//!
//! ## Hash Join (`ImplHashJoinRule`)
//!
//! The workhorse join algorithm for most queries. Builds a hash table on one side
//! (the "build side") and probes it with rows from the other side. Alternatives are
//! produced for both build sides and both ways of co-locating matching rows:
//!
//! - **Partitioned**: both inputs hash-partitioned on the join key.
//! - **Broadcast**: the build side replicated to every worker, the probe side left where
//!   it is. Not offered when the build side is an outer join's preserved side, since
//!   each worker would emit the unmatched preserved rows again.
//!
//! **Requires**: at least one equi-join key between the two inputs (e.g., `A.id = B.id`).
//! **Cost**: O(build_rows) memory + O(build_rows + probe_rows) CPU.
//!
//! ## Merge Join (`ImplMergeJoinRule`)
//!
//! Merges two pre-sorted streams by advancing pointers. Very efficient when both
//! inputs are already sorted (an index scan on the key, a preceding sort); otherwise
//! the search adds sort enforcers on both inputs and the merge join rarely beats a hash
//! join.
//!
//! **Requires**: inner join with equi-join keys.
//! **Cost**: O(left_rows + right_rows) CPU, minimal memory.
//!
//! ## Nested Loop Join (`ImplNestedLoopJoinRule`)
//!
//! The universal fallback: for each left row, scans all right rows. Always
//! applicable (works with any join condition, including non-equi predicates and
//! cross joins), but O(n * m) makes it prohibitively expensive for large inputs.
//!
//! **Requires**: nothing (always applicable).
//! **Cost**: O(left_rows * right_rows) CPU.

use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Whether the join condition has at least one `left = right` key pair.
fn has_equi_keys(memo: &Memo, expr: &MemoExpr, condition: &Expr) -> bool {
    let [left, right] = expr.children.as_slice() else {
        return false;
    };
    match (memo.group(*left).schema(), memo.group(*right).schema()) {
        (Some(l), Some(r)) => !equi_join_keys(condition, l, r).is_empty(),
        _ => false,
    }
}

/// Whether `side` may be replicated to every worker for this join type.
fn can_broadcast(join_type: JoinType, side: BuildSide) -> bool {
    match side {
        BuildSide::Left => matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::Right),
        BuildSide::Right => !matches!(join_type, JoinType::Right | JoinType::Full),
    }
}

/// Implement logical join as a hash join.
pub struct ImplHashJoinRule;

impl Rule for ImplHashJoinRule {
    fn name(&self) -> &str {
        "ImplHashJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
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
        if !has_equi_keys(memo, expr, condition) {
            return vec![];
        }

        let mut results = Vec::new();
        for build_side in [BuildSide::Right, BuildSide::Left] {
            for distribution in [JoinDistribution::Partitioned, JoinDistribution::Broadcast] {
                if distribution == JoinDistribution::Broadcast
                    && !can_broadcast(*join_type, build_side)
                {
                    continue;
                }
                results.push(RuleResult::Substitution(
                    Operator::Physical(PhysicalOp::HashJoin {
                        join_type: *join_type,
                        build_side,
                        distribution,
                        condition: condition.clone(),
                    }),
                    expr.children.clone(),
                ));
            }
        }
        results
    }
}

/// Implement logical join as a merge join (requires sorted input).
///
/// Only fires for inner joins with equi-join keys. The search derives sort requirements
/// on the keys for both children.
pub struct ImplMergeJoinRule;

impl Rule for ImplMergeJoinRule {
    fn name(&self) -> &str {
        "ImplMergeJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };
        if !has_equi_keys(memo, expr, condition) {
            return vec![];
        }

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::MergeJoin {
                join_type: JoinType::Inner,
                condition: condition.clone(),
            }),
            expr.children.clone(),
        )]
    }
}

/// Implement logical join as a nested loop join (universal fallback).
pub struct ImplNestedLoopJoinRule;

impl Rule for ImplNestedLoopJoinRule {
    fn name(&self) -> &str {
        "ImplNestedLoopJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::NestedLoopJoin {
                join_type: *join_type,
                condition: condition.clone(),
            }),
            expr.children.clone(),
        )]
    }
}
