//! # Built-in Optimization Rules
//!
//! This crate provides the default set of optimization rules for the Cascades search
//! engine. Rules are divided into two categories:
//!
//! ## Transformation Rules (Logical -> Logical)
//!
//! These rules expand the search space by generating equivalent logical alternatives:
//!
//! - **`JoinCommutativityRule`**: Swaps the sides of inner and cross joins
//!   (A JOIN B -> B JOIN A).
//! - **`JoinAssociativityRule`**: Regroups inner joins
//!   ((A JOIN B) JOIN C -> A JOIN (B JOIN C)) without introducing cross products.
//! - **`PredicatePushdownRule`**: Pushes filter conjuncts below inner joins or into
//!   their conditions.
//! - **`FilterIntoScanRule`**, **`MergeFiltersRule`**, **`RemoveTrueFilterRule`**:
//!   filter simplification.
//! - **`ProjectionPushdownRule`**: Narrows the columns read by a scan under a projection.
//! - **`LimitZeroToEmptyRule`**, **`FalseFilterToEmptyRule`**, **`EmptyPropagationRule`**,
//!   **`EmptyJoinLeftRule`**, **`EmptyJoinRightRule`**: replace provably empty
//!   subtrees by an `EmptyRelation`.
//!
//! ## Implementation Rules (Logical -> Physical)
//!
//! These rules produce physical operator alternatives that the cost model scores:
//!
//! - **`ImplSeqScanRule`**, **`ImplIndexScanRule`**: full scan, and ordered scans through
//!   the table's indexes.
//! - **`ImplFilterRule`**, **`ImplProjectRule`**, **`ImplLimitRule`**,
//!   **`ImplEmptyRelationRule`**, **`ImplUnionRule`**: one-to-one implementations.
//! - **`ImplHashJoinRule`**: hash join, both build sides, partitioned or broadcast.
//! - **`ImplMergeJoinRule`**: merge join (inner equi-joins only).
//! - **`ImplNestedLoopJoinRule`**: nested loop join (universal fallback).
//! - **`ImplHashAggregateRule`**, **`ImplStreamAggregateRule`**: hash and sorted-stream
//!   aggregation.
//! - **`ImplSortRule`**: logical sort as a physical sort.

pub mod empty_relation;
pub mod filter_rules;
pub mod impl_agg;
pub mod impl_join;
pub mod impl_relational;
pub mod impl_scan;
pub mod impl_sort;
pub mod join_associativity;
pub mod join_commutativity;
pub mod predicate_pushdown;
pub mod projection_pushdown;

use cascade_core::memo::{GroupId, Memo, MemoExpr};
use cascade_core::rule::RuleRegistry;

/// Logical members of `group`. Rules whose pattern reaches into a child group use this
/// to find the member that matched.
pub(crate) fn logical_exprs<'a>(
    memo: &'a Memo,
    group: GroupId,
) -> impl Iterator<Item = &'a MemoExpr> + 'a {
    memo.group(group)
        .logical_exprs
        .iter()
        .map(move |&e| memo.expr(e))
}

/// Create a default rule registry with all built-in rules.
///
/// This is the standard configuration for the optimizer. Connector-specific rules
/// can be added to the returned registry via `add_source_rule_set()`.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    // Transformation rules: expand the logical search space.
    registry.add_rule(Box::new(join_commutativity::JoinCommutativityRule));
    registry.add_rule(Box::new(join_associativity::JoinAssociativityRule));
    registry.add_rule(Box::new(predicate_pushdown::PredicatePushdownRule));
    registry.add_rule(Box::new(filter_rules::FilterIntoScanRule));
    registry.add_rule(Box::new(filter_rules::MergeFiltersRule));
    registry.add_rule(Box::new(filter_rules::RemoveTrueFilterRule));
    registry.add_rule(Box::new(projection_pushdown::ProjectionPushdownRule));
    registry.add_rule(Box::new(empty_relation::LimitZeroToEmptyRule));
    registry.add_rule(Box::new(empty_relation::FalseFilterToEmptyRule));
    registry.add_rule(Box::new(empty_relation::EmptyPropagationRule));
    registry.add_rule(Box::new(empty_relation::EmptyJoinLeftRule));
    registry.add_rule(Box::new(empty_relation::EmptyJoinRightRule));

    // Implementation rules: map logical operators to physical alternatives.
    registry.add_rule(Box::new(impl_scan::ImplSeqScanRule));
    registry.add_rule(Box::new(impl_scan::ImplIndexScanRule));
    registry.add_rule(Box::new(impl_relational::ImplFilterRule));
    registry.add_rule(Box::new(impl_relational::ImplProjectRule));
    registry.add_rule(Box::new(impl_relational::ImplLimitRule));
    registry.add_rule(Box::new(impl_relational::ImplEmptyRelationRule));
    registry.add_rule(Box::new(impl_relational::ImplUnionRule));
    registry.add_rule(Box::new(impl_join::ImplHashJoinRule));
    registry.add_rule(Box::new(impl_join::ImplMergeJoinRule));
    registry.add_rule(Box::new(impl_join::ImplNestedLoopJoinRule));
    registry.add_rule(Box::new(impl_agg::ImplHashAggregateRule));
    registry.add_rule(Box::new(impl_agg::ImplStreamAggregateRule));
    registry.add_rule(Box::new(impl_sort::ImplSortRule));

    registry
}
