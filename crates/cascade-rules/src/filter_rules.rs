//! # Filter Simplification Rules
//!
//! - **`FilterIntoScanRule`**: `Filter(p, Scan(t, q))` → `Scan(t, q AND p)`. A scan
//!   evaluates its predicate while reading, so no separate filter pass is needed.
//! - **`MergeFiltersRule`**: `Filter(p, Filter(q, X))` → `Filter(p AND q, X)`.
//! - **`RemoveTrueFilterRule`**: `Filter(true, X)` is `X`; the two groups are merged.

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Conjunction of `a` and `b` without duplicate conjuncts or `true` literals.
pub(crate) fn conjoin(a: &Expr, b: &Expr) -> Expr {
    let mut parts: Vec<Expr> = Vec::new();
    for c in a.conjuncts().into_iter().chain(b.conjuncts()) {
        if !c.is_true_literal() && !parts.contains(c) {
            parts.push(c.clone());
        }
    }
    make_conjunction(parts)
}

pub struct FilterIntoScanRule;

impl Rule for FilterIntoScanRule {
    fn name(&self) -> &str {
        "FilterIntoScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_scan()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };

        logical_exprs(memo, child)
            .filter_map(|scan| match &scan.op {
                Operator::Logical(LogicalOp::Scan {
                    table,
                    columns,
                    predicate: existing,
                }) => {
                    let merged = match existing {
                        Some(q) => conjoin(q, predicate),
                        None => conjoin(&lit(ScalarValue::Bool(true)), predicate),
                    };
                    Some(RuleResult::Substitution(
                        Operator::Logical(LogicalOp::Scan {
                            table: table.clone(),
                            columns: columns.clone(),
                            predicate: Some(merged),
                        }),
                        vec![],
                    ))
                }
                _ => None,
            })
            .collect()
    }
}

pub struct MergeFiltersRule;

impl Rule for MergeFiltersRule {
    fn name(&self) -> &str {
        "MergeFilters"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_filter()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };

        logical_exprs(memo, child)
            .filter(|inner| !inner.children.contains(&child))
            .filter_map(|inner| match &inner.op {
                Operator::Logical(LogicalOp::Filter { predicate: q }) => {
                    Some(RuleResult::Substitution(
                        Operator::Logical(LogicalOp::Filter {
                            predicate: conjoin(predicate, q),
                        }),
                        inner.children.clone(),
                    ))
                }
                _ => None,
            })
            .collect()
    }
}

pub struct RemoveTrueFilterRule;

impl Rule for RemoveTrueFilterRule {
    fn name(&self) -> &str {
        "RemoveTrueFilter"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match (&expr.op, expr.children.first()) {
            (Operator::Logical(LogicalOp::Filter { predicate }), Some(&child))
                if predicate.is_true_literal() =>
            {
                vec![RuleResult::Equivalent(child)]
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::catalog::InMemoryCatalog;

    fn scan(predicate: Option<Expr>) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef::new("s", "t"),
            columns: vec![Field::new(Some("t"), "a", DataType::Int64, false)],
            predicate,
        })
    }

    fn filter(predicate: Expr) -> Operator {
        Operator::Logical(LogicalOp::Filter { predicate })
    }

    fn gt(v: i64) -> Expr {
        binary(col("t", "a"), BinaryOp::Gt, lit(ScalarValue::Int64(v)))
    }

    #[test]
    fn test_conjoin_drops_duplicates_and_true() {
        let merged = conjoin(&make_conjunction(vec![gt(1), lit(ScalarValue::Bool(true))]), &gt(1));
        assert_eq!(merged, gt(1));
        assert_eq!(conjoin(&gt(1), &gt(2)), make_conjunction(vec![gt(1), gt(2)]));
    }

    #[test]
    fn test_filter_into_scan() {
        let mut memo = Memo::new();
        let (s, _) = memo.add_expr(scan(Some(gt(1))), vec![]);
        let (_, f) = memo.add_expr(filter(gt(2)), vec![s]);
        let catalog = InMemoryCatalog::new();
        let results = FilterIntoScanRule.apply(memo.expr(f), &memo, &OptContext { catalog: &catalog });
        assert_eq!(results.len(), 1);
        match &results[0] {
            RuleResult::Substitution(op, children) => {
                assert_eq!(*op, scan(Some(make_conjunction(vec![gt(1), gt(2)]))));
                assert!(children.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_filters_and_remove_true() {
        let mut memo = Memo::new();
        let (s, _) = memo.add_expr(scan(None), vec![]);
        let (f1, _) = memo.add_expr(filter(gt(1)), vec![s]);
        let (_, f2) = memo.add_expr(filter(gt(2)), vec![f1]);
        let (_, t) = memo.add_expr(filter(lit(ScalarValue::Bool(true))), vec![s]);
        let catalog = InMemoryCatalog::new();
        let ctx = OptContext { catalog: &catalog };

        let merged = MergeFiltersRule.apply(memo.expr(f2), &memo, &ctx);
        assert!(matches!(
            &merged[0],
            RuleResult::Substitution(op, children)
                if *op == filter(make_conjunction(vec![gt(2), gt(1)])) && *children == vec![s]
        ));

        let removed = RemoveTrueFilterRule.apply(memo.expr(t), &memo, &ctx);
        assert!(matches!(removed[0], RuleResult::Equivalent(g) if g == s));
        assert!(RemoveTrueFilterRule.apply(memo.expr(f2), &memo, &ctx).is_empty());
    }
}
