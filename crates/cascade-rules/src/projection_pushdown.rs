//! # Projection Pushdown Rule
//!
//! Column pruning: when a Project over a Scan references only some of the scanned
//! columns, the scan under the projection is replaced by one that reads just those.
//!
//! ```text
//! Before: Project([a.x], Scan(a, [x, y, z]))
//! After:  Project([a.x], Scan(a, [x]))
//! ```
//!
//! - **Less I/O**: columnar formats (ORC, Parquet) skip unread columns entirely.
//! - **Less memory and network**: narrower rows flow through the rest of the plan.
//!
//! Columns used by the scan's own predicate are kept. Only Project directly over Scan is
//! handled.

use crate::logical_exprs;
use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

pub struct ProjectionPushdownRule;

impl Rule for ProjectionPushdownRule {
    fn name(&self) -> &str {
        "ProjectionPushdown"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project_scan()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Project { exprs, aliases }) = &expr.op else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };

        let mut results = Vec::new();
        for scan in logical_exprs(memo, child) {
            let Operator::Logical(LogicalOp::Scan {
                table,
                columns,
                predicate,
            }) = &scan.op
            else {
                continue;
            };

            let mut needed: Vec<&ColumnRef> = exprs.iter().flat_map(|e| e.columns()).collect();
            if let Some(p) = predicate {
                needed.extend(p.columns());
            }
            let narrowed: Vec<Field> = columns
                .iter()
                .filter(|f| needed.iter().any(|c| f.matches(c)))
                .cloned()
                .collect();
            // Nothing to prune, or a projection of constants only.
            if narrowed.is_empty() || narrowed.len() == columns.len() {
                continue;
            }

            results.push(RuleResult::NewChildren(
                Operator::Logical(LogicalOp::Project {
                    exprs: exprs.clone(),
                    aliases: aliases.clone(),
                }),
                vec![RuleChild::NewExpr(
                    Operator::Logical(LogicalOp::Scan {
                        table: table.clone(),
                        columns: narrowed,
                        predicate: predicate.clone(),
                    }),
                    vec![],
                )],
            ));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::catalog::InMemoryCatalog;

    fn field(name: &str) -> Field {
        Field::new(Some("t"), name, DataType::Int64, false)
    }

    fn project_over_scan(predicate: Option<Expr>) -> (Memo, u32) {
        let mut memo = Memo::new();
        let (s, _) = memo.add_expr(
            Operator::Logical(LogicalOp::Scan {
                table: TableRef::new("s", "t"),
                columns: vec![field("x"), field("y"), field("z")],
                predicate,
            }),
            vec![],
        );
        let (_, p) = memo.add_expr(
            Operator::Logical(LogicalOp::Project {
                exprs: vec![col("t", "x")],
                aliases: vec!["x".into()],
            }),
            vec![s],
        );
        (memo, p)
    }

    fn narrowed_columns(result: &RuleResult) -> Vec<String> {
        match result {
            RuleResult::NewChildren(_, children) => match &children[0] {
                RuleChild::NewExpr(Operator::Logical(LogicalOp::Scan { columns, .. }), _) => {
                    columns.iter().map(|f| f.name.clone()).collect()
                }
                other => panic!("unexpected child {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_scan_is_narrowed_to_referenced_columns() {
        let (memo, p) = project_over_scan(None);
        let catalog = InMemoryCatalog::new();
        let results = ProjectionPushdownRule.apply(memo.expr(p), &memo, &OptContext { catalog: &catalog });
        assert_eq!(results.len(), 1);
        assert_eq!(narrowed_columns(&results[0]), vec!["x"]);
    }

    #[test]
    fn test_predicate_columns_are_kept() {
        let pred = binary(col("t", "z"), BinaryOp::Gt, lit(ScalarValue::Int64(0)));
        let (memo, p) = project_over_scan(Some(pred));
        let catalog = InMemoryCatalog::new();
        let results = ProjectionPushdownRule.apply(memo.expr(p), &memo, &OptContext { catalog: &catalog });
        assert_eq!(narrowed_columns(&results[0]), vec!["x", "z"]);
    }
}
