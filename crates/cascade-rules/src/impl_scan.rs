//! # Scan Implementation Rules
//!
//! ## Sequential Scan
//!
//! Reads every row of the table and evaluates any pushed-down predicate. Always
//! applicable. The output carries the table's native distribution as reported by the
//! catalog; a table with no known distribution is read as a single stream.
//!
//! ## Index Scan
//!
//! Reads the table through one of its ordered indexes, producing rows sorted on the
//! index columns. One alternative per index whose columns are all read by the scan.
//! The order is what lets a parent (a Sort, a merge join, a stream aggregate) skip an
//! explicit sort: the enforcer is only added when no child alternative already delivers
//! the required order.
//!
//! Index access costs more per row than a sequential read (see the cost model), so an
//! index scan only wins when its order is worth something to the plan above it.

use cascade_core::catalog::Catalog;
use cascade_core::expr::*;
use cascade_core::memo::{Memo, MemoExpr};
use cascade_core::pattern::Pattern;
use cascade_core::rule::{OptContext, Rule, RuleResult, RuleType};

fn table_distribution(catalog: &dyn Catalog, table: &TableRef) -> Distribution {
    catalog
        .get_table_distribution(table)
        .unwrap_or(Distribution::Single)
}

/// Implement logical scan as a sequential (full) table scan.
pub struct ImplSeqScanRule;

impl Rule for ImplSeqScanRule {
    fn name(&self) -> &str {
        "ImplSeqScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::scan()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Scan {
            table,
            columns,
            predicate,
        }) = &expr.op
        else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SeqScan {
                table: table.clone(),
                columns: columns.clone(),
                predicate: predicate.clone(),
                distribution: table_distribution(ctx.catalog, table),
            }),
            vec![],
        )]
    }
}

/// Implement logical scan through each usable index of the table.
pub struct ImplIndexScanRule;

impl Rule for ImplIndexScanRule {
    fn name(&self) -> &str {
        "ImplIndexScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::scan()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Scan {
            table,
            columns,
            predicate,
        }) = &expr.op
        else {
            return vec![];
        };

        let distribution = table_distribution(ctx.catalog, table);
        ctx.catalog
            .get_table_indexes(table)
            .into_iter()
            .filter_map(|index| {
                let order: Option<Vec<SortKey>> = index
                    .columns
                    .iter()
                    .map(|name| {
                        columns
                            .iter()
                            .find(|f| &f.name == name)
                            .map(|f| SortKey::asc(Expr::Column(f.column_ref())))
                    })
                    .collect();
                let order = order.filter(|o| !o.is_empty())?;
                Some(RuleResult::Substitution(
                    Operator::Physical(PhysicalOp::IndexScan {
                        table: table.clone(),
                        index: index.name,
                        columns: columns.clone(),
                        predicate: predicate.clone(),
                        order,
                        distribution: distribution.clone(),
                    }),
                    vec![],
                ))
            })
            .collect()
    }
}
