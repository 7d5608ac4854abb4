//! Properties every optimization must keep, checked end to end with the built-in rules:
//! memo insertion and merging, cost monotonicity, enforcer reflexivity, budget safety,
//! and the small scenarios the optimizer is expected to get exactly right.

use cascade_core::catalog::{InMemoryCatalog, TableIndex};
use cascade_core::cost::DefaultCostModel;
use cascade_core::ddl::{AlterCatalogName, DdlError, Privilege};
use cascade_core::enforcer::enforce;
use cascade_core::expr::*;
use cascade_core::memo::Memo;
use cascade_core::plan::{LogicalPlan, PhysicalPlan};
use cascade_core::properties::PhysicalPropertySet;
use cascade_core::rule::{Rule, RuleRegistry};
use cascade_core::search::{BudgetReason, CascadesSearch, SearchConfig};
use cascade_core::stats::{ColumnStatistics, Statistics};
use cascade_rules::impl_relational::ImplFilterRule;
use cascade_rules::impl_scan::ImplSeqScanRule;
use std::sync::Arc;

fn fields(table: &str) -> Vec<Field> {
    vec![
        Field::new(Some(table), "a", DataType::Int64, false),
        Field::new(Some(table), "b", DataType::Utf8, true),
    ]
}

fn table(name: &str) -> TableRef {
    TableRef::new("s", name)
}

/// `t` and `u`, 10,000 rows each, 100 distinct values in `a`.
fn catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for name in ["t", "u"] {
        catalog.add_table(
            &table(name),
            fields(name),
            Statistics::new(10_000.0, 400_000.0)
                .with_column("a", ColumnStatistics::new(100.0, 0.0))
                .with_column("b", ColumnStatistics::new(5_000.0, 0.1)),
        );
    }
    catalog
}

fn scan(name: &str) -> LogicalPlan {
    LogicalPlan::scan(table(name), fields(name)).unwrap()
}

fn a_equals(name: &str, v: i64) -> Expr {
    binary(col(name, "a"), BinaryOp::Eq, lit(ScalarValue::Int64(v)))
}

fn search_with(
    memo: Memo,
    registry: RuleRegistry,
    catalog: InMemoryCatalog,
    config: SearchConfig,
) -> CascadesSearch {
    CascadesSearch::new(
        memo,
        Arc::new(registry),
        Arc::new(DefaultCostModel::default()),
        Arc::new(catalog),
        config,
    )
}

fn default_search(catalog: InMemoryCatalog) -> CascadesSearch {
    search_with(
        Memo::new(),
        cascade_rules::default_rule_registry(),
        catalog,
        SearchConfig::default(),
    )
}

fn assert_cost_monotonic(plan: &PhysicalPlan) {
    for node in plan.nodes() {
        let children: f64 = node.children.iter().map(|c| c.cost.total).sum();
        assert!(
            node.cost.total >= children,
            "{} costs {} but its inputs cost {}",
            node.op,
            node.cost.total,
            children
        );
    }
}

/// Every operator that reads its inputs by position gets them in its own column order.
fn assert_inputs_aligned(plan: &PhysicalPlan) {
    let shape = |schema: &Schema| -> Vec<(String, DataType)> {
        schema
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.data_type))
            .collect()
    };
    for node in plan.nodes() {
        let positional = matches!(
            node.op.kind(),
            PhysicalOpKind::UnionAll
                | PhysicalOpKind::Limit
                | PhysicalOpKind::SortOp
                | PhysicalOpKind::Filter
                | PhysicalOpKind::Exchange
        );
        if !positional {
            continue;
        }
        for child in &node.children {
            assert_eq!(
                shape(&child.schema),
                shape(&node.schema),
                "input of {} delivers columns out of order",
                node.op
            );
        }
    }
}

/// `a` and `b` hold a million rows each, `c` ten; `a.ax = c.cx` keeps almost nothing.
fn skewed_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for (name, rows, key_ndv, x_ndv) in [
        ("a", 1_000_000.0, 1_000_000.0, 1_000_000.0),
        ("b", 1_000_000.0, 1_000_000.0, 1_000_000.0),
        ("c", 10.0, 10.0, 10.0),
    ] {
        let (k, x) = (format!("{}k", name), format!("{}x", name));
        catalog.add_table(
            &table(name),
            skewed_fields(name),
            Statistics::new(rows, rows * 16.0)
                .with_column(&k, ColumnStatistics::new(key_ndv, 0.0))
                .with_column(&x, ColumnStatistics::new(x_ndv, 0.0)),
        );
    }
    catalog
}

fn skewed_fields(name: &str) -> Vec<Field> {
    vec![
        Field::new(Some(name), format!("{}k", name), DataType::Int64, false),
        Field::new(Some(name), format!("{}x", name), DataType::Int64, false),
    ]
}

/// `(a ⋈ b) ⋈ c`, written in the order that is worst for these statistics.
fn three_way_join() -> LogicalPlan {
    let scan = |name: &str| LogicalPlan::scan(table(name), skewed_fields(name)).unwrap();
    scan("a")
        .join(scan("b"), JoinType::Inner, binary(col("a", "ak"), BinaryOp::Eq, col("b", "bk")))
        .unwrap()
        .join(scan("c"), JoinType::Inner, binary(col("a", "ax"), BinaryOp::Eq, col("c", "cx")))
        .unwrap()
}

fn join_query() -> LogicalPlan {
    scan("t")
        .filter(a_equals("t", 5))
        .unwrap()
        .join(scan("u"), JoinType::Inner, binary(col("t", "a"), BinaryOp::Eq, col("u", "a")))
        .unwrap()
        .project(vec![col("t", "b"), col("u", "b")], vec!["tb".into(), "ub".into()])
        .unwrap()
}

#[test]
fn test_insertion_is_idempotent() {
    let plan = join_query();
    let mut memo = Memo::new();
    let first = memo.insert_plan(&plan).unwrap();
    let (groups, exprs) = (memo.num_groups(), memo.num_exprs());

    let second = memo.insert_plan(&plan).unwrap();
    assert_eq!(first, second);
    assert_eq!(memo.num_groups(), groups);
    assert_eq!(memo.num_exprs(), exprs);
}

#[test]
fn test_true_filter_merges_with_its_input() {
    let plan = scan("t").filter(lit(ScalarValue::Bool(true))).unwrap();
    let mut memo = Memo::new();
    let root = memo.insert_plan(&plan).unwrap();
    let input = memo.insert_plan(&scan("t")).unwrap();
    assert_ne!(root, input);

    let mut search = search_with(
        memo,
        cascade_rules::default_rule_registry(),
        catalog(),
        SearchConfig::default(),
    );
    let result = search.optimize(root, &PhysicalPropertySet::any()).unwrap();

    assert_eq!(search.memo.resolve(root), search.memo.resolve(input));
    assert!(search.memo.num_merges() >= 1);
    assert_eq!(result.plan.count(PhysicalOpKind::Filter), 0);
    assert_eq!(result.plan.row_count, 10_000.0);
}

#[test]
fn test_cost_is_monotonic_in_extracted_plans() {
    let mut search = default_search(catalog());
    let required = PhysicalPropertySet::with_sort(vec![SortKey::asc(Expr::Column(
        ColumnRef::unqualified("tb"),
    ))]);
    let result = search.optimize_plan(&join_query(), &required).unwrap();

    println!("{}", result.plan);
    assert_cost_monotonic(&result.plan);
    assert_inputs_aligned(&result.plan);
    assert!(required.satisfied_by(&result.plan.provided));
}

#[test]
fn test_enforce_is_identity_on_satisfied_plans() {
    let mut search = default_search(catalog());
    let result = search
        .optimize_plan(&join_query(), &PhysicalPropertySet::any())
        .unwrap();
    let model = DefaultCostModel::default();

    let provided = result.plan.provided.clone();
    assert_eq!(enforce(result.plan.clone(), &provided, &model), result.plan);
    assert_eq!(
        enforce(result.plan.clone(), &PhysicalPropertySet::any(), &model),
        result.plan
    );
}

#[test]
fn test_zero_budget_still_yields_an_executable_plan() {
    let config = SearchConfig {
        max_iterations: 0,
        ..Default::default()
    };
    let mut search = search_with(
        Memo::new(),
        cascade_rules::default_rule_registry(),
        catalog(),
        config,
    );
    let result = search
        .optimize_plan(&join_query(), &PhysicalPropertySet::any())
        .unwrap();

    let exceeded = result.budget_exceeded.expect("budget should be reported");
    assert_eq!(exceeded.reason, BudgetReason::Iterations);
    assert_eq!(
        result.plan.count(PhysicalOpKind::HashJoin)
            + result.plan.count(PhysicalOpKind::MergeJoin)
            + result.plan.count(PhysicalOpKind::NestedLoopJoin),
        1
    );
    assert_eq!(result.plan.count(PhysicalOpKind::SeqScan) + result.plan.count(PhysicalOpKind::IndexScan), 2);
    assert!(result.cost.total.is_finite());
    assert_cost_monotonic(&result.plan);
}

#[test]
fn test_filter_cardinality_with_minimal_rules() {
    let mut registry = RuleRegistry::new();
    let rules: Vec<Box<dyn Rule>> = vec![Box::new(ImplSeqScanRule), Box::new(ImplFilterRule)];
    for rule in rules {
        registry.add_rule(rule);
    }

    let plan = scan("t").filter(a_equals("t", 5)).unwrap();
    let mut memo = Memo::new();
    let root = memo.insert_plan(&plan).unwrap();
    let mut search = search_with(memo, registry, catalog(), SearchConfig::default());
    let result = search.optimize(root, &PhysicalPropertySet::any()).unwrap();

    // 10,000 rows * 1/NDV(a)
    assert!((result.plan.row_count - 100.0).abs() < 1e-9);
    assert!(matches!(result.plan.op, PhysicalOp::Filter { .. }));
    assert_eq!(result.plan.children[0].op.kind(), PhysicalOpKind::SeqScan);
    assert_eq!(search.memo.group(root).physical_exprs.len(), 1);
}

#[test]
fn test_limit_zero_becomes_empty_relation() {
    let plan = scan("t")
        .filter(a_equals("t", 5))
        .unwrap()
        .limit(0, 0)
        .unwrap();
    let expected = plan.schema().clone();

    let mut search = default_search(catalog());
    let result = search
        .optimize_plan(&plan, &PhysicalPropertySet::any())
        .unwrap();

    match &result.plan.op {
        PhysicalOp::EmptyRelation { projects } => assert_eq!(projects, &expected.fields),
        other => panic!("expected an empty relation, got {}", other),
    }
    assert_eq!(result.plan.schema, expected);
    assert_eq!(result.plan.row_count, 0.0);
}

#[test]
fn test_index_order_needs_no_sort() {
    let mut catalog = catalog();
    catalog.add_index(&table("t"), TableIndex::new("t_a", &["a"]));
    let required = PhysicalPropertySet::with_sort(vec![SortKey::asc(col("t", "a"))]);

    let mut search = default_search(catalog);
    let result = search.optimize_plan(&scan("t"), &required).unwrap();

    assert_eq!(result.plan.count(PhysicalOpKind::SortOp), 0);
    assert_eq!(result.plan.op.kind(), PhysicalOpKind::IndexScan);
    assert!(required.satisfied_by(&result.plan.provided));
}

#[test]
fn test_missing_order_adds_one_sort() {
    let required = PhysicalPropertySet::with_sort(vec![SortKey::asc(col("t", "b"))]);

    let mut search = default_search(catalog());
    let result = search.optimize_plan(&scan("t"), &required).unwrap();

    assert_eq!(result.plan.count(PhysicalOpKind::SortOp), 1);
    assert_eq!(result.plan.op.kind(), PhysicalOpKind::SortOp);
    let input = &result.plan.children[0];
    assert!(result.cost > input.cost);
    assert!(!required.satisfied_by(&input.provided));
}

#[test]
fn test_distinct_union_deduplicates_with_hash_aggregate() {
    let plan = LogicalPlan::union(vec![scan("t"), scan("u")], false).unwrap();
    let mut search = default_search(catalog());
    let result = search
        .optimize_plan(&plan, &PhysicalPropertySet::any())
        .unwrap();

    assert_eq!(result.plan.count(PhysicalOpKind::UnionAll), 1);
    assert_eq!(result.plan.count(PhysicalOpKind::HashAggregate), 1);
    assert_eq!(result.plan.schema.len(), 2);
    assert_inputs_aligned(&result.plan);
}

#[test]
fn test_union_inputs_keep_column_order_after_join_reordering() {
    let plan = LogicalPlan::union(vec![three_way_join(), three_way_join()], true).unwrap();
    let expected = plan.schema().clone();

    let mut search = default_search(skewed_catalog());
    let result = search
        .optimize_plan(&plan, &PhysicalPropertySet::any())
        .unwrap();

    println!("{}", result.plan);
    assert_eq!(result.plan.schema, expected);
    let union = result
        .plan
        .nodes()
        .into_iter()
        .find(|n| n.op.kind() == PhysicalOpKind::UnionAll)
        .expect("union survives optimization");
    for input in &union.children {
        let names: Vec<&str> = input.schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["ak", "ax", "bk", "bx", "ck", "cx"]);
    }
    // Joining the small table first reorders the join inputs.
    assert!(result.plan.count(PhysicalOpKind::Project) >= 1);
    assert_inputs_aligned(&result.plan);
    assert_cost_monotonic(&result.plan);
}

#[test]
fn test_limited_union_inputs_keep_column_order() {
    let limited = || three_way_join().limit(0, 5).unwrap();
    let plan = LogicalPlan::union(vec![limited(), three_way_join()], true).unwrap();

    let mut search = default_search(skewed_catalog());
    let result = search
        .optimize_plan(&plan, &PhysicalPropertySet::any())
        .unwrap();

    assert_eq!(&result.plan.schema, plan.schema());
    assert_inputs_aligned(&result.plan);
}

#[test]
fn test_unbounded_limit_is_costed_like_its_input() {
    let plan = scan("t").limit(1, u64::MAX).unwrap();
    let mut search = default_search(catalog());
    let result = search
        .optimize_plan(&plan, &PhysicalPropertySet::any())
        .unwrap();

    assert_eq!(result.plan.op.kind(), PhysicalOpKind::Limit);
    assert!(result.cost.total.is_finite());
    assert!(result.plan.row_count > 9_000.0);
    assert_cost_monotonic(&result.plan);
}

#[test]
fn test_unknown_table_uses_default_statistics() {
    let mut search = default_search(InMemoryCatalog::new());
    let result = search
        .optimize_plan(&scan("t"), &PhysicalPropertySet::any())
        .unwrap();
    assert!(result.plan.row_count > 0.0);
    assert!(result.cost.total.is_finite());
}

fn allow_all(_: &str, _: &str, _: Privilege) -> bool {
    true
}

#[test]
fn test_catalog_rename_never_reaches_the_optimizer() {
    assert_eq!(
        AlterCatalogName::new("internal", "foo").analyze("admin", &allow_all),
        Err(DdlError::InternalCatalogImmutable)
    );
    assert_eq!(
        AlterCatalogName::new("c1", "internal").analyze("admin", &allow_all),
        Err(DdlError::ReservedName)
    );
    assert_eq!(AlterCatalogName::new("c1", "c2").analyze("admin", &allow_all), Ok(()));
}
