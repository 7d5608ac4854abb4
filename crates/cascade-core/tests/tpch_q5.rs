//! End-to-end test: TPC-H Q5 optimization.
//!
//! Builds TPC-H Q5 over an SF=1 catalog, runs the Cascades optimizer, and checks that
//! exploring join orders never does worse than the order the query was written in.

use cascade_core::catalog::InMemoryCatalog;
use cascade_core::cost::DefaultCostModel;
use cascade_core::expr::*;
use cascade_core::memo::{GroupId, Memo};
use cascade_core::plan::{LogicalPlan, PhysicalPlan};
use cascade_core::properties::PhysicalPropertySet;
use cascade_core::rule::{Rule, RuleRegistry};
use cascade_core::search::{CascadesSearch, OptimizedPlan, SearchConfig};
use cascade_core::stats::{ColumnStatistics, Statistics};
use cascade_rules::impl_join::{ImplHashJoinRule, ImplMergeJoinRule, ImplNestedLoopJoinRule};
use cascade_rules::impl_scan::ImplSeqScanRule;
use std::sync::Arc;

fn field(table: &str, name: &str, data_type: DataType) -> Field {
    Field::new(Some(table), name, data_type, false)
}

/// `(table, rows, [(column, type, ndv)])` for the six Q5 tables at SF=1.
fn tpch_tables() -> Vec<(&'static str, f64, Vec<(&'static str, DataType, f64)>)> {
    use DataType::*;
    vec![
        ("region", 5.0, vec![("r_regionkey", Int64, 5.0), ("r_name", Utf8, 5.0)]),
        (
            "nation",
            25.0,
            vec![("n_nationkey", Int64, 25.0), ("n_regionkey", Int64, 5.0), ("n_name", Utf8, 25.0)],
        ),
        (
            "supplier",
            10_000.0,
            vec![("s_suppkey", Int64, 10_000.0), ("s_nationkey", Int64, 25.0)],
        ),
        (
            "customer",
            150_000.0,
            vec![("c_custkey", Int64, 150_000.0), ("c_nationkey", Int64, 25.0)],
        ),
        (
            "orders",
            1_500_000.0,
            vec![
                ("o_orderkey", Int64, 1_500_000.0),
                ("o_custkey", Int64, 100_000.0),
                ("o_orderdate", Date, 2_406.0),
            ],
        ),
        (
            "lineitem",
            6_001_215.0,
            vec![
                ("l_orderkey", Int64, 1_500_000.0),
                ("l_suppkey", Int64, 10_000.0),
                ("l_extendedprice", Float64, 1_000_000.0),
            ],
        ),
    ]
}

fn columns(table: &str) -> Vec<Field> {
    tpch_tables()
        .into_iter()
        .find(|(name, _, _)| *name == table)
        .map(|(name, _, cols)| cols.into_iter().map(|(c, t, _)| field(name, c, t)).collect())
        .unwrap_or_default()
}

/// TPC-H SF=1 catalog with statistics.
fn build_tpch_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for (name, rows, cols) in tpch_tables() {
        let mut stats = Statistics::new(rows, rows * 16.0 * cols.len() as f64);
        for (c, _, ndv) in &cols {
            stats = stats.with_column(*c, ColumnStatistics::new(*ndv, 0.0));
        }
        catalog.add_table(&TableRef::new("tpch", name), columns(name), stats);
    }
    catalog
}

fn scan(name: &str) -> Operator {
    Operator::Logical(LogicalOp::Scan {
        table: TableRef::new("tpch", name),
        columns: columns(name),
        predicate: None,
    })
}

fn join(condition: Expr) -> Operator {
    Operator::Logical(LogicalOp::Join {
        join_type: JoinType::Inner,
        condition,
    })
}

fn equi(lt: &str, lc: &str, rt: &str, rc: &str) -> Expr {
    binary(col(lt, lc), BinaryOp::Eq, col(rt, rc))
}

fn and(preds: Vec<Expr>) -> Expr {
    make_conjunction(preds)
}

/// Left-deep join in query text order:
/// customer ⋈ orders ⋈ lineitem ⋈ supplier ⋈ nation ⋈ region
fn build_suboptimal_plan(memo: &mut Memo) -> GroupId {
    let (customer, _) = memo.add_expr(scan("customer"), vec![]);
    let (orders, _) = memo.add_expr(scan("orders"), vec![]);
    let (lineitem, _) = memo.add_expr(scan("lineitem"), vec![]);
    let (supplier, _) = memo.add_expr(scan("supplier"), vec![]);
    let (nation, _) = memo.add_expr(scan("nation"), vec![]);
    let (region, _) = memo.add_expr(scan("region"), vec![]);

    let (co, _) = memo.add_expr(
        join(equi("customer", "c_custkey", "orders", "o_custkey")),
        vec![customer, orders],
    );
    let (with_lineitem, _) = memo.add_expr(
        join(equi("orders", "o_orderkey", "lineitem", "l_orderkey")),
        vec![co, lineitem],
    );
    let (with_supplier, _) = memo.add_expr(
        join(and(vec![
            equi("lineitem", "l_suppkey", "supplier", "s_suppkey"),
            equi("customer", "c_nationkey", "supplier", "s_nationkey"),
        ])),
        vec![with_lineitem, supplier],
    );
    let (with_nation, _) = memo.add_expr(
        join(equi("supplier", "s_nationkey", "nation", "n_nationkey")),
        vec![with_supplier, nation],
    );
    let (root, _) = memo.add_expr(
        join(equi("nation", "n_regionkey", "region", "r_regionkey")),
        vec![with_nation, region],
    );
    root
}

/// Smallest tables first: (nation ⋈ region) joined to supplier, then lineitem, orders
/// and customer.
fn build_optimal_plan(memo: &mut Memo) -> GroupId {
    let (customer, _) = memo.add_expr(scan("customer"), vec![]);
    let (orders, _) = memo.add_expr(scan("orders"), vec![]);
    let (lineitem, _) = memo.add_expr(scan("lineitem"), vec![]);
    let (supplier, _) = memo.add_expr(scan("supplier"), vec![]);
    let (nation, _) = memo.add_expr(scan("nation"), vec![]);
    let (region, _) = memo.add_expr(scan("region"), vec![]);

    let (nr, _) = memo.add_expr(
        join(equi("nation", "n_regionkey", "region", "r_regionkey")),
        vec![nation, region],
    );
    let (snr, _) = memo.add_expr(
        join(equi("supplier", "s_nationkey", "nation", "n_nationkey")),
        vec![supplier, nr],
    );
    let (ls, _) = memo.add_expr(
        join(equi("lineitem", "l_suppkey", "supplier", "s_suppkey")),
        vec![lineitem, snr],
    );
    let (ols, _) = memo.add_expr(
        join(equi("orders", "o_orderkey", "lineitem", "l_orderkey")),
        vec![orders, ls],
    );
    let (root, _) = memo.add_expr(
        join(and(vec![
            equi("customer", "c_custkey", "orders", "o_custkey"),
            equi("customer", "c_nationkey", "supplier", "s_nationkey"),
        ])),
        vec![customer, ols],
    );
    root
}

fn search(memo: Memo, registry: RuleRegistry) -> CascadesSearch {
    CascadesSearch::new(
        memo,
        Arc::new(registry),
        Arc::new(DefaultCostModel::default()),
        Arc::new(build_tpch_catalog()),
        SearchConfig::default(),
    )
}

/// Optimize a plan built in `memo` with every built-in rule.
fn optimize_plan(memo: Memo, root: GroupId) -> OptimizedPlan {
    search(memo, cascade_rules::default_rule_registry())
        .optimize(root, &PhysicalPropertySet::any())
        .expect("optimization failed")
}

/// Implementation rules only: the join order stays as built.
fn fixed_order_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    let rules: Vec<Box<dyn Rule>> = vec![
        Box::new(ImplSeqScanRule),
        Box::new(ImplHashJoinRule),
        Box::new(ImplMergeJoinRule),
        Box::new(ImplNestedLoopJoinRule),
    ];
    for rule in rules {
        registry.add_rule(rule);
    }
    registry
}

fn joins(plan: &PhysicalPlan) -> usize {
    plan.count(PhysicalOpKind::HashJoin)
        + plan.count(PhysicalOpKind::MergeJoin)
        + plan.count(PhysicalOpKind::NestedLoopJoin)
}

#[test]
fn test_tpch_q5_suboptimal_plan_optimizes() {
    let mut memo = Memo::new();
    let root = build_suboptimal_plan(&mut memo);
    let result = optimize_plan(memo, root);

    println!("=== Optimized suboptimal plan ===");
    println!("{}", result.plan);
    println!("Total cost: {:.1}", result.cost.total);

    assert!(result.cost.total.is_finite());
    assert!(result.cost.total > 0.0);
    assert_eq!(joins(&result.plan), 5);
    assert!(result.budget_exceeded.is_none());
}

#[test]
fn test_tpch_q5_exploration_beats_query_order() {
    let mut memo = Memo::new();
    let root = build_suboptimal_plan(&mut memo);
    let fixed = search(memo, fixed_order_registry())
        .optimize(root, &PhysicalPropertySet::any())
        .expect("fixed-order optimization failed");

    let mut memo = Memo::new();
    let root = build_suboptimal_plan(&mut memo);
    let explored = optimize_plan(memo, root);

    let mut memo = Memo::new();
    let root = build_optimal_plan(&mut memo);
    let optimal = optimize_plan(memo, root);

    println!("=== Query order, no exploration ===");
    println!("{}\nCost: {:.1}\n", fixed.plan, fixed.cost.total);
    println!("=== Query order, explored ===");
    println!("{}\nCost: {:.1}\n", explored.plan, explored.cost.total);
    println!("=== Smallest tables first, explored ===");
    println!("{}\nCost: {:.1}\n", optimal.plan, optimal.cost.total);
    println!(
        "Cost ratio (fixed/explored): {:.2}x",
        fixed.cost.total / explored.cost.total
    );

    assert!(optimal.cost.total.is_finite());
    assert!(
        explored.cost.total <= fixed.cost.total,
        "exploration must not lose to the starting order: explored={:.1}, fixed={:.1}",
        explored.cost.total,
        fixed.cost.total
    );
}

#[test]
fn test_tpch_q5_memo_exploration() {
    let mut memo = Memo::new();
    let root = build_suboptimal_plan(&mut memo);
    let initial_groups = memo.num_groups();
    let initial_exprs = memo.num_exprs();

    let mut search = search(memo, cascade_rules::default_rule_registry());
    search
        .optimize(root, &PhysicalPropertySet::any())
        .expect("optimization failed");

    let final_groups = search.memo.num_groups();
    let final_exprs = search.memo.num_exprs();
    println!("Memo exploration:");
    println!("  Initial: {} groups, {} exprs", initial_groups, initial_exprs);
    println!("  Final:   {} groups, {} exprs", final_groups, final_exprs);

    assert!(final_groups > initial_groups, "reordering should add join groups");
    assert!(
        final_exprs > initial_exprs,
        "optimizer should explore alternatives: initial={}, final={}",
        initial_exprs,
        final_exprs
    );
}

/// The whole query: filters, joins in query order, aggregation and ordering.
fn build_q5_query() -> LogicalPlan {
    let scan = |name: &str| LogicalPlan::scan(TableRef::new("tpch", name), columns(name));
    let plan = || -> cascade_core::PlanResult<LogicalPlan> {
        scan("customer")?
            .join(scan("orders")?, JoinType::Inner, equi("customer", "c_custkey", "orders", "o_custkey"))?
            .join(scan("lineitem")?, JoinType::Inner, equi("orders", "o_orderkey", "lineitem", "l_orderkey"))?
            .join(
                scan("supplier")?,
                JoinType::Inner,
                and(vec![
                    equi("lineitem", "l_suppkey", "supplier", "s_suppkey"),
                    equi("customer", "c_nationkey", "supplier", "s_nationkey"),
                ]),
            )?
            .join(scan("nation")?, JoinType::Inner, equi("supplier", "s_nationkey", "nation", "n_nationkey"))?
            .join(scan("region")?, JoinType::Inner, equi("nation", "n_regionkey", "region", "r_regionkey"))?
            .filter(and(vec![
                binary(col("region", "r_name"), BinaryOp::Eq, lit(ScalarValue::Utf8("ASIA".into()))),
                binary(col("orders", "o_orderdate"), BinaryOp::GtEq, lit(ScalarValue::Date(8766))),
                binary(col("orders", "o_orderdate"), BinaryOp::Lt, lit(ScalarValue::Date(9131))),
            ]))?
            .aggregate(
                vec![col("nation", "n_name")],
                vec![AggExpr::new(AggFunc::Sum, col("lineitem", "l_extendedprice"), "revenue")],
            )?
            .sort(vec![SortKey {
                expr: Expr::Column(ColumnRef::unqualified("revenue")),
                ascending: false,
                nulls_first: false,
            }])
    };
    plan().expect("Q5 is well-formed")
}

#[test]
fn test_tpch_q5_full_query() {
    let query = build_q5_query();
    let mut search = search(Memo::new(), cascade_rules::default_rule_registry());
    let result = search
        .optimize_plan(&query, &PhysicalPropertySet::any())
        .expect("optimization failed");

    println!("=== TPC-H Q5 ===");
    println!("{}", result.plan);
    println!("Cost: {:.1}", result.cost.total);

    assert!(result.cost.total.is_finite());
    assert_eq!(joins(&result.plan), 5);
    assert_eq!(
        result.plan.count(PhysicalOpKind::HashAggregate)
            + result.plan.count(PhysicalOpKind::StreamAggregate),
        1
    );
    assert!(matches!(result.plan.op, PhysicalOp::SortOp { .. }));
    let names: Vec<&str> = result.plan.schema.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["n_name", "revenue"]);

    // The region predicate never stays above a join.
    for node in result.plan.nodes() {
        if let PhysicalOp::Filter { predicate } = &node.op {
            let above_join = node.children.iter().any(|c| joins(c) > 0);
            assert!(
                !(above_join && predicate.references_table("region")),
                "region filter was not pushed down:\n{}",
                result.plan
            );
        }
    }
}

#[test]
fn test_simple_two_way_join() {
    let mut catalog = InMemoryCatalog::new();
    let small = TableRef::new("test", "small");
    let large = TableRef::new("test", "large");
    let small_cols = vec![field("small", "id", DataType::Int64)];
    let large_cols = vec![field("large", "id", DataType::Int64)];
    catalog.add_table(
        &small,
        small_cols.clone(),
        Statistics::new(100.0, 10_000.0).with_column("id", ColumnStatistics::new(100.0, 0.0)),
    );
    catalog.add_table(
        &large,
        large_cols.clone(),
        Statistics::new(1_000_000.0, 100_000_000.0)
            .with_column("id", ColumnStatistics::new(1_000_000.0, 0.0)),
    );

    let mut memo = Memo::new();
    let (small_gid, _) = memo.add_expr(
        Operator::Logical(LogicalOp::Scan {
            table: small,
            columns: small_cols,
            predicate: None,
        }),
        vec![],
    );
    let (large_gid, _) = memo.add_expr(
        Operator::Logical(LogicalOp::Scan {
            table: large,
            columns: large_cols,
            predicate: None,
        }),
        vec![],
    );
    let (join_gid, _) = memo.add_expr(
        join(equi("small", "id", "large", "id")),
        vec![small_gid, large_gid],
    );

    let mut search = CascadesSearch::new(
        memo,
        Arc::new(cascade_rules::default_rule_registry()),
        Arc::new(DefaultCostModel::default()),
        Arc::new(catalog),
        SearchConfig::default(),
    );
    let result = search
        .optimize(join_gid, &PhysicalPropertySet::any())
        .expect("should find a plan");

    println!("=== Two-way join plan ===");
    println!("{}", result.plan.display(0));
    println!("Cost: {:.1}", result.cost.total);

    assert!(result.cost.total > 0.0);
    assert!(result.cost.total.is_finite());
    // The small side is the one worth hashing.
    if let PhysicalOp::HashJoin { build_side, .. } = &result.plan.op {
        let build = match build_side {
            BuildSide::Left => &result.plan.children[0],
            BuildSide::Right => &result.plan.children[1],
        };
        assert!(build.row_count <= 100.0, "built the hash table on the large side");
    }
}
