//! # HTTP Route Handlers
//!
//! ## Optimization Pipeline
//!
//! `POST /optimize` takes a JSON body with everything a single optimization needs:
//!
//! 1. **Catalog**: the tables the plan reads, with row counts, per-column statistics,
//!    indexes and distribution. They populate a request-local `InMemoryCatalog`.
//! 2. **Plan**: a logical plan tree. It is validated while being deserialized, so a
//!    plan that references unknown columns or mistypes a predicate is rejected up front.
//! 3. **Required properties**: order and distribution the result must have (default:
//!    none).
//!
//! The search runs on a blocking thread with a fresh memo and returns the cheapest
//! physical plan, its cost, an indented explain text and, when the search budget ran
//! out, the overrun report.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: malformed JSON or an invalid plan (`PlanError`)
//! - 500 Internal Server Error: optimizer failure (no plan found, internal invariant)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use cascade_core::catalog::{InMemoryCatalog, TableIndex};
use cascade_core::expr::{DataType, Distribution, Field, TableRef};
use cascade_core::memo::Memo;
use cascade_core::plan::{LogicalPlan, PhysicalPlan};
use cascade_core::properties::PhysicalPropertySet;
use cascade_core::search::{BudgetExceeded, CascadesSearch};
use cascade_core::stats::{ColumnStatistics, Statistics};
use cascade_core::OptimizerError;

use crate::state::AppState;

type HandlerError = (StatusCode, String);

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /rules`: list active rules in the order the search applies them.
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    let rules: Vec<RuleInfo> = state
        .rule_registry
        .active_rules(state.config.search.source_type.as_deref())
        .iter()
        .map(|r| RuleInfo {
            name: r.name().to_string(),
            rule_type: format!("{:?}", r.rule_type()),
        })
        .collect();

    Json(RulesResponse { rules })
}

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleInfo>,
}

#[derive(Debug, Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub rule_type: String,
}

/// Request body for `POST /optimize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    #[serde(default)]
    pub tables: Vec<TableInfo>,
    pub plan: LogicalPlan,
    #[serde(default)]
    pub required: PhysicalPropertySet,
}

/// A table referenced by the plan, with its statistics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub row_count: f64,
    /// Estimated total size in bytes. Derived from the column sizes when absent.
    pub size_bytes: Option<f64>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// Native distribution of the table's rows; a single stream when absent.
    pub distribution: Option<Distribution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    /// Number of distinct values. Without it the column gets no statistics.
    pub ndv: Option<f64>,
    #[serde(default)]
    pub null_fraction: f64,
    #[serde(default = "default_avg_size")]
    pub avg_size: f64,
}

fn default_avg_size() -> f64 {
    8.0
}

#[derive(Debug, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub cost: f64,
    /// Indented plan text, one operator per line.
    pub explain: String,
    pub plan: PhysicalPlan,
    pub budget_exceeded: Option<BudgetExceeded>,
    /// Memo size at the end of the search.
    pub groups: usize,
    pub exprs: usize,
}

/// `POST /optimize`: optimize a logical plan against the statistics sent with it.
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Json<OptimizeResponse>, HandlerError> {
    let Json(req) = payload.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;

    tokio::task::spawn_blocking(move || run_optimization(&state, req))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Optimization task failed: {}", e),
            )
        })?
        .map(Json)
}

/// Build the request catalog, run the search, and package the result.
pub fn run_optimization(
    state: &AppState,
    req: OptimizeRequest,
) -> Result<OptimizeResponse, HandlerError> {
    let catalog = build_catalog(&req.tables);
    let mut search = CascadesSearch::new(
        Memo::new(),
        Arc::clone(&state.rule_registry),
        Arc::clone(&state.cost_model),
        Arc::new(catalog),
        state.config.search.clone(),
    );

    let optimized = search
        .optimize_plan(&req.plan, &req.required)
        .map_err(|e| {
            let status = error_status(&e);
            warn!("Optimization failed ({}): {}", status, e);
            (status, e.to_string())
        })?;

    debug!(
        "Optimized plan: cost={:.1}, groups={}, exprs={}",
        optimized.cost.total,
        search.memo.num_groups(),
        search.memo.num_exprs()
    );
    Ok(OptimizeResponse {
        cost: optimized.cost.total,
        explain: optimized.plan.to_string(),
        plan: optimized.plan,
        budget_exceeded: optimized.budget_exceeded,
        groups: search.memo.num_groups(),
        exprs: search.memo.num_exprs(),
    })
}

/// Invalid input is the caller's fault; anything else is ours.
pub fn error_status(err: &OptimizerError) -> StatusCode {
    match err {
        OptimizerError::Plan(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An `InMemoryCatalog` holding the tables of one request.
fn build_catalog(tables: &[TableInfo]) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();

    for table in tables {
        let table_ref = TableRef::new(&table.schema, &table.name);
        let row_size: f64 = table.columns.iter().map(|c| c.avg_size).sum();
        let size_bytes = table
            .size_bytes
            .unwrap_or(table.row_count * row_size.max(1.0));

        let mut stats = Statistics::new(table.row_count, size_bytes);
        let mut fields = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            if let Some(ndv) = column.ndv {
                let mut col_stats = ColumnStatistics::new(ndv, column.null_fraction);
                col_stats.avg_row_size = column.avg_size;
                stats = stats.with_column(&column.name, col_stats);
            }
            fields.push(Field::new(
                Some(table.name.as_str()),
                &column.name,
                column.data_type,
                column.nullable,
            ));
        }
        catalog.add_table(&table_ref, fields, stats);

        for index in &table.indexes {
            let columns: Vec<&str> = index.columns.iter().map(String::as_str).collect();
            catalog.add_index(&table_ref, TableIndex::new(&index.name, &columns));
        }
        if let Some(distribution) = &table.distribution {
            catalog.set_distribution(&table_ref, distribution.clone());
        }
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use cascade_core::expr::*;
    use cascade_core::plan::LogicalPlan;
    use cascade_core::PlanError;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig::default()))
    }

    fn orders_table(indexes: Vec<IndexInfo>) -> TableInfo {
        TableInfo {
            schema: "tpch".into(),
            name: "orders".into(),
            row_count: 10_000.0,
            size_bytes: None,
            columns: vec![
                ColumnInfo {
                    name: "o_orderkey".into(),
                    data_type: DataType::Int64,
                    nullable: false,
                    ndv: Some(10_000.0),
                    null_fraction: 0.0,
                    avg_size: 8.0,
                },
                ColumnInfo {
                    name: "o_status".into(),
                    data_type: DataType::Utf8,
                    nullable: false,
                    ndv: Some(100.0),
                    null_fraction: 0.0,
                    avg_size: 1.0,
                },
            ],
            indexes,
            distribution: None,
        }
    }

    fn orders_scan() -> LogicalPlan {
        LogicalPlan::scan(
            TableRef::new("tpch", "orders"),
            vec![
                Field::new(Some("orders"), "o_orderkey", DataType::Int64, false),
                Field::new(Some("orders"), "o_status", DataType::Utf8, false),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let Json(resp) = health().await;
        assert_eq!(resp.status, "ok");
    }

    #[tokio::test]
    async fn test_list_rules() {
        let Json(resp) = list_rules(State(state())).await;
        assert!(resp.rules.iter().any(|r| r.name == "JoinCommutativity" && r.rule_type == "Transformation"));
        assert!(resp.rules.iter().any(|r| r.name == "ImplSort" && r.rule_type == "Implementation"));
    }

    #[tokio::test]
    async fn test_optimize_filter_over_scan() {
        let plan = orders_scan()
            .filter(binary(
                col("orders", "o_status"),
                BinaryOp::Eq,
                lit(ScalarValue::Utf8("F".into())),
            ))
            .unwrap();
        let req = OptimizeRequest {
            tables: vec![orders_table(vec![])],
            plan,
            required: PhysicalPropertySet::any(),
        };

        let Json(resp) = optimize(State(state()), Ok(Json(req))).await.unwrap();
        assert!(resp.cost > 0.0);
        assert!(resp.budget_exceeded.is_none());
        assert!(resp.explain.contains("orders"));
        assert!((resp.plan.row_count - 100.0).abs() < 1e-6);
        assert!(resp.groups >= 2);
    }

    #[tokio::test]
    async fn test_optimize_uses_index_for_order() {
        let order = vec![SortKey::asc(col("orders", "o_orderkey"))];
        let req = OptimizeRequest {
            tables: vec![orders_table(vec![IndexInfo {
                name: "orders_pk".into(),
                columns: vec!["o_orderkey".into()],
            }])],
            plan: orders_scan(),
            required: PhysicalPropertySet::with_sort(order),
        };

        let resp = run_optimization(&state(), req).unwrap();
        assert_eq!(resp.plan.count(PhysicalOpKind::SortOp), 0);
        assert_eq!(resp.plan.count(PhysicalOpKind::IndexScan), 1);
    }

    #[test]
    fn test_request_json_and_error_status() {
        let body = serde_json::json!({
            "tables": [{
                "schema": "tpch",
                "name": "orders",
                "rowCount": 10.0,
                "columns": [{"name": "o_orderkey", "dataType": "Int64"}]
            }],
            "plan": {"op": {"Limit": {"offset": 0, "count": 1}}}
        });
        // A Limit without an input is not a valid plan.
        assert!(serde_json::from_value::<OptimizeRequest>(body).is_err());

        let plan_err = OptimizerError::Plan(PlanError::InvalidPlan("bad".into()));
        assert_eq!(error_status(&plan_err), StatusCode::BAD_REQUEST);
        assert_eq!(error_status(&OptimizerError::CycleDetected(3)), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_build_catalog() {
        use cascade_core::catalog::Catalog;

        let mut table = orders_table(vec![IndexInfo {
            name: "orders_pk".into(),
            columns: vec!["o_orderkey".into()],
        }]);
        table.distribution = Some(Distribution::Hash(vec![col("orders", "o_orderkey")]));
        let catalog = build_catalog(&[table]);
        let table_ref = TableRef::new("tpch", "orders");

        let stats = catalog.get_table_stats(&table_ref).unwrap();
        assert_eq!(stats.row_count, 10_000.0);
        assert_eq!(stats.total_size_bytes, 90_000.0);
        assert_eq!(stats.column_stats["o_status"].distinct_count, 100.0);
        assert_eq!(catalog.get_table_columns(&table_ref).unwrap().len(), 2);
        assert_eq!(catalog.get_table_indexes(&table_ref)[0].columns, vec!["o_orderkey"]);
        assert!(matches!(catalog.get_table_distribution(&table_ref), Some(Distribution::Hash(_))));
    }
}
