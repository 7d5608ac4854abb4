//! # Statistics for Cost-Based Optimization
//!
//! Statistics structures, cardinality derivation formulas and selectivity estimation.
//!
//! ## Statistics Hierarchy
//!
//! - **Table-level**: row count and total size in bytes.
//! - **Column-level**: number of distinct values (NDV), null fraction, min/max values,
//!   average value size, and an optional histogram. Keyed by column name.
//!
//! ## Derivation Formulas
//!
//! Statistics for intermediate plan nodes are derived bottom-up:
//!
//! - **Filter**: output_rows = input_rows * selectivity.
//! - **Join**: output_rows = |left| * |right| / max(NDV_left_key, NDV_right_key).
//! - **Aggregate**: output_rows = product of NDVs of group-by columns, capped by input rows.
//! - **Limit**: output_rows = min(count, input_rows - offset).
//! - **Union**: sum of the inputs.
//! - **Empty relation**: zero rows.
//!
//! ## Selectivity Estimation
//!
//! Pluggable through [`SelectivityModel`]. The default model uses 1/NDV for equality,
//! min/max interpolation for ranges (1/3 when bounds are unknown), products for AND,
//! inclusion-exclusion for OR, complements for NOT, and 0.1 when nothing better is known.
//!
//! Missing statistics never fail optimization; they fall back to defaults.

use crate::expr::{BinaryOp, ColumnRef, Expr, ScalarValue, UnaryOp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Row count assumed for a relation without statistics.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;

/// Row width assumed when no size information is available.
pub const DEFAULT_ROW_SIZE: f64 = 100.0;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range predicate on a column without known bounds.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Statistics for a relation (or group in the memo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    #[serde(default)]
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    /// Placeholder statistics for a relation the catalog knows nothing about.
    pub fn unknown() -> Self {
        Self::new(DEFAULT_ROW_COUNT, DEFAULT_ROW_COUNT * DEFAULT_ROW_SIZE)
    }

    pub fn empty() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    pub fn column(&self, col: &ColumnRef) -> Option<&ColumnStatistics> {
        self.column_stats.get(&col.name)
    }

    pub fn avg_row_size(&self) -> f64 {
        if self.row_count > 0.0 {
            self.total_size_bytes / self.row_count
        } else {
            DEFAULT_ROW_SIZE
        }
    }
}

/// Per-column statistics used for selectivity estimation and cost modeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    pub min_value: Option<ScalarValue>,
    pub max_value: Option<ScalarValue>,
    /// Average size of a single value in bytes.
    pub avg_row_size: f64,
    pub histogram: Option<Histogram>,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            min_value: None,
            max_value: None,
            avg_row_size: 8.0,
            histogram: None,
        }
    }

    pub fn with_range(mut self, min: ScalarValue, max: ScalarValue) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }
}

/// Equi-depth histogram for range selectivity estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Lower bound of the bucket range (inclusive).
    pub lower: f64,
    /// Upper bound of the bucket range (inclusive).
    pub upper: f64,
    pub count: f64,
    pub distinct: f64,
}

impl Histogram {
    /// Fraction of rows with a value below `v`, interpolating inside the bucket that
    /// contains it.
    pub fn fraction_below(&self, v: f64) -> Option<f64> {
        let total: f64 = self.buckets.iter().map(|b| b.count).sum();
        if total <= 0.0 {
            return None;
        }
        let mut below = 0.0;
        for b in &self.buckets {
            if v >= b.upper {
                below += b.count;
            } else if v > b.lower {
                let width = (b.upper - b.lower).max(f64::EPSILON);
                below += b.count * (v - b.lower) / width;
            }
        }
        Some((below / total).clamp(0.0, 1.0))
    }
}

/// Derive statistics for join output.
///
/// ```text
/// |A JOIN B| = |A| * |B| / max(NDV(A.key), NDV(B.key))
/// ```
///
/// Multi-column keys multiply their selectivities (independence assumption). When NDV is
/// unknown the relation's row count is used, i.e. the key is assumed unique.
pub fn derive_join_stats(
    left: &Statistics,
    right: &Statistics,
    join_columns: &[(String, String)],
) -> Statistics {
    let mut selectivity = 1.0_f64;

    for (left_col, right_col) in join_columns {
        let left_ndv = left
            .column_stats
            .get(left_col)
            .map(|s| s.distinct_count)
            .unwrap_or(left.row_count);
        let right_ndv = right
            .column_stats
            .get(right_col)
            .map(|s| s.distinct_count)
            .unwrap_or(right.row_count);
        let max_ndv = left_ndv.max(right_ndv).max(1.0);
        selectivity /= max_ndv;
    }

    let cross = left.row_count * right.row_count;
    let row_count = if cross > 0.0 {
        (cross * selectivity).max(1.0)
    } else {
        0.0
    };
    let total_size_bytes = row_count * (left.avg_row_size() + right.avg_row_size());

    // NDV can't exceed the output row count.
    let mut column_stats = HashMap::new();
    for (name, stats) in left.column_stats.iter().chain(right.column_stats.iter()) {
        let mut cs = stats.clone();
        cs.distinct_count = cs.distinct_count.min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Derive statistics for filter output: rows scale by `selectivity`, and so do column NDVs
/// (clamped to the new row count).
pub fn derive_filter_stats(input: &Statistics, selectivity: f64) -> Statistics {
    let selectivity = selectivity.clamp(0.0, 1.0);
    let row_count = input.row_count * selectivity;
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };

    let mut column_stats = HashMap::new();
    for (name, stats) in &input.column_stats {
        let mut cs = stats.clone();
        cs.distinct_count = (cs.distinct_count * ratio).max(1.0).min(row_count.max(1.0));
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats,
    }
}

/// Derive statistics for aggregate output.
///
/// Output groups = product of the group-by NDVs, capped by the input row count. A global
/// aggregate (no group-by columns) always produces one row. Aggregate output columns get
/// no column statistics.
pub fn derive_aggregate_stats(input: &Statistics, group_by_cols: &[String]) -> Statistics {
    if group_by_cols.is_empty() {
        return Statistics::new(1.0, DEFAULT_ROW_SIZE);
    }
    let mut row_count = 1.0_f64;
    for col in group_by_cols {
        let ndv = input
            .column_stats
            .get(col)
            .map(|s| s.distinct_count)
            .unwrap_or(input.row_count);
        row_count *= ndv;
    }
    row_count = row_count.min(input.row_count).max(if input.row_count > 0.0 {
        1.0
    } else {
        0.0
    });

    let mut column_stats = HashMap::new();
    for col in group_by_cols {
        if let Some(cs) = input.column_stats.get(col) {
            column_stats.insert(col.clone(), cs.clone());
        }
    }

    Statistics {
        row_count,
        total_size_bytes: row_count * DEFAULT_ROW_SIZE,
        column_stats,
    }
}

/// Derive statistics for `LIMIT count OFFSET offset`.
pub fn derive_limit_stats(input: &Statistics, offset: u64, count: u64) -> Statistics {
    let available = (input.row_count - offset as f64).max(0.0);
    let row_count = available.min(count as f64);
    let mut stats = Statistics::new(row_count, row_count * input.avg_row_size());
    for (name, cs) in &input.column_stats {
        let mut cs = cs.clone();
        cs.distinct_count = cs.distinct_count.min(row_count.max(1.0));
        stats.column_stats.insert(name.clone(), cs);
    }
    stats
}

/// Derive statistics for a bag union of the inputs.
pub fn derive_union_stats(inputs: &[&Statistics]) -> Statistics {
    let row_count = inputs.iter().map(|s| s.row_count).sum();
    let total_size_bytes = inputs.iter().map(|s| s.total_size_bytes).sum();
    let mut column_stats: HashMap<String, ColumnStatistics> = HashMap::new();
    if let Some(first) = inputs.first() {
        for (name, cs) in &first.column_stats {
            let ndv: f64 = inputs
                .iter()
                .filter_map(|s| s.column_stats.get(name))
                .map(|c| c.distinct_count)
                .sum();
            let mut merged = cs.clone();
            merged.distinct_count = ndv.min(row_count);
            column_stats.insert(name.clone(), merged);
        }
    }
    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Estimate selectivity for an equality predicate: `sel = 1 / NDV`, or the default when the
/// column has no statistics.
pub fn equality_selectivity(stats: &Statistics, col_name: &str) -> f64 {
    stats
        .column_stats
        .get(col_name)
        .map(|cs| 1.0 / cs.distinct_count.max(1.0))
        .unwrap_or(DEFAULT_FILTER_SELECTIVITY)
}

/// Estimates the fraction of input rows that satisfy a predicate.
pub trait SelectivityModel: Send + Sync {
    /// A value in `[0, 1]`.
    fn selectivity(&self, predicate: &Expr, input: &Statistics) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSelectivityModel;

impl SelectivityModel for DefaultSelectivityModel {
    fn selectivity(&self, predicate: &Expr, input: &Statistics) -> f64 {
        self.estimate(predicate, input).clamp(0.0, 1.0)
    }
}

impl DefaultSelectivityModel {
    fn estimate(&self, predicate: &Expr, input: &Statistics) -> f64 {
        match predicate {
            Expr::Literal(ScalarValue::Bool(true)) => 1.0,
            Expr::Literal(ScalarValue::Bool(false)) | Expr::Literal(ScalarValue::Null) => 0.0,
            Expr::And(conjuncts) => conjuncts
                .iter()
                .map(|c| self.estimate(c, input))
                .product(),
            Expr::Or(disjuncts) => disjuncts.iter().fold(0.0, |acc, d| {
                let s = self.estimate(d, input);
                acc + s - acc * s
            }),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => 1.0 - self.estimate(operand, input),
            Expr::UnaryOp {
                op: op @ (UnaryOp::IsNull | UnaryOp::IsNotNull),
                operand,
            } => {
                let null_fraction = match operand.as_ref() {
                    Expr::Column(c) => input.column(c).map(|cs| cs.null_fraction),
                    _ => None,
                };
                match (op, null_fraction) {
                    (UnaryOp::IsNull, Some(f)) => f,
                    (UnaryOp::IsNull, None) => DEFAULT_FILTER_SELECTIVITY,
                    (_, Some(f)) => 1.0 - f,
                    (_, None) => 1.0 - DEFAULT_FILTER_SELECTIVITY,
                }
            }
            Expr::BinaryOp { op, left, right } if op.is_comparison() => {
                self.comparison(*op, left, right, input)
            }
            _ => DEFAULT_FILTER_SELECTIVITY,
        }
    }

    fn comparison(&self, op: BinaryOp, left: &Expr, right: &Expr, input: &Statistics) -> f64 {
        // Normalize to `column <op> value` where possible.
        let (column, op, other) = match (left, right) {
            (Expr::Column(c), other) => (c, op, other),
            (other, Expr::Column(c)) => (c, op.commute(), other),
            _ => return DEFAULT_FILTER_SELECTIVITY,
        };
        let stats = input.column(column);

        match op {
            BinaryOp::Eq | BinaryOp::NotEq => {
                let eq = match (other, stats) {
                    (Expr::Column(o), Some(cs)) => {
                        let other_ndv = input.column(o).map(|s| s.distinct_count).unwrap_or(1.0);
                        1.0 / cs.distinct_count.max(other_ndv).max(1.0)
                    }
                    (_, Some(cs)) => 1.0 / cs.distinct_count.max(1.0),
                    (_, None) => DEFAULT_FILTER_SELECTIVITY,
                };
                if op == BinaryOp::Eq {
                    eq
                } else {
                    1.0 - eq
                }
            }
            _ => {
                let value = match other {
                    Expr::Literal(v) => v.as_f64(),
                    _ => None,
                };
                match (stats, value) {
                    (Some(cs), Some(v)) => range_selectivity(cs, op, v),
                    _ => DEFAULT_RANGE_SELECTIVITY,
                }
            }
        }
    }
}

fn range_selectivity(cs: &ColumnStatistics, op: BinaryOp, v: f64) -> f64 {
    let below = match cs.histogram.as_ref().and_then(|h| h.fraction_below(v)) {
        Some(f) => f,
        None => {
            let bounds = cs
                .min_value
                .as_ref()
                .and_then(ScalarValue::as_f64)
                .zip(cs.max_value.as_ref().and_then(ScalarValue::as_f64));
            match bounds {
                Some((min, max)) if max > min => ((v - min) / (max - min)).clamp(0.0, 1.0),
                _ => return DEFAULT_RANGE_SELECTIVITY,
            }
        }
    };
    let non_null = 1.0 - cs.null_fraction;
    match op {
        BinaryOp::Lt | BinaryOp::LtEq => below * non_null,
        _ => (1.0 - below) * non_null,
    }
}
