//! # Cost Model
//!
//! Query execution cost has three dimensions: CPU time, memory held and network traffic.
//! `DefaultCostModel` collapses them into a single comparable `Cost`:
//!
//! ```text
//! local_cost = cpu_weight * cpu + memory_weight * memory + network_weight * network
//! ```
//!
//! The default weights (1.0, 1.0, 10.0) make shuffling data an order of magnitude more
//! expensive than processing it.
//!
//! ## Cost Accumulation
//!
//! Costs are additive: a plan's cost is its operator's non-negative local cost plus the
//! costs of its inputs. This keeps costs monotonic, which the search relies on when it
//! prunes alternatives whose partial cost already exceeds the best known plan.

use crate::expr::*;
use crate::properties::PhysicalPropertySet;
use crate::stats::{Statistics, DEFAULT_ROW_COUNT, DEFAULT_ROW_SIZE};
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Estimated expense of a plan. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// `f64::MAX` represents an infeasible or not-yet-costed plan.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self { total: f64::MAX }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        if self.is_infinite() || rhs.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(self.total + rhs.total)
    }
}

/// Epsilon-based equality to absorb floating-point noise in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

/// Consistent with `eq`: costs within epsilon compare as equal.
impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self == other {
            return Some(std::cmp::Ordering::Equal);
        }
        self.total.partial_cmp(&other.total)
    }
}

/// Pluggable cost model.
///
/// Implementations must be pure and return `sum(children_costs) + local` with a
/// non-negative `local`.
pub trait CostModel: Send + Sync {
    /// `input_stats` holds the statistics of each input; a leaf operator receives the
    /// statistics of the relation it produces instead.
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        input_stats: &[&Statistics],
        children_costs: &[Cost],
        required_props: &PhysicalPropertySet,
    ) -> Cost;
}

/// Default weighted CPU/memory/network cost model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultCostModel {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub network_weight: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
            network_weight: 10.0,
        }
    }
}

/// Extra CPU per row for fetching through an index instead of streaming the table.
const INDEX_LOOKUP_FACTOR: f64 = 1.2;

/// Per-row CPU of evaluating a projection list, relative to a scan.
const PROJECT_FACTOR: f64 = 0.1;

impl DefaultCostModel {
    fn local_cost(&self, op: &PhysicalOp, input_stats: &[&Statistics]) -> f64 {
        let rows_of = |i: usize| {
            input_stats
                .get(i)
                .map(|s| s.row_count)
                .unwrap_or(DEFAULT_ROW_COUNT)
        };
        let bytes_of = |i: usize| {
            input_stats
                .get(i)
                .map(|s| s.total_size_bytes)
                .unwrap_or(rows_of(i) * DEFAULT_ROW_SIZE)
        };

        match op {
            PhysicalOp::SeqScan { .. } => self.cpu_weight * rows_of(0),
            PhysicalOp::IndexScan { .. } => self.cpu_weight * rows_of(0) * INDEX_LOOKUP_FACTOR,
            PhysicalOp::Filter { .. } => self.cpu_weight * rows_of(0),
            PhysicalOp::Project { .. } => self.cpu_weight * rows_of(0) * PROJECT_FACTOR,
            // Build: hash every row and hold the table in memory. Probe: one lookup per row.
            PhysicalOp::HashJoin { build_side, .. } => {
                let (build, probe) = match build_side {
                    BuildSide::Left => (0, 1),
                    BuildSide::Right => (1, 0),
                };
                self.cpu_weight * rows_of(build)
                    + self.memory_weight * bytes_of(build)
                    + self.cpu_weight * rows_of(probe)
            }
            PhysicalOp::MergeJoin { .. } => self.cpu_weight * (rows_of(0) + rows_of(1)),
            PhysicalOp::NestedLoopJoin { .. } => self.cpu_weight * rows_of(0) * rows_of(1),
            PhysicalOp::HashAggregate { .. } => {
                let rows = rows_of(0);
                self.cpu_weight * rows + self.memory_weight * rows * DEFAULT_ROW_SIZE
            }
            PhysicalOp::StreamAggregate { .. } => self.cpu_weight * rows_of(0),
            // n log n comparisons, plus the whole input buffered.
            PhysicalOp::SortOp { .. } => {
                let rows = rows_of(0);
                let n_log_n = if rows > 1.0 { rows * rows.log2() } else { 1.0 };
                self.cpu_weight * n_log_n + self.memory_weight * rows * DEFAULT_ROW_SIZE
            }
            PhysicalOp::Limit { offset, count } => {
                self.cpu_weight * rows_of(0).min(offset.saturating_add(*count) as f64)
            }
            PhysicalOp::EmptyRelation { .. } => 0.0,
            PhysicalOp::UnionAll => {
                let rows: f64 = (0..input_stats.len().max(1)).map(|i| rows_of(i)).sum();
                self.cpu_weight * rows
            }
            // Every byte crosses the network; a gather to one stream still moves all of it.
            PhysicalOp::Exchange { .. } => {
                let bytes = bytes_of(0);
                self.network_weight * bytes.max(1.0)
            }
        }
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        input_stats: &[&Statistics],
        children_costs: &[Cost],
        _required_props: &PhysicalPropertySet,
    ) -> Cost {
        let children_total = children_costs
            .iter()
            .fold(Cost::zero(), |acc, c| acc + *c);
        children_total + Cost::new(self.local_cost(op, input_stats).max(0.0))
    }
}
