//! # Physical and Logical Properties
//!
//! Properties describe characteristics of a plan's output.
//!
//! ## Logical Properties
//!
//! Shared by every expression of a group because they describe *what* is produced: the
//! output schema and the estimated cardinality.
//!
//! ## Physical Properties
//!
//! Describe *how* the output is organized at runtime:
//! - **Sort order**: the output is sorted on a key sequence. Required by MergeJoin,
//!   StreamAggregate and by the caller of `ORDER BY` queries.
//! - **Distribution**: how rows are spread across workers (single stream, hash
//!   partitioned, broadcast, round-robin).
//!
//! Every physical operator declares what it produces given what its inputs produce
//! (`provided_props`) and what it needs from each input in order to honor a requirement
//! (`child_requirements`). When an input cannot deliver, the optimizer inserts an
//! enforcer (Sort or Exchange, see `enforcer`) and prices it like any other operator.
//!
//! `PhysicalPropertySet::any()` is "no requirement".

use crate::expr::{Distribution, Expr, JoinDistribution, JoinType, PhysicalOp, Schema, SortKey};
use crate::expr::{equi_join_keys, write_list, BuildSide};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical properties are derived from the logical content of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalProperties {
    pub schema: Schema,
    /// Estimated row count, filled in once statistics are derived.
    pub row_count: Option<f64>,
}

/// Physical properties describe how data is physically organized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalPropertySet {
    pub sort_order: Option<Vec<SortKey>>,
    pub distribution: Option<Distribution>,
}

impl PhysicalPropertySet {
    pub fn any() -> Self {
        Self {
            sort_order: None,
            distribution: None,
        }
    }

    pub fn with_sort(order: Vec<SortKey>) -> Self {
        Self {
            sort_order: Some(order),
            distribution: None,
        }
        .normalized()
    }

    pub fn with_distribution(dist: Distribution) -> Self {
        Self {
            sort_order: None,
            distribution: Some(dist),
        }
    }

    pub fn single() -> Self {
        Self::with_distribution(Distribution::Single)
    }

    /// Sorted on `order` within a single stream.
    pub fn sorted_single(order: Vec<SortKey>) -> Self {
        Self {
            sort_order: Some(order),
            distribution: Some(Distribution::Single),
        }
        .normalized()
    }

    /// An empty sort order asks for nothing, the same as no sort order.
    pub fn normalized(mut self) -> Self {
        if self.has_empty_order() {
            self.sort_order = None;
        }
        self
    }

    pub fn has_empty_order(&self) -> bool {
        self.sort_order.as_ref().is_some_and(Vec::is_empty)
    }

    pub fn is_any(&self) -> bool {
        self.sort_order.is_none() && self.distribution.is_none()
    }

    /// Check if this requirement is satisfied by the provided properties.
    ///
    /// - **Sort**: the required key sequence must be a prefix of the provided order, with
    ///   identical direction and null placement. `ORDER BY a, b, c` satisfies `ORDER BY a, b`.
    /// - **Distribution**: see [`distribution_satisfies`].
    /// - `None` (no requirement) is always satisfied.
    pub fn satisfied_by(&self, provided: &PhysicalPropertySet) -> bool {
        let sort_ok = match (&self.sort_order, &provided.sort_order) {
            (None, _) => true,
            (Some(required), _) if required.is_empty() => true,
            (Some(_), None) => false,
            (Some(required), Some(provided)) => {
                required.len() <= provided.len()
                    && required.iter().zip(provided.iter()).all(|(r, p)| r == p)
            }
        };
        let dist_ok = match (&self.distribution, &provided.distribution) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(required), Some(provided)) => distribution_satisfies(provided, required),
        };
        sort_ok && dist_ok
    }
}

impl fmt::Display for PhysicalPropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "{{any}}");
        }
        write!(f, "{{")?;
        if let Some(ref order) = self.sort_order {
            write!(f, "order=[")?;
            write_list(f, order, ", ")?;
            write!(f, "]")?;
            if self.distribution.is_some() {
                write!(f, ", ")?;
            }
        }
        if let Some(ref dist) = self.distribution {
            write!(f, "dist={}", dist)?;
        }
        write!(f, "}}")
    }
}

/// Whether a produced distribution meets a required one.
///
/// A single stream satisfies every requirement. `Hash(K)` satisfies `Hash(R)` when `K` is
/// a non-empty subset of `R`: rows agreeing on all of `R` agree on `K` and therefore sit
/// in the same partition. Anything else needs an exact match.
pub fn distribution_satisfies(provided: &Distribution, required: &Distribution) -> bool {
    match (provided, required) {
        (Distribution::Single, _) => true,
        (Distribution::Hash(have), Distribution::Hash(want)) => {
            !have.is_empty() && have.iter().all(|k| want.contains(k))
        }
        (have, want) => have == want,
    }
}

fn asc_keys(exprs: &[Expr]) -> Vec<SortKey> {
    exprs.iter().cloned().map(SortKey::asc).collect()
}

/// Whether a Project hands `expr` through unchanged (same column, same name).
fn project_passes_through(exprs: &[Expr], aliases: &[String], expr: &Expr) -> bool {
    match expr {
        Expr::Column(c) => exprs
            .iter()
            .zip(aliases)
            .any(|(e, alias)| e == expr && *alias == c.name),
        _ => false,
    }
}

fn project_passes_distribution(
    exprs: &[Expr],
    aliases: &[String],
    dist: &Distribution,
) -> bool {
    match dist {
        Distribution::Hash(keys) => keys
            .iter()
            .all(|k| project_passes_through(exprs, aliases, k)),
        _ => true,
    }
}

/// Properties an operator produces given the properties of its inputs. `required` is
/// only consulted by operators that can produce whatever is asked of them (an empty
/// relation is trivially sorted and partitioned any way).
pub fn provided_props(
    op: &PhysicalOp,
    children: &[PhysicalPropertySet],
    required: &PhysicalPropertySet,
) -> PhysicalPropertySet {
    let child = |i: usize| children.get(i).cloned().unwrap_or_default();
    let all_single = !children.is_empty()
        && children
            .iter()
            .all(|c| c.distribution == Some(Distribution::Single));
    match op {
        PhysicalOp::SeqScan { distribution, .. } => {
            PhysicalPropertySet::with_distribution(distribution.clone())
        }
        PhysicalOp::IndexScan {
            order,
            distribution,
            ..
        } => {
            if *distribution == Distribution::Single {
                PhysicalPropertySet::sorted_single(order.clone())
            } else {
                PhysicalPropertySet::with_distribution(distribution.clone())
            }
        }
        PhysicalOp::Filter { .. } | PhysicalOp::Limit { .. } => child(0),
        PhysicalOp::Project { exprs, aliases } => {
            let input = child(0);
            let sort_order = input.sort_order.map(|order| {
                order
                    .into_iter()
                    .take_while(|k| project_passes_through(exprs, aliases, &k.expr))
                    .collect::<Vec<_>>()
            });
            let distribution = input.distribution.map(|d| {
                if project_passes_distribution(exprs, aliases, &d) {
                    d
                } else {
                    Distribution::RoundRobin
                }
            });
            PhysicalPropertySet {
                sort_order: sort_order.filter(|o| !o.is_empty()),
                distribution,
            }
        }
        PhysicalOp::HashJoin {
            join_type,
            build_side,
            distribution,
            ..
        } => {
            if all_single {
                return PhysicalPropertySet::single();
            }
            let dist = match distribution {
                JoinDistribution::Broadcast => {
                    let probe = match build_side {
                        BuildSide::Left => 1,
                        BuildSide::Right => 0,
                    };
                    child(probe).distribution
                }
                JoinDistribution::Partitioned => match join_type {
                    JoinType::Right => child(1).distribution,
                    JoinType::Full => Some(Distribution::RoundRobin),
                    _ => child(0).distribution,
                },
            };
            PhysicalPropertySet {
                sort_order: None,
                distribution: dist,
            }
        }
        PhysicalOp::MergeJoin { join_type, .. } => {
            let sort_order = match join_type {
                JoinType::Right | JoinType::Full => None,
                _ => child(0).sort_order,
            };
            PhysicalPropertySet {
                sort_order,
                distribution: Some(Distribution::Single),
            }
        }
        PhysicalOp::NestedLoopJoin { .. } => PhysicalPropertySet::single(),
        PhysicalOp::HashAggregate { group_by, .. } => {
            let input = child(0);
            if group_by.is_empty() || input.distribution == Some(Distribution::Single) {
                PhysicalPropertySet::single()
            } else {
                PhysicalPropertySet::with_distribution(Distribution::Hash(group_by.clone()))
            }
        }
        PhysicalOp::StreamAggregate { group_by, .. } => {
            if group_by.is_empty() {
                PhysicalPropertySet::single()
            } else {
                PhysicalPropertySet::sorted_single(asc_keys(group_by))
            }
        }
        PhysicalOp::SortOp { order } => PhysicalPropertySet::sorted_single(order.clone()),
        PhysicalOp::EmptyRelation { .. } => PhysicalPropertySet {
            sort_order: required.sort_order.clone(),
            distribution: Some(
                required
                    .distribution
                    .clone()
                    .unwrap_or(Distribution::Single),
            ),
        },
        PhysicalOp::UnionAll => {
            if all_single {
                PhysicalPropertySet::single()
            } else {
                PhysicalPropertySet::with_distribution(Distribution::RoundRobin)
            }
        }
        PhysicalOp::Exchange { distribution } => {
            PhysicalPropertySet::with_distribution(distribution.clone())
        }
    }
}

/// Properties an operator needs from each input in order to produce `required`.
///
/// `inputs` are the output schemas of the children, used to orient join keys and to
/// decide whether a requirement can be pushed through a projection.
pub fn child_requirements(
    op: &PhysicalOp,
    required: &PhysicalPropertySet,
    inputs: &[&Schema],
) -> Vec<PhysicalPropertySet> {
    let any = PhysicalPropertySet::any;
    match op {
        PhysicalOp::SeqScan { .. }
        | PhysicalOp::IndexScan { .. }
        | PhysicalOp::EmptyRelation { .. } => vec![],
        PhysicalOp::Filter { .. } => vec![required.clone()],
        PhysicalOp::Project { exprs, aliases } => {
            let sort_ok = required.sort_order.as_ref().map_or(true, |order| {
                order
                    .iter()
                    .all(|k| project_passes_through(exprs, aliases, &k.expr))
            });
            let dist_ok = required
                .distribution
                .as_ref()
                .map_or(true, |d| project_passes_distribution(exprs, aliases, d));
            if sort_ok && dist_ok {
                vec![required.clone()]
            } else {
                vec![any()]
            }
        }
        PhysicalOp::Limit { .. } => vec![PhysicalPropertySet {
            sort_order: required.sort_order.clone(),
            distribution: Some(Distribution::Single),
        }],
        PhysicalOp::HashJoin {
            build_side,
            distribution,
            condition,
            ..
        } => match distribution {
            JoinDistribution::Partitioned => {
                let keys = match (inputs.first(), inputs.get(1)) {
                    (Some(l), Some(r)) => equi_join_keys(condition, l, r),
                    _ => vec![],
                };
                match keys.first() {
                    Some((lk, rk)) => vec![
                        PhysicalPropertySet::with_distribution(Distribution::Hash(vec![
                            lk.clone(),
                        ])),
                        PhysicalPropertySet::with_distribution(Distribution::Hash(vec![
                            rk.clone(),
                        ])),
                    ],
                    None => vec![PhysicalPropertySet::single(), PhysicalPropertySet::single()],
                }
            }
            JoinDistribution::Broadcast => {
                let broadcast = PhysicalPropertySet::with_distribution(Distribution::Broadcast);
                match build_side {
                    BuildSide::Left => vec![broadcast, any()],
                    BuildSide::Right => vec![any(), broadcast],
                }
            }
        },
        PhysicalOp::MergeJoin { condition, .. } => {
            let keys = match (inputs.first(), inputs.get(1)) {
                (Some(l), Some(r)) => equi_join_keys(condition, l, r),
                _ => vec![],
            };
            let (left, right): (Vec<Expr>, Vec<Expr>) = keys.into_iter().unzip();
            vec![
                PhysicalPropertySet::sorted_single(asc_keys(&left)),
                PhysicalPropertySet::sorted_single(asc_keys(&right)),
            ]
        }
        PhysicalOp::NestedLoopJoin { .. } => {
            vec![PhysicalPropertySet::single(), PhysicalPropertySet::single()]
        }
        PhysicalOp::HashAggregate { group_by, .. } => {
            if group_by.is_empty() {
                vec![PhysicalPropertySet::single()]
            } else {
                vec![PhysicalPropertySet::with_distribution(
                    Distribution::Hash(group_by.clone()),
                )]
            }
        }
        PhysicalOp::StreamAggregate { group_by, .. } => {
            if group_by.is_empty() {
                vec![PhysicalPropertySet::single()]
            } else {
                vec![PhysicalPropertySet::sorted_single(asc_keys(group_by))]
            }
        }
        PhysicalOp::SortOp { .. } => vec![PhysicalPropertySet::single()],
        PhysicalOp::UnionAll => inputs.iter().map(|_| any()).collect(),
        PhysicalOp::Exchange { .. } => vec![any()],
    }
}
