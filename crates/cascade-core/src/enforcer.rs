//! # Property Enforcement
//!
//! When a plan does not produce the physical properties its consumer needs, an enforcer is
//! placed on top of it:
//!
//! - **Sort** establishes an order. It also gathers its input into a single stream, so it
//!   settles any distribution requirement at the same time. A partitioned input is first
//!   gathered with `Exchange(single)`.
//! - **Exchange** redistributes rows when only the distribution is wrong.
//!
//! Enforcers are priced through the cost model like any other operator, so their cost is
//! strictly added on top of the plan they wrap. The search applies the same decisions
//! inside the memo; `enforce` is the standalone form used on already extracted plans.

use crate::cost::CostModel;
use crate::expr::{Distribution, PhysicalOp};
use crate::plan::PhysicalPlan;
use crate::properties::{provided_props, PhysicalPropertySet};
use crate::stats::Statistics;

/// The enforcer operators, bottom-up, needed to turn `provided` into something that
/// satisfies `required`. Empty when nothing needs enforcing.
pub fn enforcer_ops(
    provided: &PhysicalPropertySet,
    required: &PhysicalPropertySet,
) -> Vec<PhysicalOp> {
    if required.satisfied_by(provided) {
        return vec![];
    }
    let order_ok = PhysicalPropertySet {
        sort_order: required.sort_order.clone(),
        distribution: None,
    }
    .satisfied_by(provided);

    match required.sort_order {
        Some(ref order) if !order.is_empty() && !(order_ok && required.distribution.is_none()) => {
            let mut ops = Vec::with_capacity(2);
            if provided.distribution != Some(Distribution::Single) {
                ops.push(PhysicalOp::Exchange {
                    distribution: Distribution::Single,
                });
            }
            ops.push(PhysicalOp::SortOp {
                order: order.clone(),
            });
            ops
        }
        _ => match required.distribution {
            Some(ref d) => vec![PhysicalOp::Exchange {
                distribution: d.clone(),
            }],
            None => vec![],
        },
    }
}

/// Wrap `plan` so its output satisfies `required`. Returns the plan unchanged when it
/// already does.
pub fn enforce(
    plan: PhysicalPlan,
    required: &PhysicalPropertySet,
    cost_model: &dyn CostModel,
) -> PhysicalPlan {
    let mut plan = plan;
    for op in enforcer_ops(&plan.provided, required) {
        let stats = Statistics::new(
            plan.row_count,
            plan.row_count * crate::stats::DEFAULT_ROW_SIZE,
        );
        let cost = cost_model.compute_cost(&op, &[&stats], &[plan.cost], required);
        let provided = provided_props(&op, std::slice::from_ref(&plan.provided), required);
        let row_count = plan.row_count;
        let schema = plan.schema.clone();
        plan = PhysicalPlan {
            op,
            children: vec![plan],
            cost,
            row_count,
            provided,
            schema,
        };
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{Cost, DefaultCostModel};
    use crate::expr::*;

    fn scan(distribution: Distribution) -> PhysicalPlan {
        PhysicalPlan {
            op: PhysicalOp::SeqScan {
                table: TableRef::new("s", "t"),
                columns: vec![Field::new(Some("t"), "a", DataType::Int64, false)],
                predicate: None,
                distribution: distribution.clone(),
            },
            children: vec![],
            cost: Cost::new(1000.0),
            row_count: 1000.0,
            provided: PhysicalPropertySet::with_distribution(distribution),
            schema: Schema::empty(),
        }
    }

    fn order() -> Vec<SortKey> {
        vec![SortKey::asc(col("t", "a"))]
    }

    #[test]
    fn test_enforce_is_identity_when_satisfied() {
        let model = DefaultCostModel::default();
        let plan = scan(Distribution::Single);
        let required = PhysicalPropertySet::single();
        assert_eq!(enforce(plan.clone(), &required, &model), plan);
        assert_eq!(enforce(plan.clone(), &PhysicalPropertySet::any(), &model), plan);
    }

    #[test]
    fn test_sort_enforcer_is_additive() {
        let model = DefaultCostModel::default();
        let plan = scan(Distribution::Single);
        let required = PhysicalPropertySet::with_sort(order());
        let enforced = enforce(plan.clone(), &required, &model);
        assert_eq!(enforced.op.kind(), PhysicalOpKind::SortOp);
        assert_eq!(enforced.count(PhysicalOpKind::SortOp), 1);
        assert_eq!(enforced.children[0], plan);
        assert!(enforced.cost > plan.cost);
        assert!(required.satisfied_by(&enforced.provided));
    }

    #[test]
    fn test_partitioned_input_is_gathered_before_sorting() {
        let model = DefaultCostModel::default();
        let plan = scan(Distribution::Hash(vec![col("t", "a")]));
        let enforced = enforce(plan, &PhysicalPropertySet::with_sort(order()), &model);
        assert_eq!(enforced.op.kind(), PhysicalOpKind::SortOp);
        assert_eq!(enforced.children[0].op.kind(), PhysicalOpKind::Exchange);
    }

    #[test]
    fn test_distribution_only_uses_exchange() {
        let model = DefaultCostModel::default();
        let plan = scan(Distribution::RoundRobin);
        let required = PhysicalPropertySet::with_distribution(Distribution::Hash(vec![col("t", "a")]));
        let enforced = enforce(plan.clone(), &required, &model);
        assert_eq!(
            enforced.op,
            PhysicalOp::Exchange {
                distribution: Distribution::Hash(vec![col("t", "a")])
            }
        );
        assert!(enforced.cost > plan.cost);
        assert!(required.satisfied_by(&enforced.provided));
    }
}
