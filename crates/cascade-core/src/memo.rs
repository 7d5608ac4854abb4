//! # The Memo
//!
//! The memo compactly represents every plan the optimizer has considered. It is an arena
//! of **groups**, each a set of logically equivalent **expressions** (operators whose
//! inputs are other groups rather than concrete sub-plans). A group with `n` alternatives
//! whose children have `m` alternatives each stands for `n * m^k` plans without storing
//! any of them explicitly.
//!
//! ## Identity and Deduplication
//!
//! Groups and expressions are addressed by dense integer ids. An expression is identified
//! by its operator plus its (canonical) child group ids; inserting an identical expression
//! again returns the existing one. Inserting the same plan twice yields the same group.
//!
//! ## Merging
//!
//! A rule may discover that two groups are equivalent, for instance when it generates an
//! expression that already lives in another group. The groups are then merged: the higher
//! id is redirected to the lower one through a union-find table, members and winners are
//! moved over, every child reference is rewritten, and the dedup index is rebuilt. Rebuilding
//! can reveal further identical expressions in different groups, which are merged in turn.
//!
//! ## Winners
//!
//! Each group records, per required `PhysicalPropertySet`, the cheapest physical
//! expression found so far together with the properties it provides and the requirements
//! it placed on each child. `best_plan` walks these records to rebuild the final tree.

use crate::cost::{Cost, CostModel};
use crate::error::{OptimizerError, OptimizerResult, PlanError};
use crate::expr::{LogicalOp, Operator, PhysicalOp, Schema};
use crate::plan::{LogicalPlan, PhysicalPlan};
use crate::properties::{LogicalProperties, PhysicalPropertySet};
use crate::stats::{Statistics, DEFAULT_ROW_COUNT};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::trace;

pub type GroupId = u32;
pub type ExprId = u32;

/// An operator whose inputs are memo groups.
#[derive(Debug, Clone)]
pub struct MemoExpr {
    pub op: Operator,
    pub children: Vec<GroupId>,
    /// Owning group. Kept canonical across merges.
    pub group: GroupId,
}

/// Best physical alternative of a group for one required property set.
#[derive(Debug, Clone)]
pub struct Winner {
    pub expr_id: ExprId,
    pub cost: Cost,
    pub provided: PhysicalPropertySet,
    /// What was required of each child when this alternative was priced.
    pub child_props: Vec<PhysicalPropertySet>,
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub id: GroupId,
    pub logical_exprs: Vec<ExprId>,
    pub physical_exprs: Vec<ExprId>,
    pub best_plan: HashMap<PhysicalPropertySet, Winner>,
    /// Set once an exploration pass adds nothing new to this group.
    pub explored: bool,
    pub logical_props: Option<LogicalProperties>,
    pub stats: Option<Statistics>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.logical_props.as_ref().map(|p| &p.schema)
    }

    pub fn winner(&self, required: &PhysicalPropertySet) -> Option<&Winner> {
        if required.has_empty_order() {
            return self.best_plan.get(&required.clone().normalized());
        }
        self.best_plan.get(required)
    }

    /// A cost no plan of this group can beat: the best plan under no requirement, once
    /// known.
    pub fn lower_bound(&self) -> Cost {
        self.best_plan
            .get(&PhysicalPropertySet::any())
            .map(|w| w.cost)
            .unwrap_or_else(Cost::zero)
    }

    pub fn row_count(&self) -> f64 {
        self.stats
            .as_ref()
            .map(|s| s.row_count)
            .unwrap_or(DEFAULT_ROW_COUNT)
    }
}

#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    exprs: Vec<MemoExpr>,
    /// Union-find table, kept flat: every entry points directly at its representative.
    redirect: Vec<GroupId>,
    expr_index: HashMap<(Operator, Vec<GroupId>), ExprId>,
    applied_rules: HashSet<(ExprId, u64)>,
    /// Groups that gained members since the last `take_changed`.
    changed: HashSet<GroupId>,
    merges: usize,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical id of a (possibly merged-away) group.
    pub fn resolve(&self, group: GroupId) -> GroupId {
        self.redirect[group as usize]
    }

    pub fn group(&self, group: GroupId) -> &Group {
        &self.groups[self.resolve(group) as usize]
    }

    pub fn group_mut(&mut self, group: GroupId) -> &mut Group {
        let id = self.resolve(group);
        &mut self.groups[id as usize]
    }

    pub fn expr(&self, expr: ExprId) -> &MemoExpr {
        &self.exprs[expr as usize]
    }

    /// Number of live (not merged-away) groups.
    pub fn num_groups(&self) -> usize {
        self.redirect
            .iter()
            .enumerate()
            .filter(|(i, r)| *i as GroupId == **r)
            .count()
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    pub fn num_merges(&self) -> usize {
        self.merges
    }

    /// Ids of all live groups, ascending.
    pub fn group_ids(&self) -> Vec<GroupId> {
        (0..self.redirect.len() as GroupId)
            .filter(|&g| self.redirect[g as usize] == g)
            .collect()
    }

    pub fn rule_applied(&self, expr: ExprId, rule_hash: u64) -> bool {
        self.applied_rules.contains(&(expr, rule_hash))
    }

    pub fn mark_rule_applied(&mut self, expr: ExprId, rule_hash: u64) {
        self.applied_rules.insert((expr, rule_hash));
    }

    /// Insert a validated plan tree bottom-up, reusing existing groups for identical
    /// sub-plans.
    pub fn insert_plan(&mut self, plan: &LogicalPlan) -> OptimizerResult<GroupId> {
        let mut children = Vec::with_capacity(plan.inputs().len());
        for input in plan.inputs() {
            children.push(self.insert_plan(input)?);
        }
        let (group, _) = self.add_expr(Operator::Logical(plan.op().clone()), children);
        match self.group(group).schema() {
            Some(schema) if schema.same_columns(plan.schema()) => Ok(group),
            _ => Err(OptimizerError::Plan(PlanError::InvalidPlan(format!(
                "memo group {} does not produce {}",
                group,
                plan.schema()
            )))),
        }
    }

    /// Add an expression, creating a new group unless an identical expression exists.
    pub fn add_expr(&mut self, op: Operator, children: Vec<GroupId>) -> (GroupId, ExprId) {
        let children: Vec<GroupId> = children.into_iter().map(|c| self.resolve(c)).collect();
        if let Some(&eid) = self.expr_index.get(&(op.clone(), children.clone())) {
            return (self.exprs[eid as usize].group, eid);
        }

        let gid = self.groups.len() as GroupId;
        let mut group = Group::new(gid);
        group.logical_props = self.derive_logical_props(&op, &children);
        let is_logical = op.is_logical();
        let eid = self.push_expr(op, children, gid);
        if is_logical {
            group.logical_exprs.push(eid);
        } else {
            group.physical_exprs.push(eid);
        }
        self.groups.push(group);
        self.redirect.push(gid);
        self.changed.insert(gid);
        trace!(group = gid, expr = eid, "new group");
        (gid, eid)
    }

    /// Add an expression to an existing group. If the expression already lives in a
    /// different group, the two groups are equivalent and get merged.
    pub fn add_expr_to_group(
        &mut self,
        group: GroupId,
        op: Operator,
        children: Vec<GroupId>,
    ) -> OptimizerResult<ExprId> {
        let group = self.resolve(group);
        let children: Vec<GroupId> = children.into_iter().map(|c| self.resolve(c)).collect();
        if let Some(&eid) = self.expr_index.get(&(op.clone(), children.clone())) {
            let existing = self.exprs[eid as usize].group;
            if existing != group {
                self.merge(group, existing)?;
            }
            return Ok(eid);
        }

        if let Some(props) = self.derive_logical_props(&op, &children) {
            if let Some(schema) = self.groups[group as usize].schema() {
                if !schema.same_columns(&props.schema) {
                    return Err(OptimizerError::Plan(PlanError::InvalidPlan(format!(
                        "{} produces {} but group {} produces {}",
                        op, props.schema, group, schema
                    ))));
                }
            }
        }

        let is_logical = op.is_logical();
        let eid = self.push_expr(op, children, group);
        let target = &mut self.groups[group as usize];
        if is_logical {
            target.logical_exprs.push(eid);
        } else {
            target.physical_exprs.push(eid);
        }
        self.changed.insert(group);
        Ok(eid)
    }

    fn push_expr(&mut self, op: Operator, children: Vec<GroupId>, group: GroupId) -> ExprId {
        let eid = self.exprs.len() as ExprId;
        self.expr_index.insert((op.clone(), children.clone()), eid);
        self.exprs.push(MemoExpr {
            op,
            children,
            group,
        });
        eid
    }

    fn derive_logical_props(
        &self,
        op: &Operator,
        children: &[GroupId],
    ) -> Option<LogicalProperties> {
        let Operator::Logical(op) = op else {
            return None;
        };
        let schemas: Option<Vec<&Schema>> =
            children.iter().map(|&c| self.group(c).schema()).collect();
        match op.derive_schema(&schemas?) {
            Ok(schema) => Some(LogicalProperties {
                schema,
                row_count: None,
            }),
            Err(e) => {
                trace!(error = %e, "cannot derive schema for {}", op);
                None
            }
        }
    }

    /// Merge two equivalent groups and return the surviving id.
    ///
    /// Fails only when the groups produce different columns, which means a rule
    /// generated a non-equivalent expression.
    pub fn merge(&mut self, a: GroupId, b: GroupId) -> OptimizerResult<GroupId> {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return Ok(a);
        }
        let (into, from) = if a < b { (a, b) } else { (b, a) };
        if let (Some(x), Some(y)) = (
            self.groups[into as usize].schema(),
            self.groups[from as usize].schema(),
        ) {
            if !x.same_columns(y) {
                return Err(OptimizerError::MergeInvariant { into, from });
            }
        }
        trace!(into, from, "merge groups");

        let absorbed = std::mem::replace(&mut self.groups[from as usize], Group::new(from));
        for &eid in absorbed.logical_exprs.iter().chain(&absorbed.physical_exprs) {
            self.exprs[eid as usize].group = into;
        }
        let target = &mut self.groups[into as usize];
        target.logical_exprs.extend(absorbed.logical_exprs);
        target.physical_exprs.extend(absorbed.physical_exprs);
        for (props, winner) in absorbed.best_plan {
            match target.best_plan.get(&props) {
                Some(kept) if kept.cost <= winner.cost => {}
                _ => {
                    target.best_plan.insert(props, winner);
                }
            }
        }
        target.explored = false;
        if target.logical_props.is_none() {
            target.logical_props = absorbed.logical_props;
        }
        if target.stats.is_none() {
            target.stats = absorbed.stats;
        }

        for r in self.redirect.iter_mut() {
            if *r == from {
                *r = into;
            }
        }
        let redirect = &self.redirect;
        for e in self.exprs.iter_mut() {
            for c in e.children.iter_mut() {
                *c = redirect[*c as usize];
            }
        }
        self.merges += 1;
        self.changed.insert(into);

        for (x, y) in self.rebuild_index() {
            self.merge(x, y)?;
        }
        Ok(self.resolve(into))
    }

    /// Re-key the dedup index after child ids changed. Identical expressions within one
    /// group are dropped from its member lists; identical expressions in different groups
    /// are returned as pending merges.
    fn rebuild_index(&mut self) -> Vec<(GroupId, GroupId)> {
        self.expr_index.clear();
        let mut pending = Vec::new();
        let mut duplicates = Vec::new();
        for (i, e) in self.exprs.iter().enumerate() {
            let eid = i as ExprId;
            match self.expr_index.entry((e.op.clone(), e.children.clone())) {
                Entry::Occupied(o) => {
                    let other = self.exprs[*o.get() as usize].group;
                    if other == e.group {
                        duplicates.push((e.group, eid));
                    } else {
                        pending.push((other, e.group));
                    }
                }
                Entry::Vacant(v) => {
                    v.insert(eid);
                }
            }
        }
        for (group, eid) in duplicates {
            let g = &mut self.groups[group as usize];
            g.logical_exprs.retain(|&x| x != eid);
            g.physical_exprs.retain(|&x| x != eid);
        }
        pending
    }

    /// Groups that gained members (or absorbed another group) since the last call.
    pub fn take_changed(&mut self) -> HashSet<GroupId> {
        let changed = std::mem::take(&mut self.changed);
        changed.into_iter().map(|g| self.resolve(g)).collect()
    }

    /// Live groups with at least one expression reading from one of `children`.
    pub fn parents_of(&self, children: &HashSet<GroupId>) -> HashSet<GroupId> {
        let mut parents = HashSet::new();
        for gid in self.group_ids() {
            let group = &self.groups[gid as usize];
            let reads = group
                .logical_exprs
                .iter()
                .chain(&group.physical_exprs)
                .any(|&e| {
                    self.exprs[e as usize]
                        .children
                        .iter()
                        .any(|c| children.contains(c))
                });
            if reads {
                parents.insert(gid);
            }
        }
        parents
    }

    /// Record `winner` for `required` if it is strictly cheaper than the current one.
    pub fn record_winner(
        &mut self,
        group: GroupId,
        required: PhysicalPropertySet,
        winner: Winner,
    ) -> bool {
        let required = required.normalized();
        let g = self.group_mut(group);
        match g.best_plan.get(&required) {
            Some(current) if current.cost <= winner.cost => false,
            _ => {
                g.best_plan.insert(required, winner);
                true
            }
        }
    }

    /// Rebuild the cheapest physical plan for `group` under `required` from the recorded
    /// winners.
    ///
    /// Inputs of positional operators (`UnionAll`) are put back into the column order of
    /// their group; `cost_model` prices the projections this adds.
    pub fn best_plan(
        &self,
        group: GroupId,
        required: &PhysicalPropertySet,
        cost_model: &dyn CostModel,
    ) -> OptimizerResult<PhysicalPlan> {
        let mut visiting = Vec::new();
        let (plan, _) = self.extract(group, required, cost_model, &mut visiting)?;
        Ok(plan)
    }

    /// Returns the plan and the cost added below it by reordering projections.
    fn extract(
        &self,
        group: GroupId,
        required: &PhysicalPropertySet,
        cost_model: &dyn CostModel,
        visiting: &mut Vec<(GroupId, PhysicalPropertySet)>,
    ) -> OptimizerResult<(PhysicalPlan, f64)> {
        let gid = self.resolve(group);
        let g = &self.groups[gid as usize];
        let winner = g
            .winner(required)
            .ok_or_else(|| OptimizerError::NoPlanFound {
                group: gid,
                required: required.clone(),
            })?;
        let key = (gid, required.clone());
        if visiting.contains(&key) {
            return Err(OptimizerError::CycleDetected(gid));
        }
        visiting.push(key);

        let expr = &self.exprs[winner.expr_id as usize];
        let Operator::Physical(op) = &expr.op else {
            return Err(OptimizerError::NoPlanFound {
                group: gid,
                required: required.clone(),
            });
        };
        let positional = matches!(op, PhysicalOp::UnionAll);
        let mut children = Vec::with_capacity(expr.children.len());
        let mut added = 0.0;
        for (child, props) in expr.children.iter().zip(&winner.child_props) {
            let (mut plan, below) = self.extract(*child, props, cost_model, visiting)?;
            added += below;
            if positional {
                if let Some(declared) = self.group(*child).schema() {
                    let before = plan.cost.total;
                    plan = plan.reorder_to(declared, cost_model);
                    added += plan.cost.total - before;
                }
            }
            children.push(plan);
        }
        visiting.pop();

        let schema = physical_output_schema(op, &children)
            .or_else(|| g.schema().cloned())
            .unwrap_or_default();
        let plan = PhysicalPlan {
            op: op.clone(),
            children,
            cost: winner.cost + Cost::new(added),
            row_count: g.row_count(),
            provided: winner.provided.clone(),
            schema,
        };
        Ok((plan, added))
    }
}

/// Column order actually produced by a physical operator over extracted inputs. Group
/// schemas ignore column order, so a commuted join lists its columns differently from the
/// group it lives in. `None` for operators whose output is fixed by the group.
fn physical_output_schema(op: &PhysicalOp, children: &[PhysicalPlan]) -> Option<Schema> {
    let inputs: Vec<&Schema> = children.iter().map(|c| &c.schema).collect();
    match op {
        PhysicalOp::HashJoin {
            join_type,
            condition,
            ..
        }
        | PhysicalOp::MergeJoin {
            join_type,
            condition,
        }
        | PhysicalOp::NestedLoopJoin {
            join_type,
            condition,
        } => LogicalOp::Join {
            join_type: *join_type,
            condition: condition.clone(),
        }
        .derive_schema(&inputs)
        .ok(),
        PhysicalOp::Filter { .. }
        | PhysicalOp::Limit { .. }
        | PhysicalOp::SortOp { .. }
        | PhysicalOp::Exchange { .. } => inputs.first().map(|s| (*s).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::DefaultCostModel;
    use crate::expr::*;

    fn fields(q: &str) -> Vec<Field> {
        vec![
            Field::new(Some(q), "id", DataType::Int64, false),
            Field::new(Some(q), "v", DataType::Int64, true),
        ]
    }

    fn scan(table: &str, q: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef::new("s", table),
            columns: fields(q),
            predicate: None,
        })
    }

    fn filter(q: &str) -> Operator {
        Operator::Logical(LogicalOp::Filter {
            predicate: binary(col(q, "v"), BinaryOp::Gt, lit(ScalarValue::Int64(1))),
        })
    }

    fn winner(expr_id: ExprId, cost: f64) -> Winner {
        Winner {
            expr_id,
            cost: Cost::new(cost),
            provided: PhysicalPropertySet::any(),
            child_props: vec![],
        }
    }

    #[test]
    fn test_insert_plan_is_idempotent() {
        let plan = LogicalPlan::scan(TableRef::new("s", "t"), fields("t"))
            .unwrap()
            .filter(binary(col("t", "v"), BinaryOp::Gt, lit(ScalarValue::Int64(1))))
            .unwrap();
        let mut memo = Memo::new();
        let g1 = memo.insert_plan(&plan).unwrap();
        let (groups, exprs) = (memo.num_groups(), memo.num_exprs());
        let g2 = memo.insert_plan(&plan.clone()).unwrap();
        assert_eq!(g1, g2);
        assert_eq!(memo.num_groups(), groups);
        assert_eq!(memo.num_exprs(), exprs);
    }

    #[test]
    fn test_duplicate_in_other_group_triggers_merge() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("t1", "x"), vec![]);
        let (b, _) = memo.add_expr(scan("t2", "x"), vec![]);
        memo.add_expr_to_group(b, scan("t1", "x"), vec![]).unwrap();
        assert_eq!(memo.resolve(a), memo.resolve(b));
        assert_eq!(memo.num_groups(), 1);
        assert_eq!(memo.group(b).logical_exprs.len(), 2);
    }

    #[test]
    fn test_merge_keeps_cheapest_winner_per_property() {
        let mut memo = Memo::new();
        let (a, ea) = memo.add_expr(scan("t1", "x"), vec![]);
        let (b, eb) = memo.add_expr(scan("t2", "x"), vec![]);
        let sorted = PhysicalPropertySet::with_sort(vec![SortKey::asc(col("x", "id"))]);
        memo.record_winner(a, PhysicalPropertySet::any(), winner(ea, 10.0));
        memo.record_winner(b, PhysicalPropertySet::any(), winner(eb, 5.0));
        memo.record_winner(b, sorted.clone(), winner(eb, 7.0));

        let merged = memo.merge(a, b).unwrap();
        assert_eq!(merged, a.min(b));
        let g = memo.group(merged);
        assert_eq!(g.winner(&PhysicalPropertySet::any()).unwrap().cost, Cost::new(5.0));
        assert_eq!(g.winner(&sorted).unwrap().cost, Cost::new(7.0));
        assert_eq!(g.lower_bound(), Cost::new(5.0));
    }

    #[test]
    fn test_empty_sort_order_shares_the_unsorted_winner() {
        let mut memo = Memo::new();
        let (g, e) = memo.add_expr(scan("t", "x"), vec![]);
        let empty = PhysicalPropertySet {
            sort_order: Some(vec![]),
            distribution: None,
        };
        assert!(memo.record_winner(g, empty.clone(), winner(e, 3.0)));
        assert!(!memo.record_winner(g, PhysicalPropertySet::any(), winner(e, 3.0)));
        assert_eq!(memo.group(g).best_plan.len(), 1);
        assert_eq!(memo.group(g).winner(&PhysicalPropertySet::any()).unwrap().cost, Cost::new(3.0));
        assert_eq!(memo.group(g).winner(&empty).unwrap().cost, Cost::new(3.0));
    }

    #[test]
    fn test_winner_within_epsilon_is_not_cheaper() {
        let mut memo = Memo::new();
        let (g, e) = memo.add_expr(scan("t", "x"), vec![]);
        assert!(memo.record_winner(g, PhysicalPropertySet::any(), winner(e, 0.1)));
        assert!(!memo.record_winner(
            g,
            PhysicalPropertySet::any(),
            winner(e, 0.1 - f64::EPSILON / 4.0)
        ));
        assert!(memo.record_winner(g, PhysicalPropertySet::any(), winner(e, 0.05)));
    }

    #[test]
    fn test_merge_rewrites_references_and_cascades() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("t1", "x"), vec![]);
        let (b, _) = memo.add_expr(scan("t2", "x"), vec![]);
        let (fa, _) = memo.add_expr(filter("x"), vec![a]);
        let (fb, _) = memo.add_expr(filter("x"), vec![b]);
        assert_ne!(fa, fb);

        memo.merge(a, b).unwrap();
        // Both filters now read the same group, so their groups are equivalent too.
        assert_eq!(memo.resolve(fa), memo.resolve(fb));
        assert_eq!(memo.group(fa).logical_exprs.len(), 1);
        for gid in memo.group_ids() {
            for &e in &memo.group(gid).logical_exprs {
                for &c in &memo.expr(e).children {
                    assert_eq!(memo.resolve(c), c, "child references must be canonical");
                }
            }
        }
        // Re-adding the old shape finds the merged expression.
        let (g, _) = memo.add_expr(filter("x"), vec![b]);
        assert_eq!(g, memo.resolve(fa));
    }

    #[test]
    fn test_merge_rejects_different_columns() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("t1", "x"), vec![]);
        let (b, _) = memo.add_expr(scan("t2", "y"), vec![]);
        assert!(matches!(
            memo.merge(a, b),
            Err(OptimizerError::MergeInvariant { .. })
        ));
    }

    #[test]
    fn test_best_plan_reports_missing_winner_and_cycles() {
        let mut memo = Memo::new();
        let (g, _) = memo.add_expr(scan("t", "t"), vec![]);
        assert!(matches!(
            memo.best_plan(g, &PhysicalPropertySet::any(), &DefaultCostModel::default()),
            Err(OptimizerError::NoPlanFound { .. })
        ));

        let looping = memo
            .add_expr_to_group(
                g,
                Operator::Physical(PhysicalOp::Filter {
                    predicate: lit(ScalarValue::Bool(true)),
                }),
                vec![g],
            )
            .unwrap();
        memo.record_winner(
            g,
            PhysicalPropertySet::any(),
            Winner {
                expr_id: looping,
                cost: Cost::new(1.0),
                provided: PhysicalPropertySet::any(),
                child_props: vec![PhysicalPropertySet::any()],
            },
        );
        assert!(matches!(
            memo.best_plan(g, &PhysicalPropertySet::any(), &DefaultCostModel::default()),
            Err(OptimizerError::CycleDetected(_))
        ));
    }
}
