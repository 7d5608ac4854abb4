//! # Cascades Search
//!
//! The driver that turns a logical plan in the memo into the cheapest physical plan for a
//! required set of physical properties.
//!
//! ## Phases
//!
//! ```text
//! Initial -> Exploring -> CostingPhysical -> Extracting -> Done
//!               |              |
//!               +--> BudgetExceeded --> (greedy costing) --> Extracting
//! ```
//!
//! 1. **Exploring** repeats passes over the memo. Each pass applies every applicable rule
//!    to every group that is not yet explored: exploration rules first, then
//!    implementation rules, in registration order. A group is marked explored when a pass
//!    adds nothing to the memo through it; groups that gained members, and their parents,
//!    are reopened after each pass. The phase ends at a fixed point.
//! 2. **CostingPhysical** is top-down with memoization on `(group, required properties)`.
//!    Every physical alternative of a group derives the requirements it places on its
//!    inputs, optimizes those inputs first, and is priced bottom-up. Alternatives that
//!    cannot beat the current winner are pruned using the cost accumulated so far plus
//!    lower bounds of the remaining inputs. Enforcers (Sort, Exchange) are tried on top of
//!    the group itself under a weaker requirement.
//! 3. **Extracting** walks the recorded winners.
//!
//! ## Budget
//!
//! Every rule application is charged to a `SearchBudget` (iteration count plus optional
//! deadline). The budget is checked at the top of each exploration pass and before each
//! group. When it runs out the driver stops exploring and costs greedily: each remaining
//! group is implemented once and takes its first feasible alternative, so a valid plan
//! is still produced. The overrun is reported in `OptimizedPlan::budget_exceeded`.

use crate::catalog::Catalog;
use crate::cost::{Cost, CostModel};
use crate::error::{OptimizerResult, PlanError};
use crate::expr::*;
use crate::memo::{ExprId, GroupId, Memo, Winner};
use crate::pattern::{matches, Pattern};
use crate::plan::{LogicalPlan, PhysicalPlan};
use crate::properties::{child_requirements, provided_props, PhysicalPropertySet};
use crate::rule::{OptContext, Rule, RuleChild, RuleRegistry, RuleResult, RuleType};
use crate::stats::{self, DefaultSelectivityModel, SelectivityModel, Statistics};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Configuration knobs for the Cascades search.
///
/// `max_iterations` is the primary safety valve; `max_memo_groups` bounds memory.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Upper bound on the number of live groups in the memo.
    pub max_memo_groups: usize,
    /// Upper bound on the number of rule applications during exploration.
    pub max_iterations: usize,
    /// Wall-clock limit for the whole optimization.
    pub max_search_time: Option<Duration>,
    /// Connector/source type name used to select connector-specific rules.
    pub source_type: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_memo_groups: 100_000,
            max_iterations: 1_000_000,
            max_search_time: None,
            source_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    Initial,
    Exploring,
    CostingPhysical,
    BudgetExceeded,
    Extracting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetReason {
    Iterations,
    Deadline,
    MemoGroups,
}

/// Reported when the search stopped early. The plan returned alongside is valid but may
/// not be the cheapest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetExceeded {
    pub reason: BudgetReason,
    /// Rule applications performed before stopping.
    pub iterations: usize,
    /// Phase the search was in when the budget ran out.
    pub phase: SearchPhase,
}

/// Iteration counter plus optional deadline.
#[derive(Debug, Clone)]
pub struct SearchBudget {
    max_iterations: usize,
    used: usize,
    deadline: Option<Instant>,
}

impl SearchBudget {
    pub fn new(max_iterations: usize, max_time: Option<Duration>) -> Self {
        Self {
            max_iterations,
            used: 0,
            deadline: max_time.map(|d| Instant::now() + d),
        }
    }

    pub fn charge(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn exhausted(&self) -> Option<BudgetReason> {
        if self.used >= self.max_iterations {
            Some(BudgetReason::Iterations)
        } else if self.deadline_passed() {
            Some(BudgetReason::Deadline)
        } else {
            None
        }
    }
}

/// Result of a search.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizedPlan {
    pub plan: PhysicalPlan,
    pub cost: Cost,
    pub budget_exceeded: Option<BudgetExceeded>,
    pub phases: Vec<SearchPhase>,
}

/// The Cascades search engine.
///
/// Owns the memo for one optimization. Rules, cost model and catalog are shared and
/// read-only, so independent searches can run concurrently.
pub struct CascadesSearch {
    pub memo: Memo,
    pub rule_registry: Arc<RuleRegistry>,
    pub cost_model: Arc<dyn CostModel>,
    pub selectivity: Arc<dyn SelectivityModel>,
    pub catalog: Arc<dyn Catalog>,
    pub config: SearchConfig,
    budget: SearchBudget,
    phases: Vec<SearchPhase>,
    exceeded: Option<BudgetExceeded>,
    /// Set once the budget is gone: take the first feasible alternative.
    greedy: bool,
    in_progress: HashSet<(GroupId, PhysicalPropertySet)>,
    costed: HashSet<(GroupId, PhysicalPropertySet)>,
    implemented: HashSet<GroupId>,
    deriving: HashSet<GroupId>,
    /// Column order of the plan handed to `optimize_plan`.
    root_schema: Option<Schema>,
}

impl CascadesSearch {
    pub fn new(
        memo: Memo,
        rule_registry: Arc<RuleRegistry>,
        cost_model: Arc<dyn CostModel>,
        catalog: Arc<dyn Catalog>,
        config: SearchConfig,
    ) -> Self {
        let budget = SearchBudget::new(config.max_iterations, config.max_search_time);
        Self {
            memo,
            rule_registry,
            cost_model,
            selectivity: Arc::new(DefaultSelectivityModel),
            catalog,
            config,
            budget,
            phases: vec![SearchPhase::Initial],
            exceeded: None,
            greedy: false,
            in_progress: HashSet::new(),
            costed: HashSet::new(),
            implemented: HashSet::new(),
            deriving: HashSet::new(),
            root_schema: None,
        }
    }

    pub fn with_selectivity_model(mut self, model: Arc<dyn SelectivityModel>) -> Self {
        self.selectivity = model;
        self
    }

    pub fn phases(&self) -> &[SearchPhase] {
        &self.phases
    }

    pub fn budget(&self) -> &SearchBudget {
        &self.budget
    }

    /// Insert `plan` into the memo and optimize it. The result produces the plan's
    /// columns in the plan's order.
    pub fn optimize_plan(
        &mut self,
        plan: &LogicalPlan,
        required: &PhysicalPropertySet,
    ) -> OptimizerResult<OptimizedPlan> {
        let root = self.memo.insert_plan(plan)?;
        self.root_schema = Some(plan.schema().clone());
        self.optimize(root, required)
    }

    /// Run the search from `root` and extract the cheapest plan satisfying `required`.
    pub fn optimize(
        &mut self,
        root: GroupId,
        required: &PhysicalPropertySet,
    ) -> OptimizerResult<OptimizedPlan> {
        self.budget = SearchBudget::new(self.config.max_iterations, self.config.max_search_time);
        self.phases = vec![SearchPhase::Initial];
        self.exceeded = None;
        self.greedy = false;
        self.costed.clear();
        debug!(
            "Starting Cascades optimization: root_group={}, groups={}, exprs={}, required={}",
            root,
            self.memo.num_groups(),
            self.memo.num_exprs(),
            required
        );

        self.enter(SearchPhase::Exploring);
        self.explore()?;
        debug!(
            "Exploration finished: groups={}, exprs={}, merges={}, iterations={}",
            self.memo.num_groups(),
            self.memo.num_exprs(),
            self.memo.num_merges(),
            self.budget.used()
        );

        if self.exceeded.is_none() {
            self.enter(SearchPhase::CostingPhysical);
        }
        let root = self.memo.resolve(root);
        self.optimize_group(root, required)?;

        self.enter(SearchPhase::Extracting);
        let plan = self
            .memo
            .best_plan(root, required, self.cost_model.as_ref())?;
        let plan = self.restore_column_order(plan);
        self.enter(SearchPhase::Done);

        debug!(
            "Optimization complete: cost={:.1}, iterations={}",
            plan.cost.total,
            self.budget.used()
        );
        Ok(OptimizedPlan {
            cost: plan.cost,
            plan,
            budget_exceeded: self.exceeded.clone(),
            phases: self.phases.clone(),
        })
    }

    fn enter(&mut self, phase: SearchPhase) {
        trace!("Search phase {:?}", phase);
        self.phases.push(phase);
    }

    fn current_phase(&self) -> SearchPhase {
        self.phases.last().copied().unwrap_or(SearchPhase::Initial)
    }

    fn exceed(&mut self, reason: BudgetReason) {
        if self.exceeded.is_some() {
            return;
        }
        let phase = self.current_phase();
        warn!(
            "Search budget exceeded ({:?}) after {} iterations during {:?}; finishing greedily",
            reason,
            self.budget.used(),
            phase
        );
        self.exceeded = Some(BudgetExceeded {
            reason,
            iterations: self.budget.used(),
            phase,
        });
        self.greedy = true;
        self.enter(SearchPhase::BudgetExceeded);
    }

    /// `false` once the budget is gone.
    fn check_budget(&mut self) -> bool {
        if self.exceeded.is_some() {
            return false;
        }
        let reason = self.budget.exhausted().or_else(|| {
            (self.memo.num_groups() > self.config.max_memo_groups)
                .then_some(BudgetReason::MemoGroups)
        });
        match reason {
            Some(reason) => {
                self.exceed(reason);
                false
            }
            None => true,
        }
    }

    /// Exploration passes until a pass changes nothing or the budget runs out.
    fn explore(&mut self) -> OptimizerResult<()> {
        loop {
            if !self.check_budget() {
                return Ok(());
            }
            let mut progress = false;
            for gid in self.memo.group_ids() {
                if self.memo.resolve(gid) != gid || self.memo.group(gid).explored {
                    continue;
                }
                if !self.check_budget() {
                    return Ok(());
                }
                let before = (self.memo.num_exprs(), self.memo.num_merges());
                let applied = self.apply_rules(gid)?;
                let grew = (self.memo.num_exprs(), self.memo.num_merges()) != before;
                trace!("Explored group {}: {} rule applications, grew={}", gid, applied, grew);
                if grew {
                    progress = true;
                } else if self.memo.resolve(gid) == gid {
                    self.memo.group_mut(gid).explored = true;
                }
            }

            let changed = self.memo.take_changed();
            let parents = self.memo.parents_of(&changed);
            for &g in changed.iter().chain(parents.iter()) {
                self.memo.group_mut(g).explored = false;
            }
            if !progress && changed.is_empty() {
                return Ok(());
            }
        }
    }

    /// Apply every applicable rule to the logical expressions of `group`: exploration
    /// rules first, then implementation rules. Each application is charged to the
    /// budget. Returns the number of rules that fired.
    pub fn apply_rules(&mut self, group: GroupId) -> OptimizerResult<usize> {
        let registry = Arc::clone(&self.rule_registry);
        let catalog = Arc::clone(&self.catalog);
        let source = self.config.source_type.clone();
        let mut applied = 0;

        for rule_type in [RuleType::Transformation, RuleType::Implementation] {
            let rules = registry.rules_of(rule_type, source.as_deref());
            let exprs = self.memo.group(group).logical_exprs.clone();
            for expr_id in exprs {
                for rule in &rules {
                    if !self.fire(*rule, expr_id, catalog.as_ref())? {
                        continue;
                    }
                    applied += 1;
                    self.budget.charge();
                    if !self.check_budget() {
                        return Ok(applied);
                    }
                }
            }
        }
        Ok(applied)
    }

    /// Fire `rule` on `expr_id` unless it does not match or already fired on the same
    /// binding. Returns whether the rule ran.
    fn fire(
        &mut self,
        rule: &dyn Rule,
        expr_id: ExprId,
        catalog: &dyn Catalog,
    ) -> OptimizerResult<bool> {
        let expr = self.memo.expr(expr_id);
        let group = self.memo.resolve(expr.group);
        // Identity loops left behind by merges carry no information.
        if expr.children.contains(&group) {
            return Ok(false);
        }
        let pattern = rule.pattern();
        if !matches(&self.memo, expr_id, &pattern) {
            return Ok(false);
        }
        let key = self.binding_key(rule, expr_id, &pattern);
        if self.memo.rule_applied(expr_id, key) {
            return Ok(false);
        }
        self.memo.mark_rule_applied(expr_id, key);

        trace!("Applying rule '{}' to expr {} in group {}", rule.name(), expr_id, group);
        let ctx = OptContext { catalog };
        let results = rule.apply(self.memo.expr(expr_id), &self.memo, &ctx);
        for result in results {
            self.insert_result(group, result)?;
        }
        Ok(true)
    }

    /// Fingerprint of a rule firing. Rules whose pattern looks inside child groups fire
    /// again when those groups gain members, since new bindings may exist.
    fn binding_key(&self, rule: &dyn Rule, expr_id: ExprId, pattern: &Pattern) -> u64 {
        let Pattern::Operator(_, child_patterns) = pattern else {
            return rule.rule_hash();
        };
        if child_patterns.iter().all(|p| matches!(p, Pattern::Any)) {
            return rule.rule_hash();
        }
        let mut hasher = DefaultHasher::new();
        rule.rule_hash().hash(&mut hasher);
        for (&child, p) in self.memo.expr(expr_id).children.iter().zip(child_patterns) {
            if !matches!(p, Pattern::Any) {
                let g = self.memo.group(child);
                (g.id, g.logical_exprs.len()).hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn insert_result(&mut self, group: GroupId, result: RuleResult) -> OptimizerResult<()> {
        match result {
            RuleResult::Substitution(op, children) => {
                let eid = self.memo.add_expr_to_group(group, op, children)?;
                trace!("  Added expr {} to group {}", eid, group);
            }
            RuleResult::NewChildren(op, children) => {
                let mut ids = Vec::with_capacity(children.len());
                for child in children {
                    ids.push(self.insert_child(child)?);
                }
                let eid = self.memo.add_expr_to_group(group, op, ids)?;
                trace!("  Added expr {} to group {}", eid, group);
            }
            RuleResult::Equivalent(other) => {
                let merged = self.memo.merge(group, other)?;
                trace!("  Groups {} and {} are equivalent, now {}", group, other, merged);
            }
        }
        Ok(())
    }

    fn insert_child(&mut self, child: RuleChild) -> OptimizerResult<GroupId> {
        match child {
            RuleChild::Group(g) => Ok(self.memo.resolve(g)),
            RuleChild::NewExpr(op, children) => {
                let mut ids = Vec::with_capacity(children.len());
                for c in children {
                    ids.push(self.insert_child(c)?);
                }
                let description = op.to_string();
                let is_logical = op.is_logical();
                let (g, _) = self.memo.add_expr(op, ids);
                if is_logical && self.memo.group(g).schema().is_none() {
                    return Err(PlanError::InvalidPlan(format!(
                        "rule produced an ill-typed expression {}",
                        description
                    ))
                    .into());
                }
                Ok(g)
            }
        }
    }

    /// Run the implementation rules on `group` once. Not charged to the budget: a group
    /// must have physical alternatives for a plan to exist.
    fn implement(&mut self, group: GroupId) -> OptimizerResult<()> {
        if !self.implemented.insert(group) {
            return Ok(());
        }
        let registry = Arc::clone(&self.rule_registry);
        let catalog = Arc::clone(&self.catalog);
        let source = self.config.source_type.clone();
        let rules = registry.implementation_rules(source.as_deref());
        let exprs = self.memo.group(group).logical_exprs.clone();
        for expr_id in exprs {
            for rule in &rules {
                self.fire(*rule, expr_id, catalog.as_ref())?;
            }
        }
        Ok(())
    }

    /// Find the cheapest plan of `group` satisfying `required` and record it as the
    /// group's winner for that property set.
    fn optimize_group(
        &mut self,
        group: GroupId,
        required: &PhysicalPropertySet,
    ) -> OptimizerResult<()> {
        let group = self.memo.resolve(group);
        let required = &required.clone().normalized();
        let key = (group, required.clone());
        if self.costed.contains(&key) || self.in_progress.contains(&key) {
            return Ok(());
        }
        if self.greedy && self.memo.group(group).winner(required).is_some() {
            return Ok(());
        }
        self.in_progress.insert(key.clone());

        self.implement(group)?;
        self.derive_group_stats(group);

        let candidates = self.memo.group(group).physical_exprs.clone();
        for expr_id in candidates {
            let expr = self.memo.expr(expr_id);
            if expr.children.contains(&self.memo.resolve(expr.group)) {
                continue;
            }
            self.cost_candidate(group, expr_id, required)?;
            if self.greedy && self.memo.group(group).winner(required).is_some() {
                break;
            }
            if self.exceeded.is_none() && self.budget.deadline_passed() {
                self.exceed(BudgetReason::Deadline);
            }
        }

        if !(self.greedy && self.memo.group(group).winner(required).is_some()) {
            self.try_enforcer(group, required)?;
        }

        self.in_progress.remove(&key);
        self.costed.insert((self.memo.resolve(group), required.clone()));
        Ok(())
    }

    /// Price one physical alternative, optimizing its inputs first.
    fn cost_candidate(
        &mut self,
        group: GroupId,
        expr_id: ExprId,
        required: &PhysicalPropertySet,
    ) -> OptimizerResult<()> {
        let expr = self.memo.expr(expr_id).clone();
        let Operator::Physical(op) = &expr.op else {
            return Ok(());
        };
        let child_schemas: Vec<Schema> = expr
            .children
            .iter()
            .map(|&c| self.memo.group(c).schema().cloned().unwrap_or_default())
            .collect();
        let schema_refs: Vec<&Schema> = child_schemas.iter().collect();
        let child_props = child_requirements(op, required, &schema_refs);
        if child_props.len() != expr.children.len() {
            return Ok(());
        }

        let upper = self.memo.group(group).winner(required).map(|w| w.cost);
        let mut child_costs = Vec::with_capacity(expr.children.len());
        let mut child_provided = Vec::with_capacity(expr.children.len());
        let mut child_stats = Vec::with_capacity(expr.children.len());
        for (i, (&child, child_req)) in expr.children.iter().zip(&child_props).enumerate() {
            if let Some(upper) = upper {
                let spent = child_costs.iter().fold(Cost::zero(), |acc, c| acc + *c);
                let bound = expr.children[i..]
                    .iter()
                    .fold(spent, |acc, &c| acc + self.lower_bound(c));
                if bound >= upper {
                    trace!("  Pruned expr {} in group {}: {:.1} >= {:.1}", expr_id, group, bound.total, upper.total);
                    return Ok(());
                }
            }
            self.optimize_group(child, child_req)?;
            let child_group = self.memo.group(child);
            let Some(winner) = child_group.winner(child_req) else {
                trace!("  Expr {} infeasible: group {} has no plan for {}", expr_id, child, child_req);
                return Ok(());
            };
            child_costs.push(winner.cost);
            child_provided.push(winner.provided.clone());
            child_stats.push(child_group.stats.clone().unwrap_or_else(Statistics::unknown));
        }

        let own_stats;
        let stats_refs: Vec<&Statistics> = if expr.children.is_empty() {
            own_stats = self.derive_group_stats(group);
            vec![&own_stats]
        } else {
            child_stats.iter().collect()
        };
        let cost = self
            .cost_model
            .compute_cost(op, &stats_refs, &child_costs, required);
        let provided = provided_props(op, &child_provided, required);
        if !required.satisfied_by(&provided) {
            return Ok(());
        }

        let recorded = self.memo.record_winner(
            group,
            required.clone(),
            Winner {
                expr_id,
                cost,
                provided,
                child_props,
            },
        );
        if recorded {
            trace!(
                "  New best for group {} with props {}: {} cost={:.1}",
                group,
                required,
                op,
                cost.total
            );
        }
        Ok(())
    }

    /// A cost no plan of `group` can go below. Only trusted once the group's best plan
    /// under no requirement is final.
    fn lower_bound(&self, group: GroupId) -> Cost {
        let group = self.memo.resolve(group);
        if !self.greedy && self.costed.contains(&(group, PhysicalPropertySet::any())) {
            self.memo.group(group).lower_bound()
        } else {
            Cost::zero()
        }
    }

    /// Try satisfying `required` with an enforcer over the group's own output: a Sort
    /// (which also gathers into one stream) for an order, an Exchange for a distribution.
    fn try_enforcer(
        &mut self,
        group: GroupId,
        required: &PhysicalPropertySet,
    ) -> OptimizerResult<()> {
        let op = match (&required.sort_order, &required.distribution) {
            (Some(order), _) if !order.is_empty() => PhysicalOp::SortOp {
                order: order.clone(),
            },
            (_, Some(distribution)) => PhysicalOp::Exchange {
                distribution: distribution.clone(),
            },
            _ => return Ok(()),
        };
        let child_req = child_requirements(&op, required, &[])
            .into_iter()
            .next()
            .unwrap_or_default();
        if child_req == *required {
            return Ok(());
        }

        let expr_id = self
            .memo
            .add_expr_to_group(group, Operator::Physical(op.clone()), vec![group])?;
        self.optimize_group(group, &child_req)?;

        let g = self.memo.group(group);
        let Some(input) = g.winner(&child_req) else {
            return Ok(());
        };
        let stats = g.stats.clone().unwrap_or_else(Statistics::unknown);
        let cost = self
            .cost_model
            .compute_cost(&op, &[&stats], &[input.cost], required);
        let provided = provided_props(&op, std::slice::from_ref(&input.provided), required);
        if !required.satisfied_by(&provided) {
            return Ok(());
        }
        if self.memo.record_winner(
            group,
            required.clone(),
            Winner {
                expr_id,
                cost,
                provided,
                child_props: vec![child_req],
            },
        ) {
            trace!("  Enforcer {} wins group {} for {}: cost={:.1}", op, group, required, cost.total);
        }
        Ok(())
    }

    /// Derive (and cache) the statistics of a group from one of its logical expressions.
    /// All members are equivalent, so any one will do.
    fn derive_group_stats(&mut self, group: GroupId) -> Statistics {
        let group = self.memo.resolve(group);
        if let Some(stats) = &self.memo.group(group).stats {
            return stats.clone();
        }
        if !self.deriving.insert(group) {
            return Statistics::unknown();
        }
        let representative = self
            .memo
            .group(group)
            .logical_exprs
            .iter()
            .copied()
            .find(|&e| !self.memo.expr(e).children.contains(&group));
        let stats = match representative {
            Some(expr_id) => self.derive_expr_stats(expr_id),
            None => Statistics::unknown(),
        };
        self.deriving.remove(&group);

        let g = self.memo.group_mut(group);
        if let Some(props) = g.logical_props.as_mut() {
            props.row_count = Some(stats.row_count);
        }
        g.stats = Some(stats.clone());
        stats
    }

    fn derive_expr_stats(&mut self, expr_id: ExprId) -> Statistics {
        let expr = self.memo.expr(expr_id).clone();
        let Operator::Logical(op) = &expr.op else {
            return Statistics::unknown();
        };
        let inputs: Vec<Statistics> = expr
            .children
            .iter()
            .map(|&c| self.derive_group_stats(c))
            .collect();
        let input = |i: usize| inputs.get(i).cloned().unwrap_or_else(Statistics::unknown);

        match op {
            LogicalOp::Scan {
                table, predicate, ..
            } => {
                let base = self.catalog.get_table_stats(table).unwrap_or_else(|| {
                    debug!("No statistics for {}, using defaults", table);
                    Statistics::unknown()
                });
                match predicate {
                    Some(p) => {
                        let selectivity = self.selectivity.selectivity(p, &base);
                        stats::derive_filter_stats(&base, selectivity)
                    }
                    None => base,
                }
            }
            LogicalOp::Filter { predicate } => {
                let input = input(0);
                let selectivity = self.selectivity.selectivity(predicate, &input);
                stats::derive_filter_stats(&input, selectivity)
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => {
                let (left, right) = (input(0), input(1));
                let pairs = self.equi_join_columns(condition, &expr.children);
                let mut joined = stats::derive_join_stats(&left, &right, &pairs);
                if pairs.is_empty() && !condition.is_true_literal() {
                    let selectivity = self.selectivity.selectivity(condition, &joined);
                    joined = stats::derive_filter_stats(&joined, selectivity);
                }
                let matched = if left.row_count > 0.0 {
                    (joined.row_count / left.row_count).min(1.0)
                } else {
                    0.0
                };
                match join_type {
                    JoinType::Inner | JoinType::Cross => joined,
                    JoinType::Left => with_min_rows(joined, left.row_count),
                    JoinType::Right => with_min_rows(joined, right.row_count),
                    JoinType::Full => {
                        with_min_rows(joined, left.row_count.max(right.row_count))
                    }
                    JoinType::Semi => stats::derive_filter_stats(&left, matched),
                    JoinType::Anti => stats::derive_filter_stats(&left, 1.0 - matched),
                }
            }
            LogicalOp::Aggregate { group_by, .. } => {
                let group_cols: Vec<String> = group_by
                    .iter()
                    .map(|e| match e {
                        Expr::Column(c) => c.name.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                stats::derive_aggregate_stats(&input(0), &group_cols)
            }
            LogicalOp::Project { .. } | LogicalOp::Sort { .. } => input(0),
            LogicalOp::Limit { offset, count } => {
                stats::derive_limit_stats(&input(0), *offset, *count)
            }
            LogicalOp::EmptyRelation { .. } => Statistics::empty(),
            LogicalOp::Union { .. } => {
                let refs: Vec<&Statistics> = inputs.iter().collect();
                stats::derive_union_stats(&refs)
            }
        }
    }

    /// Equi-join column pairs `(left name, right name)`, oriented by the input schemas.
    fn equi_join_columns(&self, condition: &Expr, children: &[GroupId]) -> Vec<(String, String)> {
        let schema = |i: usize| {
            children
                .get(i)
                .and_then(|&c| self.memo.group(c).schema().cloned())
                .unwrap_or_default()
        };
        equi_join_keys(condition, &schema(0), &schema(1))
            .into_iter()
            .filter_map(|(l, r)| match (l, r) {
                (Expr::Column(l), Expr::Column(r)) => Some((l.name, r.name)),
                _ => None,
            })
            .collect()
    }

    /// Joins over commuted inputs list their columns in a different order than the plan
    /// that was inserted. Put them back with a projection.
    fn restore_column_order(&self, plan: PhysicalPlan) -> PhysicalPlan {
        match &self.root_schema {
            Some(root) => {
                trace!("Restoring root column order to {}", root);
                plan.reorder_to(root, self.cost_model.as_ref())
            }
            None => plan,
        }
    }
}

/// Outer joins keep every row of the preserved side.
fn with_min_rows(stats: Statistics, rows: f64) -> Statistics {
    if stats.row_count >= rows {
        return stats;
    }
    let avg = stats.avg_row_size();
    Statistics {
        row_count: rows,
        total_size_bytes: rows * avg,
        column_stats: stats.column_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::cost::DefaultCostModel;
    use crate::stats::ColumnStatistics;

    struct ImplScan;

    impl Rule for ImplScan {
        fn name(&self) -> &str {
            "ImplScan"
        }

        fn rule_type(&self) -> RuleType {
            RuleType::Implementation
        }

        fn pattern(&self) -> Pattern {
            Pattern::scan()
        }

        fn apply(&self, expr: &crate::memo::MemoExpr, _: &Memo, _: &OptContext) -> Vec<RuleResult> {
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
                    distribution: Distribution::Single,
                }),
                vec![],
            )]
        }
    }

    fn search(registry: RuleRegistry, config: SearchConfig) -> CascadesSearch {
        let table = TableRef::new("s", "t");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(
            &table,
            vec![Field::new(Some("t"), "a", DataType::Int64, false)],
            Statistics::new(500.0, 50_000.0).with_column("a", ColumnStatistics::new(50.0, 0.0)),
        );
        CascadesSearch::new(
            Memo::new(),
            Arc::new(registry),
            Arc::new(DefaultCostModel::default()),
            Arc::new(catalog),
            config,
        )
    }

    fn scan_plan() -> LogicalPlan {
        LogicalPlan::scan(
            TableRef::new("s", "t"),
            vec![Field::new(Some("t"), "a", DataType::Int64, false)],
        )
        .unwrap()
    }

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.max_memo_groups, 100_000);
        assert_eq!(config.max_iterations, 1_000_000);
        assert!(config.max_search_time.is_none());
        assert!(config.source_type.is_none());
    }

    #[test]
    fn test_budget_accounting() {
        let mut budget = SearchBudget::new(2, None);
        assert_eq!(budget.exhausted(), None);
        budget.charge();
        budget.charge();
        assert_eq!(budget.exhausted(), Some(BudgetReason::Iterations));

        let expired = SearchBudget::new(10, Some(Duration::ZERO));
        assert_eq!(expired.exhausted(), Some(BudgetReason::Deadline));
    }

    #[test]
    fn test_phase_history() {
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(ImplScan));
        let mut search = search(registry, SearchConfig::default());
        let result = search
            .optimize_plan(&scan_plan(), &PhysicalPropertySet::any())
            .unwrap();
        assert!(result.budget_exceeded.is_none());
        assert_eq!(
            result.phases,
            vec![
                SearchPhase::Initial,
                SearchPhase::Exploring,
                SearchPhase::CostingPhysical,
                SearchPhase::Extracting,
                SearchPhase::Done
            ]
        );
        assert_eq!(result.plan.row_count, 500.0);
    }

    #[test]
    fn test_sort_requirement_adds_enforcer_in_memo() {
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(ImplScan));
        let mut search = search(registry, SearchConfig::default());
        let required = PhysicalPropertySet::with_sort(vec![SortKey::asc(col("t", "a"))]);
        let result = search.optimize_plan(&scan_plan(), &required).unwrap();
        assert_eq!(result.plan.op.kind(), PhysicalOpKind::SortOp);
        assert_eq!(result.plan.children[0].op.kind(), PhysicalOpKind::SeqScan);
        assert!(result.cost > result.plan.children[0].cost);
        assert!(required.satisfied_by(&result.plan.provided));
    }

    #[test]
    fn test_zero_budget_reports_overrun() {
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(ImplScan));
        let config = SearchConfig {
            max_iterations: 0,
            ..Default::default()
        };
        let mut search = search(registry, config);
        let result = search
            .optimize_plan(&scan_plan(), &PhysicalPropertySet::any())
            .unwrap();
        let exceeded = result.budget_exceeded.unwrap();
        assert_eq!(exceeded.reason, BudgetReason::Iterations);
        assert_eq!(exceeded.phase, SearchPhase::Exploring);
        assert!(result.phases.contains(&SearchPhase::BudgetExceeded));
        assert!(!result.phases.contains(&SearchPhase::CostingPhysical));
        assert_eq!(result.plan.op.kind(), PhysicalOpKind::SeqScan);
    }
}
