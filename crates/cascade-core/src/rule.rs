//! # Rule System
//!
//! ## Rule Types
//!
//! - **Exploration rules** (`RuleType::Transformation`) rewrite a logical expression into
//!   equivalent logical alternatives: join commutativity, predicate pushdown, replacing a
//!   `LIMIT 0` with an empty relation.
//! - **Implementation rules** (`RuleType::Implementation`) map a logical expression onto
//!   physical alternatives: a logical Join becomes a HashJoin, MergeJoin or NestedLoopJoin.
//!
//! Rules are pure: they read the matched expression and the memo and return candidate
//! expressions; the search inserts them. Returning nothing is a no-op.
//!
//! ## Deduplication
//!
//! Each rule has a `rule_hash()` fingerprint. The memo remembers which rules fired on
//! which expression so every (rule, expression) pair fires at most once; this is what
//! stops commutativity from swapping back and forth forever.
//!
//! ## Registry
//!
//! `RuleRegistry` is built once at startup and shared read-only. Base rules always apply;
//! named rule sets (connector-specific rules) are added when the search is configured
//! with a matching `source_type`. Registration order is preserved within each tier.

use crate::catalog::Catalog;
use crate::expr::Operator;
use crate::memo::{GroupId, Memo, MemoExpr};
use crate::pattern::Pattern;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical → logical.
    Transformation,
    /// Logical → physical.
    Implementation,
}

/// Context passed to rules during application.
pub struct OptContext<'a> {
    pub catalog: &'a dyn Catalog,
}

/// A child reference in a rule result: either an existing group or a new sub-expression.
///
/// Rules such as join associativity need intermediate groups that may not exist yet:
///
/// ```text
/// (A ⋈ B) ⋈ C  →  A ⋈ (B ⋈ C)
/// ```
///
/// returns `RuleChild::NewExpr(Join, [Group(B), Group(C)])` for the inner join; the
/// search inserts it, reusing an existing group when an identical expression exists.
#[derive(Debug, Clone)]
pub enum RuleChild {
    Group(GroupId),
    NewExpr(Operator, Vec<RuleChild>),
}

/// Result of applying a rule to an expression.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// A new expression for the matched expression's group over existing child groups.
    Substitution(Operator, Vec<GroupId>),
    /// A new expression for the matched expression's group whose children may be new
    /// sub-expressions.
    NewChildren(Operator, Vec<RuleChild>),
    /// The matched expression's group is equivalent to an existing group; the two are
    /// merged.
    Equivalent(GroupId),
}

/// A rule transforms or implements expressions.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    fn rule_type(&self) -> RuleType;

    /// Shape of expression this rule applies to.
    fn pattern(&self) -> Pattern;

    /// Apply the rule to an expression matching `pattern()`.
    fn apply(&self, expr: &MemoExpr, memo: &Memo, ctx: &OptContext) -> Vec<RuleResult>;

    /// Fingerprint used to remember that the rule fired on an expression.
    fn rule_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.name().hash(&mut hasher);
        hasher.finish()
    }
}

/// A named set of rules (e.g., for a specific connector).
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Registry of optimization rules.
#[derive(Default)]
pub struct RuleRegistry {
    pub base_rules: Vec<Box<dyn Rule>>,
    pub source_rules: HashMap<String, RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.base_rules.push(rule);
    }

    pub fn add_source_rule_set(&mut self, name: impl Into<String>, rule_set: RuleSet) {
        self.source_rules.insert(name.into(), rule_set);
    }

    /// All rules active for a given source type, base rules first.
    pub fn active_rules(&self, source: Option<&str>) -> Vec<&dyn Rule> {
        let mut rules: Vec<&dyn Rule> = self.base_rules.iter().map(|r| r.as_ref()).collect();
        if let Some(rs) = source.and_then(|s| self.source_rules.get(s)) {
            rules.extend(rs.rules.iter().map(|r| r.as_ref()));
        }
        rules
    }

    /// Active rules of one tier, in registration order.
    pub fn rules_of(&self, rule_type: RuleType, source: Option<&str>) -> Vec<&dyn Rule> {
        self.active_rules(source)
            .into_iter()
            .filter(|r| r.rule_type() == rule_type)
            .collect()
    }

    pub fn transformation_rules(&self, source: Option<&str>) -> Vec<&dyn Rule> {
        self.rules_of(RuleType::Transformation, source)
    }

    pub fn implementation_rules(&self, source: Option<&str>) -> Vec<&dyn Rule> {
        self.rules_of(RuleType::Implementation, source)
    }

    pub fn len(&self) -> usize {
        self.base_rules.len() + self.source_rules.values().map(|s| s.rules.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    struct Named(&'static str, RuleType);

    impl Rule for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn rule_type(&self) -> RuleType {
            self.1
        }

        fn pattern(&self) -> Pattern {
            Pattern::Any
        }

        fn apply(&self, _: &MemoExpr, _: &Memo, _: &OptContext) -> Vec<RuleResult> {
            vec![]
        }
    }

    #[test]
    fn test_registry_preserves_order_and_tiers() {
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(Named("impl_a", RuleType::Implementation)));
        registry.add_rule(Box::new(Named("explore_a", RuleType::Transformation)));
        registry.add_rule(Box::new(Named("explore_b", RuleType::Transformation)));
        registry.add_source_rule_set(
            "hive",
            RuleSet::new("hive").with_rule(Box::new(Named("hive_scan", RuleType::Implementation))),
        );

        let names = |rules: Vec<&dyn Rule>| rules.iter().map(|r| r.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(registry.transformation_rules(None)), vec!["explore_a", "explore_b"]);
        assert_eq!(names(registry.implementation_rules(None)), vec!["impl_a"]);
        assert_eq!(
            names(registry.implementation_rules(Some("hive"))),
            vec!["impl_a", "hive_scan"]
        );
        assert_eq!(registry.len(), 4);
        assert_ne!(
            Named("impl_a", RuleType::Implementation).rule_hash(),
            Named("explore_a", RuleType::Transformation).rule_hash()
        );
    }
}
