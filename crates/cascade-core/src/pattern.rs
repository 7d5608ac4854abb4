//! # Declarative Pattern Matching for Rules
//!
//! Each rule declares the shape of expression it can rewrite as a `Pattern`; the search
//! checks the pattern before calling `apply()`.
//!
//! - `Pattern::Operator(matcher, children)` matches an expression whose operator
//!   satisfies `matcher` and whose children match the child patterns, one per input.
//! - `Pattern::Variadic(matcher)` matches an operator with any number of inputs
//!   (used for Union).
//! - `Pattern::Any` matches any group; it is the usual child pattern.
//! - `Pattern::Leaf` matches expressions without inputs.
//!
//! A non-`Any` child pattern is checked against every expression of the child group and
//! matches if *any* of them does. All members of a group are equivalent, so the rule may
//! pick whichever member satisfied the pattern.

use crate::expr::{LogicalOpKind, Operator, PhysicalOpKind};
use crate::memo::{ExprId, GroupId, Memo};

#[derive(Debug, Clone)]
pub enum Pattern {
    Operator(OpMatcher, Vec<Pattern>),
    Variadic(OpMatcher),
    Any,
    Leaf,
}

/// Matcher for operator types (without data).
#[derive(Debug, Clone)]
pub enum OpMatcher {
    LogicalOp(LogicalOpKind),
    PhysicalOp(PhysicalOpKind),
    AnyLogical,
    AnyPhysical,
}

impl OpMatcher {
    pub fn matches(&self, op: &Operator) -> bool {
        match (op, self) {
            (Operator::Logical(l), OpMatcher::LogicalOp(kind)) => l.kind() == *kind,
            (Operator::Physical(p), OpMatcher::PhysicalOp(kind)) => p.kind() == *kind,
            (Operator::Logical(_), OpMatcher::AnyLogical) => true,
            (Operator::Physical(_), OpMatcher::AnyPhysical) => true,
            _ => false,
        }
    }
}

impl Pattern {
    /// A logical operator of `kind` over `children` wildcard inputs.
    pub fn logical(kind: LogicalOpKind, children: usize) -> Self {
        Pattern::Operator(OpMatcher::LogicalOp(kind), vec![Pattern::Any; children])
    }

    pub fn join() -> Self {
        Self::logical(LogicalOpKind::Join, 2)
    }

    /// A join whose left input is also a join.
    pub fn join_join_left() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Join),
            vec![Self::join(), Pattern::Any],
        )
    }

    pub fn scan() -> Self {
        Self::logical(LogicalOpKind::Scan, 0)
    }

    pub fn filter() -> Self {
        Self::logical(LogicalOpKind::Filter, 1)
    }

    pub fn aggregate() -> Self {
        Self::logical(LogicalOpKind::Aggregate, 1)
    }

    pub fn sort() -> Self {
        Self::logical(LogicalOpKind::Sort, 1)
    }

    pub fn limit() -> Self {
        Self::logical(LogicalOpKind::Limit, 1)
    }

    pub fn project() -> Self {
        Self::logical(LogicalOpKind::Project, 1)
    }

    pub fn empty_relation() -> Self {
        Self::logical(LogicalOpKind::EmptyRelation, 0)
    }

    pub fn union() -> Self {
        Pattern::Variadic(OpMatcher::LogicalOp(LogicalOpKind::Union))
    }

    pub fn filter_join() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Filter),
            vec![Self::join()],
        )
    }

    pub fn filter_scan() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Filter),
            vec![Self::scan()],
        )
    }

    pub fn filter_filter() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Filter),
            vec![Self::filter()],
        )
    }

    pub fn project_scan() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Project),
            vec![Self::scan()],
        )
    }
}

/// Check if a memo expression matches a pattern.
pub fn matches(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> bool {
    let expr = memo.expr(expr_id);
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => expr.children.is_empty(),
        Pattern::Variadic(matcher) => matcher.matches(&expr.op),
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.matches(&expr.op) || expr.children.len() != child_patterns.len() {
                return false;
            }
            expr.children
                .iter()
                .zip(child_patterns)
                .all(|(&child, p)| group_matches(memo, child, p))
        }
    }
}

/// Whether any expression of `group` matches `pattern`.
pub fn group_matches(memo: &Memo, group: GroupId, pattern: &Pattern) -> bool {
    if matches!(pattern, Pattern::Any) {
        return true;
    }
    let g = memo.group(group);
    g.logical_exprs
        .iter()
        .chain(g.physical_exprs.iter())
        .any(|&eid| matches(memo, eid, pattern))
}

/// First logical expression of `group` matching `pattern`, if any.
pub fn find_in_group(memo: &Memo, group: GroupId, pattern: &Pattern) -> Option<ExprId> {
    memo.group(group)
        .logical_exprs
        .iter()
        .copied()
        .find(|&eid| matches(memo, eid, pattern))
}
