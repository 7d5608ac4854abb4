//! Error types for plan construction and optimization.
//!
//! Construction errors (`PlanError`) are raised while a logical plan is being built and
//! are always fatal to the statement. `OptimizerError` covers failures inside the search
//! itself; apart from `Plan`, every variant indicates a bug in the optimizer rather than
//! bad input.

use crate::expr::{ColumnRef, DataType};
use crate::memo::GroupId;
use crate::properties::PhysicalPropertySet;
use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("column {0} not found")]
    ColumnNotFound(ColumnRef),

    #[error("column reference {0} is ambiguous")]
    AmbiguousColumn(ColumnRef),

    #[error("type mismatch in {context}: {left:?} is not compatible with {right:?}")]
    TypeMismatch {
        context: String,
        left: DataType,
        right: DataType,
    },

    #[error("{op} expects {expected} input(s), got {actual}")]
    InvalidArity {
        op: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("no plan found for group {group} satisfying {required}")]
    NoPlanFound {
        group: GroupId,
        required: PhysicalPropertySet,
    },

    #[error("cannot merge group {from} into group {into}: output columns differ")]
    MergeInvariant { into: GroupId, from: GroupId },

    #[error("cycle detected while extracting group {0}")]
    CycleDetected(GroupId),
}
