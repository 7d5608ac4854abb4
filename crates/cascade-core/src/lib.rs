//! # cascade-core: Cascades Query Optimizer Core
//!
//! Core data structures and algorithms of a Cascades-style cost-based query optimizer.
//!
//! ## Module Overview
//!
//! - **`expr`**: Scalar expressions, schemas and the logical/physical operator algebra.
//! - **`plan`**: Validated logical plan trees and extracted physical plans.
//! - **`memo`**: The memo: groups of equivalent expressions, deduplication and merging.
//! - **`rule`**: The `Rule` trait and the static `RuleRegistry`.
//! - **`pattern`**: Declarative pattern matching for rule applicability checks.
//! - **`search`**: The Cascades search driver with its budget.
//! - **`cost`**: Cost model trait and default implementation (CPU/memory/network weighted).
//! - **`stats`**: Statistics, cardinality derivation and selectivity estimation.
//! - **`properties`**: Physical properties (sort order, distribution) and their satisfaction.
//! - **`enforcer`**: Sort and Exchange enforcers.
//! - **`catalog`**: Catalog trait for table metadata and statistics.
//! - **`ddl`**: Validation of `ALTER CATALOG ... RENAME ...`.
//! - **`error`**: Error types.

pub mod catalog;
pub mod cost;
pub mod ddl;
pub mod enforcer;
pub mod error;
pub mod expr;
pub mod memo;
pub mod pattern;
pub mod plan;
pub mod properties;
pub mod rule;
pub mod search;
pub mod stats;

pub use error::{OptimizerError, OptimizerResult, PlanError, PlanResult};
pub use plan::{LogicalPlan, PhysicalPlan};
pub use search::{CascadesSearch, OptimizedPlan, SearchConfig};
