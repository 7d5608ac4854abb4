//! # Application State
//!
//! Shared by all request handlers via `Arc`, created once at startup.
//!
//! - **Rule Registry**: stateless rules, shared rather than cloned per request.
//! - **Cost Model**: also stateless.
//! - **Config**: search limits applied to every request.
//!
//! There is no server-side catalog: each optimization request carries the tables and
//! statistics it needs, and gets a private memo.

use cascade_core::cost::{CostModel, DefaultCostModel};
use cascade_core::rule::RuleRegistry;
use std::sync::Arc;

use crate::config::ServerConfig;

pub struct AppState {
    pub rule_registry: Arc<RuleRegistry>,
    pub cost_model: Arc<dyn CostModel>,
    pub config: ServerConfig,
}

impl AppState {
    /// All built-in rules and the default cost model.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rule_registry: Arc::new(cascade_rules::default_rule_registry()),
            cost_model: Arc::new(DefaultCostModel::default()),
            config,
        }
    }
}
