//! # Catalog Interface
//!
//! The catalog provides the optimizer with already-resolved metadata: column definitions,
//! table statistics, ordered indexes and how a table is partitioned across workers. The
//! optimizer never stores catalog data itself.
//!
//! The `Catalog` trait is consumed as `dyn Catalog` so different backends can provide
//! metadata; `InMemoryCatalog` is a HashMap-backed implementation populated
//! programmatically (tests and the HTTP service).
//!
//! Lookups are keyed by `TableRef` (schema + name). Unknown tables return `None` or an
//! empty list, and the optimizer falls back to defaults.

use crate::expr::{Distribution, Field, TableRef};
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An ordered index over some columns of a table, ascending with nulls last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableIndex {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics>;

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<Field>>;

    fn get_table_indexes(&self, _table: &TableRef) -> Vec<TableIndex> {
        Vec::new()
    }

    /// How the table's rows are spread across workers. `None` means unknown, which the
    /// optimizer treats as a single stream.
    fn get_table_distribution(&self, _table: &TableRef) -> Option<Distribution> {
        None
    }
}

/// In-memory catalog for testing and development.
///
/// Tables are keyed by their fully-qualified name (`schema.table`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub table_stats: HashMap<String, Statistics>,
    pub table_columns: HashMap<String, Vec<Field>>,
    pub table_indexes: HashMap<String, Vec<TableIndex>>,
    pub table_distributions: HashMap<String, Distribution>,
}

fn key(table: &TableRef) -> String {
    format!("{}.{}", table.schema, table.name)
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: Vec<Field>, stats: Statistics) {
        let key = key(table);
        self.table_columns.insert(key.clone(), columns);
        self.table_stats.insert(key, stats);
    }

    pub fn add_index(&mut self, table: &TableRef, index: TableIndex) {
        self.table_indexes.entry(key(table)).or_default().push(index);
    }

    pub fn set_distribution(&mut self, table: &TableRef, distribution: Distribution) {
        self.table_distributions.insert(key(table), distribution);
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.table_stats.get(&key(table)).cloned()
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<Field>> {
        self.table_columns.get(&key(table)).cloned()
    }

    fn get_table_indexes(&self, table: &TableRef) -> Vec<TableIndex> {
        self.table_indexes.get(&key(table)).cloned().unwrap_or_default()
    }

    fn get_table_distribution(&self, table: &TableRef) -> Option<Distribution> {
        self.table_distributions.get(&key(table)).cloned()
    }
}
