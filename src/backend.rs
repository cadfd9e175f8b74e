//! Constrained Query Backend
//!
//! The backend exposes only composable read operations over a fixed set of
//! relations: filtered/ordered/limited row reads, counts with an optional
//! filter, and a bare column read. There is no arbitrary-SQL entry point;
//! that restriction is the reason the translator exists.

use crate::error::Result;
use crate::translator::{ColumnSelection, OrderSpec, Predicate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One result row: column name to scalar value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered rows plus bookkeeping the caller surfaces to the user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl ResultSet {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }
}

/// Read-only operations the executor may issue.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Filtered, ordered, limited row read.
    async fn fetch_rows(
        &self,
        relation: &str,
        columns: &ColumnSelection,
        predicates: &[Predicate],
        order: Option<&OrderSpec>,
        limit: Option<u32>,
    ) -> Result<Vec<Row>>;

    /// Row count, optionally restricted by one equality predicate.
    async fn count_rows(&self, relation: &str, filter: Option<&Predicate>) -> Result<u64>;

    /// All values of one column, unfiltered. Used for client-side grouping.
    async fn fetch_column(
        &self,
        relation: &str,
        column: &str,
    ) -> Result<Vec<serde_json::Value>>;
}

/// Rewrite known backend error text into a hint the user can act on.
/// Anything unrecognized passes through unchanged.
pub fn user_hint(message: &str) -> String {
    let lowered = message.to_lowercase();
    if lowered.contains("relation") && lowered.contains("does not exist") {
        return format!(
            "The queried view does not exist on the backend. Backend said: {message}"
        );
    }
    if lowered.contains("column") && lowered.contains("does not exist") {
        return format!(
            "The query referenced a column the view does not have. Backend said: {message}"
        );
    }
    message.to_string()
}
