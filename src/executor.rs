//! Plan executor
//!
//! Dispatches a `QueryPlan` against the constrained backend. COUNT shapes
//! are emulated here: plain counts become a count read, grouped counts
//! become a bare column read grouped and counted client-side. Unsupported
//! plans never reach the backend.

use crate::backend::{QueryBackend, ResultSet, Row};
use crate::error::{NlqError, Result};
use crate::translator::{AggregateMode, QueryPlan};
use itertools::Itertools;
use tracing::{debug, info};

pub async fn execute(plan: &QueryPlan, backend: &dyn QueryBackend) -> Result<ResultSet> {
    match &plan.aggregate {
        AggregateMode::None => {
            let rows = backend
                .fetch_rows(
                    &plan.relation,
                    &plan.columns,
                    &plan.predicates,
                    plan.order.as_ref(),
                    plan.limit,
                )
                .await?;
            info!(relation = %plan.relation, rows = rows.len(), "fetched rows");
            Ok(ResultSet::from_rows(rows))
        }
        AggregateMode::CountAll => {
            let count = backend
                .count_rows(&plan.relation, plan.predicates.first())
                .await?;
            info!(relation = %plan.relation, count, "counted rows");
            let mut row = Row::new();
            row.insert(plan.count_column.clone(), serde_json::json!(count));
            Ok(ResultSet::from_rows(vec![row]))
        }
        AggregateMode::CountGroupedBy(group_column) => {
            let values = backend.fetch_column(&plan.relation, group_column).await?;
            debug!(relation = %plan.relation, column = %group_column, values = values.len(),
                "grouping column values client-side");
            let counts = values.into_iter().map(render_group_value).counts();
            let rows: Vec<Row> = counts
                .into_iter()
                .sorted()
                .map(|(value, count)| {
                    let mut row = Row::new();
                    row.insert(group_column.clone(), serde_json::json!(value));
                    row.insert(plan.count_column.clone(), serde_json::json!(count));
                    row
                })
                .collect();
            info!(relation = %plan.relation, groups = rows.len(), "emulated grouped count");
            Ok(ResultSet::from_rows(rows))
        }
        AggregateMode::Unsupported(reason) => Err(NlqError::Translation(reason.clone())),
    }
}

/// Group key rendering. Null and missing values get an explicit bucket.
fn render_group_value(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
