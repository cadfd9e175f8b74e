//! Structured query logging
//!
//! One `QueryLogEntry` per request, emitted through `tracing` as JSON.
//! Query history is deliberately not persisted; this is a diagnostics
//! side-channel only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub query_id: String,
    pub question: Option<String>,
    pub sql: Option<String>,
    pub success: bool,
    pub failing_stage: Option<String>,
    pub error_message: Option<String>,
    pub rows_returned: Option<usize>,
    pub elapsed_ms: Option<u128>,
}

impl QueryLogEntry {
    pub fn new(query_id: String, question: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            query_id,
            question,
            sql: None,
            success: false,
            failing_stage: None,
            error_message: None,
            rows_returned: None,
            elapsed_ms: None,
        }
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(target: "nlquery::audit", entry = %json, "query completed"),
            Err(e) => info!(target: "nlquery::audit", error = %e, "could not serialize log entry"),
        }
    }
}
