//! Pipeline orchestrator
//!
//! Sequences one request through its stages: generate SQL, normalize,
//! validate, translate, execute. Transitions are strictly forward; a failed
//! stage terminates the request with a structured envelope. Only generation
//! is retried, and only for transient provider errors — validation and
//! translation are deterministic, so retrying them without new input cannot
//! change the outcome.
//!
//! Dropping the returned future cancels the request: the in-flight provider
//! or backend call is abandoned and no partial state survives.

use crate::backend::{QueryBackend, Row};
use crate::config::allow_list_from_schema;
use crate::error::Result;
use crate::executor;
use crate::llm::TextGenerator;
use crate::normalizer::normalize;
use crate::observability::QueryLogEntry;
use crate::schema::SchemaContext;
use crate::translator::{translate, AggregateMode};
use crate::validator::{validate, RelationAllowList, ValidationVerdict};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Generation attempts before giving up on a transient provider error.
const MAX_GENERATION_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineStage {
    GeneratingSql,
    Validating,
    Translating,
    Executing,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::GeneratingSql => "generating_sql",
            PipelineStage::Validating => "validating",
            PipelineStage::Translating => "translating",
            PipelineStage::Executing => "executing",
        }
    }
}

/// Success envelope: what was executed and what came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub rows: Vec<Row>,
    pub executed_sql: String,
    pub row_count: usize,
    pub elapsed_ms: u128,
}

/// Failure envelope: which stage failed, a reason safe to display, and the
/// offending SQL (for transparency, never for re-execution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFailure {
    pub stage: PipelineStage,
    pub reason: String,
    pub attempted_sql: Option<String>,
}

pub struct Orchestrator {
    generator: Box<dyn TextGenerator>,
    backend: Box<dyn QueryBackend>,
    schema: SchemaContext,
    allow_list: RelationAllowList,
}

impl Orchestrator {
    pub fn new(
        generator: Box<dyn TextGenerator>,
        backend: Box<dyn QueryBackend>,
        schema: SchemaContext,
    ) -> Self {
        let allow_list = allow_list_from_schema(&schema);
        Self {
            generator,
            backend,
            schema,
            allow_list,
        }
    }

    /// Answer a natural-language question: generate SQL, then run it through
    /// the trust boundary and the backend.
    pub async fn answer(&self, question: &str) -> std::result::Result<QueryAnswer, QueryFailure> {
        let query_id = Uuid::new_v4().to_string();
        let mut log = QueryLogEntry::new(query_id.clone(), Some(question.to_string()));
        info!(query_id = %query_id, question, "answering question");

        let prompt = self.schema.build_prompt(question);
        let raw = match self.generate_with_retry(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                let failure = QueryFailure {
                    stage: PipelineStage::GeneratingSql,
                    reason: e.to_string(),
                    attempted_sql: None,
                };
                log.failing_stage = Some(failure.stage.as_str().to_string());
                log.error_message = Some(failure.reason.clone());
                log.emit();
                return Err(failure);
            }
        };

        let outcome = self.run_pipeline(&raw).await;
        finish_log(log, &outcome);
        outcome
    }

    /// Direct-execution path for pre-written SQL. The author does not
    /// matter: the statement passes through the identical normalize →
    /// validate → translate → execute pipeline.
    pub async fn run_sql(&self, sql: &str) -> std::result::Result<QueryAnswer, QueryFailure> {
        let query_id = Uuid::new_v4().to_string();
        let mut log = QueryLogEntry::new(query_id.clone(), None);
        info!(query_id = %query_id, "running caller-supplied SQL");

        let outcome = self.run_pipeline(sql).await;
        log.sql = Some(normalize(sql));
        finish_log(log, &outcome);
        outcome
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.generator.complete(prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt < MAX_GENERATION_ATTEMPTS => {
                    warn!(attempt, error = %e, "transient generation failure, retrying");
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_pipeline(&self, raw: &str) -> std::result::Result<QueryAnswer, QueryFailure> {
        // Normalizing: raw text to canonical SQL. Never fails; unusable
        // input falls out at validation.
        let canonical = normalize(raw);

        // Validating
        let accepted = match validate(&canonical, &self.allow_list) {
            ValidationVerdict::Accepted(query) => query,
            ValidationVerdict::Rejected { reason } => {
                return Err(QueryFailure {
                    stage: PipelineStage::Validating,
                    reason,
                    attempted_sql: Some(canonical),
                });
            }
        };

        // Translating
        let plan = match translate(&accepted) {
            Ok(plan) => plan,
            Err(e) => {
                return Err(QueryFailure {
                    stage: PipelineStage::Translating,
                    reason: e.to_string(),
                    attempted_sql: Some(accepted),
                });
            }
        };

        // A recognized-but-unsupported shape is a translation failure; the
        // backend must never be contacted for it.
        if let AggregateMode::Unsupported(reason) = &plan.aggregate {
            return Err(QueryFailure {
                stage: PipelineStage::Translating,
                reason: format!("Unsupported query shape: {reason}"),
                attempted_sql: Some(accepted),
            });
        }

        // Executing
        let started = Instant::now();
        match executor::execute(&plan, self.backend.as_ref()).await {
            Ok(result) => Ok(QueryAnswer {
                rows: result.rows,
                executed_sql: accepted,
                row_count: result.row_count,
                elapsed_ms: started.elapsed().as_millis(),
            }),
            Err(e) => Err(QueryFailure {
                stage: PipelineStage::Executing,
                reason: e.to_string(),
                attempted_sql: Some(accepted),
            }),
        }
    }
}

fn finish_log(
    mut log: QueryLogEntry,
    outcome: &std::result::Result<QueryAnswer, QueryFailure>,
) {
    match outcome {
        Ok(answer) => {
            log.success = true;
            log.sql = Some(answer.executed_sql.clone());
            log.rows_returned = Some(answer.row_count);
            log.elapsed_ms = Some(answer.elapsed_ms);
        }
        Err(failure) => {
            log.failing_stage = Some(failure.stage.as_str().to_string());
            log.error_message = Some(failure.reason.clone());
            log.sql = failure.attempted_sql.clone();
        }
    }
    log.emit();
}
