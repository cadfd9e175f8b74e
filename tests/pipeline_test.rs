//! End-to-end pipeline tests with stubbed collaborators.
//!
//! The generator and backend stubs count their calls so the tests can prove
//! rejected queries never reach the backend.

use nlquery::backend::{QueryBackend, Row};
use nlquery::error::{NlqError, Result};
use nlquery::llm::TextGenerator;
use nlquery::orchestrator::{Orchestrator, PipelineStage};
use nlquery::schema::SchemaContext;
use nlquery::translator::{ColumnSelection, OrderSpec, Predicate};

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Generator stub: returns canned completions in order, then repeats the
/// last one. Counts calls.
struct StubGenerator {
    responses: Vec<Result<String>>,
    calls: Arc<AtomicUsize>,
}

impl StubGenerator {
    fn returning(sql: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                responses: vec![Ok(sql.to_string())],
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.responses.len() - 1);
        match &self.responses[idx] {
            Ok(sql) => Ok(sql.clone()),
            Err(NlqError::LlmUnavailable(msg)) => Err(NlqError::LlmUnavailable(msg.clone())),
            Err(e) => Err(NlqError::Llm(e.to_string())),
        }
    }
}

/// Backend stub with canned data and a call counter.
struct StubBackend {
    rows: Vec<Row>,
    count: u64,
    column_values: Vec<serde_json::Value>,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                rows: Vec::new(),
                count: 0,
                column_values: Vec::new(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl QueryBackend for StubBackend {
    async fn fetch_rows(
        &self,
        _relation: &str,
        _columns: &ColumnSelection,
        _predicates: &[Predicate],
        _order: Option<&OrderSpec>,
        _limit: Option<u32>,
    ) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }

    async fn count_rows(&self, _relation: &str, _filter: Option<&Predicate>) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.count)
    }

    async fn fetch_column(
        &self,
        _relation: &str,
        _column: &str,
    ) -> Result<Vec<serde_json::Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.column_values.clone())
    }
}

fn orchestrator_with(
    generator: StubGenerator,
    backend: StubBackend,
) -> Orchestrator {
    Orchestrator::new(
        Box::new(generator),
        Box::new(backend),
        SchemaContext::tutoring_views(),
    )
}

#[tokio::test]
async fn how_many_teachers_end_to_end() {
    let sql = "SELECT COUNT(*) as teacher_count FROM view_tts_users WHERE role = 'teacher'";
    let (generator, _) = StubGenerator::returning(sql);
    let (mut backend, backend_calls) = StubBackend::new();
    backend.count = 7;

    let orchestrator = orchestrator_with(generator, backend);
    let answer = orchestrator
        .answer("How many teachers are there")
        .await
        .expect("pipeline should succeed");

    assert_eq!(answer.row_count, 1);
    assert_eq!(answer.rows[0]["teacher_count"], json!(7));
    assert_eq!(answer.executed_sql, sql);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delete_statement_is_rejected_before_the_backend() {
    let (generator, _) = StubGenerator::returning("DELETE FROM view_tts_users");
    let (backend, backend_calls) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator
        .answer("Remove all users")
        .await
        .expect_err("pipeline must reject");

    assert_eq!(failure.stage, PipelineStage::Validating);
    assert!(failure.reason.contains("Only SELECT queries are allowed"));
    assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn avg_is_a_translation_failure_and_backend_is_never_called() {
    let (generator, _) =
        StubGenerator::returning("SELECT AVG(score) FROM view_tts_users");
    let (backend, backend_calls) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator
        .answer("What is the average score?")
        .await
        .expect_err("pipeline must fail at translation");

    assert_eq!(failure.stage, PipelineStage::Translating);
    assert!(failure.reason.contains("requires advanced aggregate support"));
    assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fenced_generation_output_is_normalized_before_execution() {
    let raw = "```sql\nSELECT * FROM view_tts_fees WHERE is_active = true ORDER BY amount DESC LIMIT 50\n```";
    let (generator, _) = StubGenerator::returning(raw);
    let (mut backend, _) = StubBackend::new();
    let mut row = Row::new();
    row.insert("amount".to_string(), json!(1200));
    backend.rows = vec![row];

    let orchestrator = orchestrator_with(generator, backend);
    let answer = orchestrator.answer("Show active fees").await.unwrap();

    assert_eq!(
        answer.executed_sql,
        "SELECT * FROM view_tts_fees WHERE is_active = true ORDER BY amount DESC LIMIT 50"
    );
    assert_eq!(answer.row_count, 1);
}

#[tokio::test]
async fn grouped_count_is_emulated_client_side() {
    let sql = "SELECT role, COUNT(*) as count FROM view_tts_users GROUP BY role";
    let (generator, _) = StubGenerator::returning(sql);
    let (mut backend, _) = StubBackend::new();
    backend.column_values = vec![json!("teacher"), json!("student"), json!("teacher")];

    let orchestrator = orchestrator_with(generator, backend);
    let answer = orchestrator.answer("How many users per role?").await.unwrap();

    assert_eq!(answer.row_count, 2);
    let teacher_row = answer
        .rows
        .iter()
        .find(|r| r["role"] == json!("teacher"))
        .expect("teacher group present");
    assert_eq!(teacher_row["count"], json!(2));
}

#[tokio::test]
async fn direct_sql_path_runs_the_same_trust_boundary() {
    let (generator, generator_calls) = StubGenerator::returning("unused");
    let (backend, backend_calls) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);

    // Valid SQL executes without involving the generator.
    let answer = orchestrator
        .run_sql("SELECT * FROM view_tts_users LIMIT 5")
        .await
        .unwrap();
    assert_eq!(answer.executed_sql, "SELECT * FROM view_tts_users LIMIT 5");
    assert_eq!(generator_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 1);

    // Unsafe SQL is rejected exactly like generated SQL.
    let failure = orchestrator
        .run_sql("DROP TABLE view_tts_users")
        .await
        .expect_err("must reject");
    assert_eq!(failure.stage, PipelineStage::Validating);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_relation_is_named_in_the_failure() {
    let (generator, _) = StubGenerator::returning("SELECT * FROM secret_ledger");
    let (backend, backend_calls) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator.answer("Show the ledger").await.unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Validating);
    assert!(failure.reason.contains("secret_ledger"));
    assert!(failure.reason.contains("view_tts_users"));
    assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_generation_errors_are_retried_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let generator = StubGenerator {
        responses: vec![
            Err(NlqError::LlmUnavailable("503 from provider".to_string())),
            Ok("SELECT * FROM view_tts_users LIMIT 5".to_string()),
        ],
        calls: calls.clone(),
    };
    let (backend, _) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let answer = orchestrator.answer("Show users").await.unwrap();

    assert_eq!(answer.executed_sql, "SELECT * FROM view_tts_users LIMIT 5");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_stop_after_the_attempt_budget() {
    let calls = Arc::new(AtomicUsize::new(0));
    let generator = StubGenerator {
        responses: vec![Err(NlqError::LlmUnavailable("still down".to_string()))],
        calls: calls.clone(),
    };
    let (backend, backend_calls) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator.answer("Show users").await.unwrap_err();

    assert_eq!(failure.stage, PipelineStage::GeneratingSql);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn permanent_generation_errors_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let generator = StubGenerator {
        responses: vec![Err(NlqError::Llm("invalid api key".to_string()))],
        calls: calls.clone(),
    };
    let (backend, _) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator.answer("Show users").await.unwrap_err();

    assert_eq!(failure.stage, PipelineStage::GeneratingSql);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_envelope_carries_the_attempted_sql() {
    let (generator, _) = StubGenerator::returning("UPDATE view_tts_fees SET amount = 0");
    let (backend, _) = StubBackend::new();

    let orchestrator = orchestrator_with(generator, backend);
    let failure = orchestrator.answer("Zero out the fees").await.unwrap_err();

    assert_eq!(
        failure.attempted_sql.as_deref(),
        Some("UPDATE view_tts_fees SET amount = 0")
    );
}
