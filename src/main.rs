use nlquery::config::NlqConfig;
use nlquery::llm::generator_for_model;
use nlquery::orchestrator::{Orchestrator, QueryAnswer};
use nlquery::postgrest::PostgrestBackend;
use nlquery::schema::SchemaContext;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlquery")]
#[command(about = "Ask questions in natural language, get rows from read-only views")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a natural-language question
    Ask {
        /// The question, e.g. "How many teachers are there?"
        question: String,

        /// Model name; a gemini-* model selects the Gemini provider
        #[arg(long)]
        model: Option<String>,
    },
    /// Run pre-written SQL through the same validation pipeline
    Sql {
        /// A single SELECT statement over the exposed views
        statement: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    if let Commands::Ask { model: Some(model), .. } = &args.command {
        std::env::set_var("NLQ_MODEL", model);
    }

    let config = NlqConfig::from_env()?;
    let generator = generator_for_model(
        config.llm_api_key.clone(),
        config.model.clone(),
        config.openai_base_url.clone(),
        config.gemini_base_url.clone(),
    );
    let backend = Box::new(PostgrestBackend::new(
        config.backend_url.clone(),
        config.backend_api_key.clone(),
    ));
    let orchestrator = Orchestrator::new(generator, backend, SchemaContext::tutoring_views());

    let outcome = match &args.command {
        Commands::Ask { question, .. } => orchestrator.answer(question).await,
        Commands::Sql { statement } => orchestrator.run_sql(statement).await,
    };

    match outcome {
        Ok(answer) => {
            print_answer(&answer);
            Ok(())
        }
        Err(failure) => {
            error!(stage = failure.stage.as_str(), "query failed");
            eprintln!("Query failed during {}: {}", failure.stage.as_str(), failure.reason);
            if let Some(sql) = failure.attempted_sql {
                eprintln!("Attempted SQL (not executed): {sql}");
            }
            std::process::exit(1);
        }
    }
}

fn print_answer(answer: &QueryAnswer) {
    println!("SQL: {}", answer.executed_sql);
    println!("{} row(s) in {} ms", answer.row_count, answer.elapsed_ms);

    if answer.rows.is_empty() {
        return;
    }

    // Column order from the first row; JSON maps preserve insertion order.
    let columns: Vec<&String> = answer.rows[0].keys().collect();
    println!("{}", columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" | "));
    for row in &answer.rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|col| match row.get(*col) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
}
