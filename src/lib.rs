//! nlquery — natural-language questions answered from read-only views.
//!
//! An LLM turns the question into SQL; this crate is the trust boundary
//! that normalizes, validates, and compiles that untrusted SQL into calls
//! against a constrained query backend.

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod normalizer;
pub mod observability;
pub mod orchestrator;
pub mod postgrest;
pub mod schema;
pub mod translator;
pub mod validator;
