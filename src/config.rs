//! Runtime configuration
//!
//! Credentials and endpoints come from the environment (a `.env` file is
//! honored when present); the relation allow-list and limit caps derive
//! from the schema context and are immutable for the life of a request.

use crate::error::{NlqError, Result};
use crate::schema::SchemaContext;
use crate::validator::RelationAllowList;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct NlqConfig {
    /// Model name; also selects the provider (see `GenerationProvider`).
    pub model: String,
    pub llm_api_key: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    /// PostgREST endpoint base URL (e.g. a Supabase project URL).
    pub backend_url: String,
    pub backend_api_key: String,
}

impl NlqConfig {
    /// Load from environment variables. `LLM_API_KEY` falls back to
    /// `OPENAI_API_KEY` / `GEMINI_API_KEY` depending on the model.
    pub fn from_env() -> Result<Self> {
        let model =
            std::env::var("NLQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let fallback_key_var = if model.to_lowercase().starts_with("gemini") {
            "GEMINI_API_KEY"
        } else {
            "OPENAI_API_KEY"
        };
        let llm_api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var(fallback_key_var))
            .map_err(|_| {
                NlqError::Config(format!(
                    "Missing LLM credentials: set LLM_API_KEY or {fallback_key_var}."
                ))
            })?;
        let backend_url = std::env::var("SUPABASE_URL")
            .map_err(|_| NlqError::Config("Missing SUPABASE_URL.".to_string()))?;
        let backend_api_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| NlqError::Config("Missing SUPABASE_ANON_KEY.".to_string()))?;

        Ok(Self {
            model,
            llm_api_key,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            backend_url,
            backend_api_key,
        })
    }
}

/// Allow-list derived from the schema context: queries may only touch the
/// relations the prompt describes.
pub fn allow_list_from_schema(schema: &SchemaContext) -> RelationAllowList {
    RelationAllowList::new(schema.relation_names())
}
