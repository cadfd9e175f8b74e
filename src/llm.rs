//! Text-generation providers
//!
//! One trait, two implementations: an OpenAI-compatible chat-completions
//! client and a Gemini generateContent client. The provider is chosen once
//! from the model string at the orchestrator boundary; downstream code only
//! sees the trait.

use crate::error::{NlqError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Abstract text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete a prompt into raw text. Transient provider failures come
    /// back as `NlqError::LlmUnavailable` so the orchestrator can retry;
    /// everything else is permanent.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationProvider {
    OpenAi,
    Gemini,
}

impl GenerationProvider {
    /// Provider selection by model name, decided once per orchestrator.
    pub fn from_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("gemini") {
            GenerationProvider::Gemini
        } else {
            GenerationProvider::OpenAi
        }
    }
}

/// Map an HTTP status to the right error class. 429 and the 5xx family are
/// transient; anything else (bad key, bad request, content policy) is not.
fn provider_error(provider: &str, status: reqwest::StatusCode, body: &str) -> NlqError {
    if status.as_u16() == 429 || status.is_server_error() {
        NlqError::LlmUnavailable(format!("{provider} API error ({status}): {body}"))
    } else {
        NlqError::Llm(format!("{provider} API error ({status}): {body}"))
    }
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Return a single SQL SELECT statement only, no prose."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 500,
        });

        debug!(model = %self.model, "calling OpenAI chat completions");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::LlmUnavailable(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(provider_error("OpenAI", status, &error_text));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlqError::Llm(format!("Failed to parse OpenAI response: {e}")))?;

        if let Some(error) = response_json.get("error") {
            return Err(NlqError::Llm(format!("OpenAI API error: {error}")));
        }

        let choices = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NlqError::Llm("No choices in OpenAI response.".to_string()))?;

        if let Some(finish_reason) = choices[0].get("finish_reason").and_then(|r| r.as_str()) {
            if finish_reason == "length" {
                warn!("OpenAI response was truncated by the token limit");
            } else if finish_reason == "content_filter" {
                return Err(NlqError::Llm(
                    "OpenAI response was filtered by content policy.".to_string(),
                ));
            }
        }

        let content = choices[0]["message"]["content"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NlqError::Llm("Empty content in OpenAI response.".to_string()))?;
        Ok(content.to_string())
    }
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.1, "maxOutputTokens": 500},
        });

        debug!(model = %self.model, "calling Gemini generateContent");
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::LlmUnavailable(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(provider_error("Gemini", status, &error_text));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlqError::Llm(format!("Failed to parse Gemini response: {e}")))?;

        let content = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NlqError::Llm("Empty content in Gemini response.".to_string()))?;
        Ok(content.to_string())
    }
}

/// Build the generator matching a model name.
pub fn generator_for_model(
    api_key: String,
    model: String,
    openai_base_url: String,
    gemini_base_url: String,
) -> Box<dyn TextGenerator> {
    match GenerationProvider::from_model(&model) {
        GenerationProvider::OpenAi => Box::new(OpenAiGenerator::new(api_key, model, openai_base_url)),
        GenerationProvider::Gemini => Box::new(GeminiGenerator::new(api_key, model, gemini_base_url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_selection_by_model_prefix() {
        assert_eq!(
            GenerationProvider::from_model("gpt-4o-mini"),
            GenerationProvider::OpenAi
        );
        assert_eq!(
            GenerationProvider::from_model("gemini-1.5-flash"),
            GenerationProvider::Gemini
        );
        assert_eq!(
            GenerationProvider::from_model("GEMINI-pro"),
            GenerationProvider::Gemini
        );
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let err = provider_error("OpenAI", reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_transient());
        let err = provider_error("Gemini", reqwest::StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(err.is_transient());
        let err = provider_error("OpenAI", reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(!err.is_transient());
    }
}
