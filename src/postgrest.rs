//! PostgREST backend client
//!
//! Implements `QueryBackend` against a PostgREST-style REST endpoint
//! (Supabase exposes one per project). Each plan call becomes one GET with
//! filter/order/limit query parameters; counts use the `Prefer: count=exact`
//! header and read the total from the `content-range` response header.

use crate::backend::{user_hint, QueryBackend, Row};
use crate::error::{NlqError, Result};
use crate::translator::{ColumnSelection, OrderDirection, OrderSpec, Predicate, PredicateOp};
use async_trait::async_trait;
use tracing::debug;

#[derive(Clone)]
pub struct PostgrestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestBackend {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, relation: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/rest/v1/{}", self.base_url, relation))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// One PostgREST filter parameter per predicate, e.g. `amount=gt.100`.
    fn filter_params(predicates: &[Predicate]) -> Vec<(String, String)> {
        predicates
            .iter()
            .map(|p| {
                let value = match &p.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let rhs = match p.op {
                    PredicateOp::Eq => format!("eq.{value}"),
                    // PostgREST patterns use * where SQL LIKE uses %
                    PredicateOp::Like => format!("like.{}", value.replace('%', "*")),
                    PredicateOp::ILike => format!("ilike.{}", value.replace('%', "*")),
                    PredicateOp::Lt => format!("lt.{value}"),
                    PredicateOp::Gt => format!("gt.{value}"),
                    PredicateOp::Lte => format!("lte.{value}"),
                    PredicateOp::Gte => format!("gte.{value}"),
                    PredicateOp::IsTrue => "is.true".to_string(),
                    PredicateOp::IsFalse => "is.false".to_string(),
                };
                (p.column.clone(), rhs)
            })
            .collect()
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        // PostgREST returns {"message": "..."} bodies; extract the message
        // when present so the hint rewriting sees the interesting part.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(body);
        Err(NlqError::Backend(format!(
            "Backend request failed ({status}): {}",
            user_hint(&message)
        )))
    }
}

#[async_trait]
impl QueryBackend for PostgrestBackend {
    async fn fetch_rows(
        &self,
        relation: &str,
        columns: &ColumnSelection,
        predicates: &[Predicate],
        order: Option<&OrderSpec>,
        limit: Option<u32>,
    ) -> Result<Vec<Row>> {
        let mut params: Vec<(String, String)> = Vec::new();
        let select = match columns {
            ColumnSelection::All => "*".to_string(),
            ColumnSelection::Columns(cols) => cols.join(","),
        };
        params.push(("select".to_string(), select));
        params.extend(Self::filter_params(predicates));
        if let Some(order) = order {
            let dir = match order.direction {
                OrderDirection::Asc => "asc",
                OrderDirection::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        debug!(relation, ?params, "fetching rows from backend");
        let response = self
            .request(relation)
            .query(&params)
            .send()
            .await
            .map_err(|e| NlqError::Backend(format!("Backend request failed: {e}")))?;
        let response = Self::check_status(response).await?;
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| NlqError::Backend(format!("Failed to parse backend rows: {e}")))?;
        Ok(rows)
    }

    async fn count_rows(&self, relation: &str, filter: Option<&Predicate>) -> Result<u64> {
        let mut params = vec![
            ("select".to_string(), "*".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        if let Some(filter) = filter {
            params.extend(Self::filter_params(std::slice::from_ref(filter)));
        }

        debug!(relation, ?params, "counting rows on backend");
        let response = self
            .request(relation)
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await
            .map_err(|e| NlqError::Backend(format!("Backend request failed: {e}")))?;
        let response = Self::check_status(response).await?;

        // content-range looks like "0-0/123"; the total follows the slash.
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|total| total.parse::<u64>().ok());
        match total {
            Some(count) => Ok(count),
            None => Err(NlqError::Backend(
                "Backend did not return an exact row count.".to_string(),
            )),
        }
    }

    async fn fetch_column(
        &self,
        relation: &str,
        column: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let params = vec![("select".to_string(), column.to_string())];
        debug!(relation, column, "fetching column from backend");
        let response = self
            .request(relation)
            .query(&params)
            .send()
            .await
            .map_err(|e| NlqError::Backend(format!("Backend request failed: {e}")))?;
        let response = Self::check_status(response).await?;
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| NlqError::Backend(format!("Failed to parse backend column: {e}")))?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(column).unwrap_or(serde_json::Value::Null))
            .collect())
    }
}
