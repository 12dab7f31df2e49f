//! GraphQL query execution against the Data Exchange endpoint.
//!
//! [`QueryExecutor`] is the seam the catalog builder talks to. The
//! production implementation, [`HttpQueryExecutor`], sends one POST per
//! call and normalizes failures into two classes:
//!
//! - [`Error::Transport`]: the request failed or returned a non-200 status.
//!   The message contains the status and raw body for diagnostics.
//! - [`Error::RemoteQuery`]: the transport succeeded but the response
//!   carried a non-empty `errors` list.
//!
//! Neither is retried here; retry policy belongs to the caller.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::QueryConfig;
use crate::error::{Error, Result};

/// Header carrying the data-residency region of the model.
pub const REGION_HEADER: &str = "x-ads-region";

/// Executes structured queries with variables on behalf of a user.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` with `variables` and returns the `data` payload, or an
    /// empty object when the server returns no `data` field.
    async fn execute(&self, query: &str, variables: Value, token: &str, region: &str)
        -> Result<Value>;
}

/// [`QueryExecutor`] backed by `reqwest`.
pub struct HttpQueryExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQueryExecutor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &QueryConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn execute(
        &self,
        query: &str,
        variables: Value,
        token: &str,
        region: &str,
    ) -> Result<Value> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .header(REGION_HEADER, region)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(Error::http(status, &text));
        }

        parse_response(&text)
    }
}

/// Splits a GraphQL response body into its data payload or an error.
fn parse_response(text: &str) -> Result<Value> {
    let parsed: GraphQlResponse = serde_json::from_str(text)?;

    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect();
        return Err(Error::RemoteQuery(messages.join("; ")));
    }

    match parsed.data {
        Some(Value::Null) | None => Ok(Value::Object(Default::default())),
        Some(data) => Ok(data),
    }
}
