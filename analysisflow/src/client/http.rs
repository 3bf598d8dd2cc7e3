//! HTTP+JSON implementation of the backend client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tracing::debug;

use super::protocol::error_message;
use super::{ContextAck, PollResponse, ProcessResponse, RemoteStageClient};
use crate::config::BackendConfig;
use crate::core::{FormattedResult, Stage};
use crate::errors::{AnalysisError, Result};

/// Talks to the analysis backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStageClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStageClient {
    /// Creates a client from backend configuration.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Config` if a configured header is invalid or
    /// the HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AnalysisError::Config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AnalysisError::Config(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout()?)
            .default_headers(headers)
            .build()
            .map_err(|e| AnalysisError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Reads a response body as JSON, keeping non-JSON text as a string.
    async fn read_body(response: reqwest::Response) -> reqwest::Result<(StatusCode, serde_json::Value)> {
        let status = response.status();
        let text = response.text().await?;
        let value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(text),
        };
        Ok((status, value))
    }
}

fn failure_message(status: StatusCode, body: &serde_json::Value) -> String {
    error_message(body).unwrap_or_else(|| {
        format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string()
    })
}

#[async_trait]
impl RemoteStageClient for HttpStageClient {
    async fn submit_context(&self, context: &str) -> Result<ContextAck> {
        debug!(chars = context.len(), "Submitting context");
        let response = self
            .client
            .post(self.url("submit_context"))
            .json(&serde_json::json!({ "custom_context": context }))
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;

        if !status.is_success() {
            return Err(AnalysisError::network(format!(
                "failed to submit context: {}",
                failure_message(status, &body)
            )));
        }
        match body {
            serde_json::Value::Object(_) => Ok(serde_json::from_value(body)?),
            serde_json::Value::String(ref text) if text.trim().is_empty() => Ok(ContextAck::default()),
            other => Err(AnalysisError::Serialization(format!(
                "unexpected submit_context response: {other}"
            ))),
        }
    }

    async fn process(&self, stage: Stage, payload: serde_json::Value) -> Result<ProcessResponse> {
        debug!(stage = %stage, "Dispatching process call");
        let response = self
            .client
            .post(self.url(&format!("process/{stage}")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;
        let (status, body) = Self::read_body(response)
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;

        if !status.is_success() {
            return Err(AnalysisError::stage_processing(stage, failure_message(status, &body)));
        }
        ProcessResponse::from_value(stage, body)
    }

    async fn format(&self, stage: Stage, raw: serde_json::Value) -> Result<FormattedResult> {
        debug!(stage = %stage, "Dispatching format call");
        let response = self
            .client
            .post(self.url(&format!("format/{stage}")))
            .json(&serde_json::json!({ "content": raw }))
            .send()
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;
        let (status, body) = Self::read_body(response)
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;

        if !status.is_success() {
            return Err(AnalysisError::formatting(stage, failure_message(status, &body)));
        }
        Ok(FormattedResult::from_value(body))
    }

    async fn get_formatted_result(&self, stage: Stage) -> Result<PollResponse> {
        let response = self
            .client
            .get(self.url(&format!("get_formatted_result/{stage}")))
            .send()
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;
        let (status, body) = Self::read_body(response)
            .await
            .map_err(|e| AnalysisError::from(e).in_stage(stage))?;

        if !status.is_success() && error_message(&body).is_none() {
            return Err(AnalysisError::network_in(stage, failure_message(status, &body)));
        }
        PollResponse::from_value(stage, &body)
    }
}
