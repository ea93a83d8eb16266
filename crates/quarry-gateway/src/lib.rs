//! # quarry-gateway
//!
//! Pass-through client for the external LLM analysis service.
//!
//! The service takes `{ "file_path": ..., "prompt": ... }` and answers with a
//! JSON body that is returned to the caller untouched. One attempt per call,
//! no retries; an explicit timeout bounds every request.
//!
//! ```rust,ignore
//! let gateway = HttpAnalysisGateway::new(&config.analysis)?;
//! let answer = gateway.analyze("./files/1718000000000-demo.csv", "show totals").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use quarry_core::{AnalysisConfig, UpstreamError};
use reqwest::Client;
use serde::Serialize;

/// Anything that can answer a prompt about a stored data file.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Send `prompt` about the file at `file_location` and return the raw answer.
    async fn analyze(
        &self,
        file_location: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    file_path: &'a str,
    prompt: &'a str,
}

/// [`AnalysisGateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAnalysisGateway {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAnalysisGateway {
    /// Build a gateway for the configured endpoint and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &AnalysisConfig) -> Result<Self, UpstreamError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, err: &reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn analyze(
        &self,
        file_location: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        tracing::info!(
            endpoint = %self.endpoint,
            file_location,
            prompt_len = prompt.len(),
            "sending analysis request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&AnalyzeRequest {
                file_path: file_location,
                prompt,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "analysis service returned an error");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}
