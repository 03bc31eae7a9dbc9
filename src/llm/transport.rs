//! HTTP transport used by the LLM client.
//!
//! The client only needs "POST this JSON, give me status and body", so the
//! network sits behind the [`Transport`] trait. [`ReqwestTransport`] is the
//! production implementation; tests script responses with their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::LlmError;

/// A fully built outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Header name/value pairs, in send order.
    pub headers: Vec<(String, String)>,
    /// JSON request body.
    pub body: serde_json::Value,
    /// Timeout for this single attempt.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and reports what came back.
///
/// Connection failures and timeouts are reported as
/// [`LlmError::RequestFailed`]; any HTTP status, successful or not, is an
/// `Ok` response for the caller to classify.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, LlmError>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport with a fresh HTTP client.
    pub fn new() -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, LlmError> {
        let mut http_request = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .json(&request.body);

        for (name, value) in &request.headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        let http_response = http_request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status().as_u16();
        let body = http_response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}
