//! Docforge completion client
//!
//! The completion service is an external black box that turns a prompt into
//! text. This crate defines the [`CompletionService`] seam used by the
//! enhancement cache and by the sandbox toolkit, plus an HTTP implementation.
//!
//! Every call is one independent request/response round trip. The client never
//! retries on its own; retry policy belongs to the caller.
//!
//! # Example
//!
//! ```no_run
//! use docforge_client::{CompletionClient, CompletionService};
//! use docforge_core::dto::completion::{CompletionMode, CompletionRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), docforge_client::ClientError> {
//!     let client = CompletionClient::new("http://localhost:8090");
//!
//!     let response = client
//!         .complete(&CompletionRequest {
//!             prompt: "Summarise Q3 revenue".to_string(),
//!             mode: CompletionMode::Text,
//!             session_id: "job-1".to_string(),
//!         })
//!         .await?;
//!
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

pub mod error;
mod completions;

pub use error::{ClientError, Result};

use async_trait::async_trait;
use docforge_core::dto::completion::{CompletionRequest, CompletionResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Seam to the external completion service
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one prompt and waits for the full text response
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

/// HTTP client for the completion service
#[derive(Debug, Clone)]
pub struct CompletionClient {
    /// Base URL of the service (e.g., "http://localhost:8090")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CompletionClient {
    /// Create a new completion client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the completion service
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new completion client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle a response and deserialize JSON
    ///
    /// Checks the status code and returns an appropriate error if the request
    /// failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Completion service used when no endpoint is configured
///
/// Every call fails, so artifacts that never call the toolkit still run.
#[derive(Debug, Clone, Default)]
pub struct DisabledCompletionService;

#[async_trait]
impl CompletionService for DisabledCompletionService {
    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        Err(ClientError::Unavailable(
            "no completion service URL configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_core::dto::completion::CompletionMode;

    #[test]
    fn test_client_creation() {
        let client = CompletionClient::new("http://localhost:8090");
        assert_eq!(client.base_url(), "http://localhost:8090");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CompletionClient::new("http://localhost:8090/");
        assert_eq!(client.base_url(), "http://localhost:8090");
    }

    #[tokio::test]
    async fn test_disabled_service_fails() {
        let service = DisabledCompletionService;
        let result = service
            .complete(&CompletionRequest {
                prompt: "hi".to_string(),
                mode: CompletionMode::Text,
                session_id: "s".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ClientError::Unavailable(_))));
    }
}
