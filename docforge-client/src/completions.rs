//! Completion endpoint

use async_trait::async_trait;
use docforge_core::dto::completion::{CompletionRequest, CompletionResponse};
use tracing::debug;

use crate::error::Result;
use crate::{CompletionClient, CompletionService};

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/completions", self.base_url);
        debug!(
            "Requesting {:?} completion for session {} ({} prompt chars)",
            request.mode,
            request.session_id,
            request.prompt.len()
        );

        let response = self.client.post(&url).json(request).send().await?;

        self.handle_response(response).await
    }
}
