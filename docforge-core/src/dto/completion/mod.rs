//! Completion service wire format

use serde::{Deserialize, Serialize};

/// How the caller intends to use the completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    Json,
    Query,
    Text,
    Enhance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub mode: CompletionMode,
    /// Job id, used by the service for observability only
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}
