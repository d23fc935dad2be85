//! Error taxonomy for generation jobs

use std::time::Duration;
use thiserror::Error;

/// Result type alias for generation stages
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Everything that can stop a generation
///
/// `Validation` is returned before a job exists; every other variant is
/// recorded on the job it happened in.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Missing or invalid request input
    #[error("ValidationError: {0}")]
    Validation(String),

    /// Template does not match the structure the merge engine relies on
    #[error("TemplateStructureError: {0}")]
    TemplateStructure(String),

    /// Completion response failed the entry-point contract
    #[error("EnhancementError: {0}")]
    Enhancement(String),

    /// Artifact does not expose the required entry point
    #[error("ContractViolation: {0}")]
    ContractViolation(String),

    /// Artifact raised an error while running
    #[error("RuntimeError: {0}")]
    Runtime(String),

    /// Artifact exceeded its wall-clock budget
    #[error("TimeoutError: execution exceeded {}s", .0.as_secs())]
    Timeout(Duration),

    /// Returned value does not match the template kind
    #[error("ResultShapeError: expected a {expected} result, got {actual}")]
    ResultShape { expected: String, actual: String },

    /// Completion service could not be reached or answered with an error
    #[error("CompletionError: {0}")]
    Completion(String),

    /// Job store, cache or output I/O failed
    #[error("StorageError: {0}")]
    Storage(String),
}

impl GenerationError {
    /// Short name of the error kind, as used in job logs
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Validation(_) => "ValidationError",
            GenerationError::TemplateStructure(_) => "TemplateStructureError",
            GenerationError::Enhancement(_) => "EnhancementError",
            GenerationError::ContractViolation(_) => "ContractViolation",
            GenerationError::Runtime(_) => "RuntimeError",
            GenerationError::Timeout(_) => "TimeoutError",
            GenerationError::ResultShape { .. } => "ResultShapeError",
            GenerationError::Completion(_) => "CompletionError",
            GenerationError::Storage(_) => "StorageError",
        }
    }

    pub fn template_structure(message: impl Into<String>) -> Self {
        GenerationError::TemplateStructure(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        GenerationError::Storage(message.into())
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(err: std::io::Error) -> Self {
        GenerationError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_and_runtime_messages_differ() {
        let timeout = GenerationError::Timeout(Duration::from_secs(600));
        let runtime = GenerationError::Runtime("boom".to_string());
        assert_eq!(timeout.to_string(), "TimeoutError: execution exceeded 600s");
        assert_eq!(runtime.to_string(), "RuntimeError: boom");
        assert_ne!(timeout.kind(), runtime.kind());
    }
}
