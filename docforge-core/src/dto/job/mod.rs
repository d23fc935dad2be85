//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobSpec;

/// Request to generate one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Caller-chosen job id, so the caller can cancel before the job exists
    pub job_id: Option<String>,
    pub customer_id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub output_name: Option<String>,
    /// Free-text instructions passed to the artifact and the enhancement prompt
    pub instructions: Option<String>,
    /// Use the enhancement cache instead of the base artifact
    #[serde(default)]
    pub enhance: bool,
    /// Regenerate the enhanced artifact even if the cache is fresh
    #[serde(default)]
    pub refresh: bool,
    /// Metadata about relevant documents, embedded in the enhancement prompt
    pub document_metadata: Option<String>,
}

impl GenerationRequest {
    pub fn spec(&self) -> JobSpec {
        JobSpec {
            customer_id: self.customer_id.clone(),
            workspace_id: self.workspace_id.clone(),
            template_id: self.template_id.clone(),
            output_name: self.output_name.clone(),
        }
    }
}
