//! Per-execution state handed to an artifact
//!
//! - [`CapabilityBinding`]: the services behind the toolkit table
//! - [`TemplateSnapshot`]: the template bytes `getSkeleton` reads
//! - [`ArtifactContext`]: the plain `context` value passed to `generate`

use chrono::{DateTime, Utc};
use docforge_client::CompletionService;
use docforge_core::domain::template::TemplateKind;
use serde::Serialize;
use std::sync::Arc;

use crate::service::LogBufferService;

/// Template bytes loaded once per job
#[derive(Clone)]
pub struct TemplateSnapshot {
    pub kind: TemplateKind,
    pub bytes: Arc<Vec<u8>>,
}

impl TemplateSnapshot {
    pub fn new(kind: TemplateKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            bytes: Arc::new(bytes),
        }
    }
}

/// Fixed set of services granted to one execution
#[derive(Clone)]
pub struct CapabilityBinding {
    /// Sent along with every completion request
    pub session_id: String,
    pub completion: Arc<dyn CompletionService>,
    pub template: TemplateSnapshot,
    pub log_buffer: Arc<dyn LogBufferService>,
}

/// The `context` argument of `generate`
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactContext {
    pub customer_id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub job_id: String,
    pub now: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
