//! Template descriptors handed over by the template store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of binary template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Document,
    Spreadsheet,
}

impl TemplateKind {
    /// File extension of the template and of generated output
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateKind::Document => "docx",
            TemplateKind::Spreadsheet => "xlsx",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateKind::Document => f.write_str("document"),
            TemplateKind::Spreadsheet => f.write_str("spreadsheet"),
        }
    }
}

/// Resolved template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: String,
    pub kind: TemplateKind,
    pub template_path: PathBuf,
    /// Base transformation code
    pub artifact_path: PathBuf,
    /// Directory where enhanced artifacts for this template are cached
    pub cache_dir: PathBuf,
}
