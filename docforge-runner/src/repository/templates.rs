//! Template store
//!
//! Resolves a template id to its binary template, its base artifact and the
//! directory enhanced artifacts are cached in.

use async_trait::async_trait;
use docforge_core::GenerationError;
use docforge_core::domain::template::{TemplateDescriptor, TemplateKind};
use std::path::PathBuf;
use tracing::debug;

/// File name of the base artifact inside a template directory
pub const ARTIFACT_FILE: &str = "generate.lua";
/// Name of the cache directory inside a template directory
pub const CACHE_DIR: &str = ".cache";

/// Repository trait for template lookup
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Resolves `template_id`
    ///
    /// Unknown or incomplete templates are a `Validation` error.
    async fn resolve(&self, template_id: &str) -> Result<TemplateDescriptor, GenerationError>;
}

/// Directory-backed template store
///
/// Layout: `<root>/<id>/template.docx` or `template.xlsx`, the base artifact
/// `<root>/<id>/generate.lua` and the cache directory `<root>/<id>/.cache`.
pub struct DirectoryTemplateStore {
    root: PathBuf,
}

impl DirectoryTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn validate_id(template_id: &str) -> Result<(), GenerationError> {
    let valid = !template_id.is_empty()
        && template_id != "."
        && template_id != ".."
        && !template_id.contains(['/', '\\'])
        && !template_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(GenerationError::Validation(format!(
            "invalid template id '{}'",
            template_id
        )))
    }
}

#[async_trait]
impl TemplateStore for DirectoryTemplateStore {
    async fn resolve(&self, template_id: &str) -> Result<TemplateDescriptor, GenerationError> {
        validate_id(template_id)?;
        let dir = self.root.join(template_id);

        let mut found = None;
        for kind in [TemplateKind::Document, TemplateKind::Spreadsheet] {
            let path = dir.join(format!("template.{}", kind.extension()));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                found = Some((kind, path));
                break;
            }
        }
        let (kind, template_path) = found.ok_or_else(|| {
            GenerationError::Validation(format!("unknown template '{}'", template_id))
        })?;

        let artifact_path = dir.join(ARTIFACT_FILE);
        if !tokio::fs::try_exists(&artifact_path).await.unwrap_or(false) {
            return Err(GenerationError::Validation(format!(
                "template '{}' has no {}",
                template_id, ARTIFACT_FILE
            )));
        }

        debug!("Resolved template {} ({}) at {}", template_id, kind, dir.display());
        Ok(TemplateDescriptor {
            id: template_id.to_string(),
            kind,
            template_path,
            artifact_path,
            cache_dir: dir.join(CACHE_DIR),
        })
    }
}
