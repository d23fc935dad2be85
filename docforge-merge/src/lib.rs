//! Template merge engine
//!
//! Splices generation results into `.docx` and `.xlsx` templates. The
//! template bytes are never modified; every merge produces a new archive in
//! which only the edited parts differ.

pub mod docx;
pub mod html;
pub mod package;
pub mod render;
pub mod skeleton;
pub mod standalone;
pub mod xlsx;
pub mod xml;

use docforge_core::GenerationError;
use docforge_core::domain::result::GenerationResult;
use docforge_core::domain::template::TemplateKind;
use tracing::debug;

pub use docx::{locate_body_window, merge_document};
pub use html::{html_to_docx, markdown_to_html};
pub use render::render_nodes;
pub use skeleton::{SkeletonFormat, skeleton};
pub use xlsx::merge_workbook;

/// Merged archive plus the degradation notice, if the fragment could not be
/// spliced as-is
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub bytes: Vec<u8>,
    pub degradation: Option<MergeDegradation>,
}

/// The fragment was replaced by a standalone document built from it
#[derive(Debug, Clone, PartialEq)]
pub struct MergeDegradation {
    pub reason: String,
}

impl std::fmt::Display for MergeDegradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MergeDegradation: {}", self.reason)
    }
}

/// Merges `result` into `template`
///
/// A result whose shape does not belong to `kind` is rejected with
/// `ResultShape` before the archive is opened.
pub fn merge(kind: TemplateKind, template: &[u8], result: &GenerationResult) -> Result<MergeOutput, GenerationError> {
    result.ensure_kind(kind)?;
    debug!("Merging {} result into {} template", result.shape_name(), kind);

    match result {
        GenerationResult::Document {
            markup,
            source_package,
        } => merge_document(template, markup, source_package.as_deref()),
        GenerationResult::BuilderDocument { nodes } => merge_document(template, &render_nodes(nodes), None),
        GenerationResult::Spreadsheet { sheet_ops } => merge_workbook(template, sheet_ops),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::package::tests::zip_of;
    use docforge_core::domain::result::{BlockNode, Run};

    fn document_template() -> Vec<u8> {
        zip_of(&[(
            "word/document.xml",
            r#"<w:document><w:body><w:p><w:r><w:t>X</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#,
        )])
    }

    #[test]
    fn test_builder_result_is_rendered_and_spliced() {
        let result = GenerationResult::BuilderDocument {
            nodes: vec![
                BlockNode::Heading {
                    level: 1,
                    runs: vec![Run::plain("Title")],
                },
                BlockNode::Paragraph {
                    runs: vec![Run::plain("Body")],
                },
            ],
        };

        let output = merge(TemplateKind::Document, &document_template(), &result).unwrap();
        assert!(output.degradation.is_none());
        let xml = Package::open(&output.bytes)
            .unwrap()
            .read_string("word/document.xml")
            .unwrap()
            .unwrap();
        assert!(xml.starts_with(r#"<w:document><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/>"#));
        assert!(xml.ends_with(r#"Body</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#));
    }

    #[test]
    fn test_mismatched_shape_is_rejected() {
        let result = GenerationResult::Spreadsheet { sheet_ops: vec![] };
        let err = merge(TemplateKind::Document, &document_template(), &result).unwrap_err();
        assert_eq!(err.kind(), "ResultShapeError");
    }
}
