//! Generation results produced by transformation artifacts
//!
//! A result is a tagged variant keyed by template kind. The merge engine only
//! accepts the shapes that belong to the template it is merging into.

use serde::{Deserialize, Serialize};

use crate::domain::template::TemplateKind;
use crate::error::GenerationError;

/// Abstract output of one sandboxed execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationResult {
    /// Body-level WordprocessingML fragment
    Document {
        markup: String,
        /// Standalone package whose relationships the fragment refers to
        #[serde(skip)]
        source_package: Option<Vec<u8>>,
    },
    /// Ordered workbook mutations
    Spreadsheet { sheet_ops: Vec<SheetOp> },
    /// Structural nodes collected by the builder capability
    BuilderDocument { nodes: Vec<BlockNode> },
}

impl GenerationResult {
    pub fn document(markup: impl Into<String>) -> Self {
        GenerationResult::Document {
            markup: markup.into(),
            source_package: None,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            GenerationResult::Document { .. } => "document",
            GenerationResult::Spreadsheet { .. } => "spreadsheet",
            GenerationResult::BuilderDocument { .. } => "builder_document",
        }
    }

    /// Template kind this result can be merged into
    pub fn template_kind(&self) -> TemplateKind {
        match self {
            GenerationResult::Document { .. } | GenerationResult::BuilderDocument { .. } => {
                TemplateKind::Document
            }
            GenerationResult::Spreadsheet { .. } => TemplateKind::Spreadsheet,
        }
    }

    /// Rejects a result whose shape does not belong to `kind`
    pub fn ensure_kind(&self, kind: TemplateKind) -> Result<(), GenerationError> {
        if self.template_kind() == kind {
            Ok(())
        } else {
            Err(GenerationError::ResultShape {
                expected: kind.to_string(),
                actual: self.shape_name().to_string(),
            })
        }
    }
}

/// One declarative workbook mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SheetOp {
    InsertRows {
        #[serde(default)]
        sheet: Option<String>,
        at: u32,
        count: u32,
        #[serde(default)]
        copy_style_from_row: Option<u32>,
    },
    SetCells {
        #[serde(default)]
        sheet: Option<String>,
        cells: Vec<CellWrite>,
    },
    WriteRange {
        #[serde(default)]
        sheet: Option<String>,
        start: String,
        values: Vec<Vec<CellValue>>,
        #[serde(default)]
        number_format: Option<String>,
    },
}

impl SheetOp {
    pub fn sheet(&self) -> Option<&str> {
        match self {
            SheetOp::InsertRows { sheet, .. }
            | SheetOp::SetCells { sheet, .. }
            | SheetOp::WriteRange { sheet, .. } => sheet.as_deref(),
        }
    }
}

/// Single cell write at an A1-style address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellWrite {
    pub address: String,
    pub value: CellValue,
    #[serde(default)]
    pub number_format: Option<String>,
}

/// Scalar cell value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

/// Structural node of a builder document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockNode {
    Heading { level: u8, runs: Vec<Run> },
    Paragraph { runs: Vec<Run> },
    BulletItem { runs: Vec<Run> },
    NumberedItem { runs: Vec<Run> },
    Table {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        widths: Option<Vec<u32>>,
    },
    PageBreak,
}

/// Formatted span of text
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub text: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strike: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreadsheet_result_rejected_for_document() {
        let result = GenerationResult::Spreadsheet { sheet_ops: vec![] };
        let err = result.ensure_kind(TemplateKind::Document).unwrap_err();
        assert!(matches!(err, GenerationError::ResultShape { .. }));
    }

    #[test]
    fn test_builder_result_accepted_for_document() {
        let result = GenerationResult::BuilderDocument { nodes: vec![] };
        assert!(result.ensure_kind(TemplateKind::Document).is_ok());
        assert!(result.ensure_kind(TemplateKind::Spreadsheet).is_err());
    }

    #[test]
    fn test_sheet_op_from_json() {
        let op: SheetOp = serde_json::from_value(serde_json::json!({
            "op": "write_range",
            "start": "B2",
            "values": [[1, "two", null, true]]
        }))
        .unwrap();

        match op {
            SheetOp::WriteRange { start, values, .. } => {
                assert_eq!(start, "B2");
                assert_eq!(
                    values[0],
                    vec![
                        CellValue::Number(1.0),
                        CellValue::Text("two".to_string()),
                        CellValue::Null,
                        CellValue::Bool(true),
                    ]
                );
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }
}
