//! Plain renderings of a template body, handed to artifacts and to the
//! enhancement prompt

use docforge_core::GenerationError;
use docforge_core::domain::template::TemplateKind;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::docx::{DEFAULT_DOCUMENT_PART, locate_body_window};
use crate::package::Package;
use crate::xlsx::{CELL, ROW, SHEET_DATA, read_sheets};
use crate::xml::{decode_entities, get_attr};

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
/// Rows listed per sheet before the rest is summarized
const MAX_SHEET_ROWS: usize = 200;

static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?tbl\b.*?</(?:\w+:)?tbl>|<(?:\w+:)?p\b[^>]*?(?:/>|>.*?</(?:\w+:)?p>)")
        .unwrap()
});
static TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(?:\w+:)?t\b[^>]*?(?:/>|>(.*?)</(?:\w+:)?t>)").unwrap());
static PARAGRAPH_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<(?:\w+:)?pStyle\b[^>]*?(?:\w+:)?val="([^"]*)""#).unwrap());
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(?:\w+:)?numPr\b").unwrap());
static TABLE_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<(?:\w+:)?tbl\b").unwrap());
static TABLE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(?:\w+:)?tr\b.*?</(?:\w+:)?tr>").unwrap());
static TABLE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(?:\w+:)?tc\b.*?</(?:\w+:)?tc>").unwrap());
static SHARED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si\b[^>]*?(?:/>|>(.*?)</si>)").unwrap());
static VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<v>(.*?)</v>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkeletonFormat {
    /// Headings, list items and table rows as lines of text
    #[default]
    Text,
    /// Raw body or sheet-data XML
    Markup,
}

impl FromStr for SkeletonFormat {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(SkeletonFormat::Text),
            "markup" | "xml" => Ok(SkeletonFormat::Markup),
            other => Err(GenerationError::Validation(format!(
                "unknown skeleton format '{}', expected 'text' or 'markup'",
                other
            ))),
        }
    }
}

pub fn skeleton(kind: TemplateKind, template: &[u8], format: SkeletonFormat) -> Result<String, GenerationError> {
    match kind {
        TemplateKind::Document => document_skeleton(template, format),
        TemplateKind::Spreadsheet => workbook_skeleton(template, format),
    }
}

fn joined_text(xml: &str) -> String {
    TEXT.captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .collect()
}

fn heading_level(style: &str) -> Option<usize> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let lower = style.to_ascii_lowercase();
    let level = lower.strip_prefix("heading")?.trim().parse::<usize>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

fn document_skeleton(template: &[u8], format: SkeletonFormat) -> Result<String, GenerationError> {
    let mut package = Package::open(template)?;
    let part = package.main_part(DEFAULT_DOCUMENT_PART)?;
    let xml = package.require_string(&part)?;
    let window = locate_body_window(&xml)?;
    let body = &xml[window.start..window.end];

    if format == SkeletonFormat::Markup {
        return Ok(body.to_string());
    }

    let mut lines = Vec::new();
    for block in BLOCK.find_iter(body) {
        let block = block.as_str();
        if TABLE_START.is_match(block) {
            for row in TABLE_ROW.find_iter(block) {
                let cells: Vec<String> = TABLE_CELL
                    .find_iter(row.as_str())
                    .map(|cell| joined_text(cell.as_str()).trim().to_string())
                    .collect();
                lines.push(format!("| {} |", cells.join(" | ")));
            }
            continue;
        }

        let text = joined_text(block);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let style = PARAGRAPH_STYLE.captures(block).map(|c| c[1].to_string());
        match style.as_deref().and_then(heading_level) {
            Some(level) => lines.push(format!("{} {}", "#".repeat(level), text)),
            None if NUMBERING.is_match(block) || style.as_deref().is_some_and(|s| s.starts_with("List")) => {
                lines.push(format!("- {}", text))
            }
            None => lines.push(text.to_string()),
        }
    }
    Ok(lines.join("\n"))
}

fn cell_text(attrs: &str, inner: &str, shared: &[String]) -> String {
    let value = || VALUE.captures(inner).map(|c| decode_entities(&c[1]));
    match get_attr(attrs, "t").as_deref() {
        Some("s") => value()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => joined_text(inner),
        Some("b") => match value().as_deref() {
            Some("1") => "TRUE".to_string(),
            Some(_) => "FALSE".to_string(),
            None => String::new(),
        },
        _ => value().unwrap_or_default(),
    }
}

fn workbook_skeleton(template: &[u8], format: SkeletonFormat) -> Result<String, GenerationError> {
    let sheets = read_sheets(template)?;
    let shared: Vec<String> = Package::open(template)?
        .read_string(SHARED_STRINGS_PART)?
        .map(|xml| {
            SHARED_STRING
                .captures_iter(&xml)
                .map(|c| c.get(1).map(|m| joined_text(m.as_str())).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    let mut out = Vec::new();
    for (name, xml) in sheets {
        let data = SHEET_DATA.captures(&xml);
        if format == SkeletonFormat::Markup {
            out.push(format!("<!-- sheet: {} -->", name));
            out.push(data.and_then(|c| c.get(0)).map(|m| m.as_str().to_string()).unwrap_or_default());
            continue;
        }

        out.push(format!("## {}", name));
        let inner = data.and_then(|c| c.get(1)).map(|m| m.as_str()).unwrap_or("");
        let rows: Vec<String> = ROW
            .find_iter(inner)
            .filter_map(|row| {
                let cells: Vec<String> = CELL
                    .captures_iter(row.as_str())
                    .filter_map(|cell| {
                        let attrs = &cell[1];
                        let text = cell_text(attrs, cell.get(2).map(|m| m.as_str()).unwrap_or(""), &shared);
                        let reference = get_attr(attrs, "r")?;
                        (!text.is_empty()).then(|| format!("{}: {}", reference, text))
                    })
                    .collect();
                (!cells.is_empty()).then(|| cells.join(" | "))
            })
            .collect();
        let total = rows.len();
        out.extend(rows.into_iter().take(MAX_SHEET_ROWS));
        if total > MAX_SHEET_ROWS {
            out.push(format!("... {} more rows", total - MAX_SHEET_ROWS));
        }
    }
    Ok(out.join("\n"))
}
