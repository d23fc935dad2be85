//! Spreadsheet merge path
//!
//! Sheet operations are applied to the worksheet XML row by row. A row is only
//! re-serialized when an operation touches it (renumbering counts as a
//! touch); every other row keeps its original bytes, and sheets that no
//! operation names are copied raw from the template archive.
//!
//! Formulas, the calculation chain, conditional formats and data validations
//! are not adjusted when rows move.

use docforge_core::GenerationError;
use docforge_core::domain::result::{CellValue, SheetOp};
use regex::{Captures, NoExpand, Regex};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::MergeOutput;
use crate::package::{Package, attributes, parse_relationships, part_dir, rels_path_for, resolve_target, rewrite};
use crate::xml::{decode_entities, escape_attr, escape_text, get_attr, set_attr};

pub const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const STYLES_PART: &str = "xl/styles.xml";

const MAX_ROW: u32 = 1_048_576;
const MAX_COL: u32 = 16_384;
/// First id available for custom number formats
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

static SHEET_ENTRY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<sheet\b[^>]*>").unwrap());
pub(crate) static SHEET_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<sheetData\b[^>]*?(?:/>|>(.*?)</sheetData>)").unwrap()
});
pub(crate) static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<row\b[^>]*?(?:/>|>.*?</row>)").unwrap());
static ROW_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<row\b([^>]*?)(?:/>|>(.*)</row>)$").unwrap());
pub(crate) static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").unwrap());
static CELL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)(\d+)$").unwrap());
static DIMENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(<dimension\b[^>]*?\bref=")([^"]*)(")"#).unwrap());
static RANGE_REFS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<(?:mergeCell|hyperlink)\b[^>]*?\bref=")([^"]*)(")"#).unwrap()
});
static NUM_FMTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<numFmts\b[^>]*?(?:/>|>(.*?)</numFmts>)").unwrap());
static NUM_FMT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<numFmt\b[^>]*>").unwrap());
static CELL_XFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<cellXfs\b[^>]*?(?:/>|>(.*?)</cellXfs>)").unwrap());
static XF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<xf\b[^>]*?(?:/>|>.*?</xf>)").unwrap());
static STYLE_SHEET_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<styleSheet\b[^>]*>").unwrap());

/// Converts a 1-based column index to letters (`1` -> `A`, `28` -> `AB`)
pub fn column_name(mut col: u32) -> String {
    let mut name = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        name.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// Converts column letters to a 1-based index
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        c.is_ascii_uppercase()
            .then(|| acc * 26 + (c as u32 - 'A' as u32 + 1))
    })
}

/// Parses an `A1`-style reference into `(column, row)`, both 1-based
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let caps = CELL_REF.captures(reference.trim())?;
    let col = column_index(&caps[2])?;
    let row: u32 = caps[4].parse().ok()?;
    (col >= 1 && col <= MAX_COL && row >= 1 && row <= MAX_ROW).then_some((col, row))
}

fn invalid_address(address: &str) -> GenerationError {
    GenerationError::ResultShape {
        expected: "A1-style cell address".to_string(),
        actual: address.to_string(),
    }
}

fn structure(message: impl Into<String>) -> GenerationError {
    GenerationError::template_structure(message)
}

/// Shifts every row reference at or below `at` by `count` in a (space
/// separated list of) cell or range references
fn shift_refs(refs: &str, at: u32, count: u32) -> String {
    refs.split(' ')
        .map(|range| {
            range
                .split(':')
                .map(|part| match CELL_REF.captures(part) {
                    Some(caps) => {
                        let row: u32 = caps[4].parse().unwrap_or(0);
                        let row = if row >= at { row + count } else { row };
                        format!("{}{}{}{}", &caps[1], &caps[2], &caps[3], row)
                    }
                    None => part.to_string(),
                })
                .collect::<Vec<_>>()
                .join(":")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn replace_ref_attr(xml: &str, re: &Regex, f: impl Fn(&str) -> String) -> String {
    re.replace_all(xml, |caps: &Captures| format!("{}{}{}", &caps[1], f(&caps[2]), &caps[3]))
        .into_owned()
}

#[derive(Debug, Clone)]
struct Cell {
    col: u32,
    attrs: String,
    inner: Option<String>,
}

impl Cell {
    fn empty(col: u32, row: u32) -> Self {
        Self {
            col,
            attrs: format!(r#" r="{}{}""#, column_name(col), row),
            inner: None,
        }
    }

    fn style(&self) -> u32 {
        get_attr(&self.attrs, "s")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    fn write(&mut self, value: &CellValue) {
        let mut attrs = set_attr(&self.attrs, "t", None);
        let inner = match value {
            CellValue::Number(n) if n.is_finite() => Some(format!("<v>{}</v>", format_number(*n))),
            CellValue::Number(n) => {
                warn!("Clearing cell: {} cannot be stored", n);
                None
            }
            CellValue::Bool(b) => {
                attrs = set_attr(&attrs, "t", Some("b"));
                Some(format!("<v>{}</v>", u8::from(*b)))
            }
            CellValue::Text(text) => {
                attrs = set_attr(&attrs, "t", Some("inlineStr"));
                Some(format!(
                    r#"<is><t xml:space="preserve">{}</t></is>"#,
                    escape_text(text)
                ))
            }
            CellValue::Null => None,
        };
        self.attrs = attrs;
        self.inner = inner;
    }

    fn to_xml(&self) -> String {
        match &self.inner {
            Some(inner) => format!("<c{}>{}</c>", self.attrs, inner),
            None => format!("<c{}/>", self.attrs),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone)]
struct ParsedRow {
    attrs: String,
    cells: Vec<Cell>,
}

impl ParsedRow {
    fn parse(raw: &str) -> Result<Self, GenerationError> {
        let caps = ROW_PARTS
            .captures(raw)
            .ok_or_else(|| structure("malformed row element"))?;
        let attrs = caps[1].to_string();
        let mut cells = Vec::new();
        if let Some(inner) = caps.get(2) {
            let mut previous = 0;
            for cell in CELL.captures_iter(inner.as_str()) {
                let cell_attrs = cell[1].to_string();
                let col = get_attr(&cell_attrs, "r")
                    .and_then(|r| parse_cell_ref(&r))
                    .map(|(col, _)| col)
                    .unwrap_or(previous + 1);
                previous = col;
                cells.push(Cell {
                    col,
                    attrs: cell_attrs,
                    inner: cell.get(2).map(|m| m.as_str().to_string()),
                });
            }
        }
        Ok(Self { attrs, cells })
    }

    fn cell_mut(&mut self, col: u32, row: u32) -> &mut Cell {
        let index = match self.cells.binary_search_by_key(&col, |c| c.col) {
            Ok(index) => index,
            Err(index) => {
                self.cells.insert(index, Cell::empty(col, row));
                // cached column span no longer matches
                self.attrs = set_attr(&self.attrs, "spans", None);
                index
            }
        };
        &mut self.cells[index]
    }
}

#[derive(Debug, Clone)]
struct Row {
    num: u32,
    raw: String,
    parsed: Option<ParsedRow>,
}

impl Row {
    fn new(num: u32, attrs: String, cells: Vec<Cell>) -> Self {
        Self {
            num,
            raw: String::new(),
            parsed: Some(ParsedRow { attrs, cells }),
        }
    }

    fn parsed_mut(&mut self) -> Result<&mut ParsedRow, GenerationError> {
        if self.parsed.is_none() {
            self.parsed = Some(ParsedRow::parse(&self.raw)?);
        }
        self.parsed
            .as_mut()
            .ok_or_else(|| structure("row could not be parsed"))
    }

    fn renumber(&mut self, num: u32) -> Result<(), GenerationError> {
        let parsed = self.parsed_mut()?;
        parsed.attrs = set_attr(&parsed.attrs, "r", Some(&num.to_string()));
        for cell in &mut parsed.cells {
            cell.attrs = set_attr(
                &cell.attrs,
                "r",
                Some(&format!("{}{}", column_name(cell.col), num)),
            );
        }
        self.num = num;
        Ok(())
    }

    fn to_xml(&self) -> String {
        match &self.parsed {
            None => self.raw.clone(),
            Some(parsed) if parsed.cells.is_empty() => format!("<row{}/>", parsed.attrs),
            Some(parsed) => {
                let cells: String = parsed.cells.iter().map(Cell::to_xml).collect();
                format!("<row{}>{}</row>", parsed.attrs, cells)
            }
        }
    }
}

/// One worksheet split around its `sheetData`
#[derive(Debug, Clone)]
struct SheetDoc {
    head: String,
    rows: Vec<Row>,
    tail: String,
    /// Largest (column, row) written, for the dimension reference
    extent: Option<(u32, u32)>,
}

impl SheetDoc {
    fn parse(xml: &str) -> Result<Self, GenerationError> {
        let caps = SHEET_DATA
            .captures(xml)
            .ok_or_else(|| structure("worksheet has no sheetData element"))?;
        let whole = caps.get(0).ok_or_else(|| structure("worksheet has no sheetData element"))?;

        let (head, inner, tail) = match caps.get(1) {
            Some(inner) => (
                xml[..inner.start()].to_string(),
                inner.as_str(),
                xml[inner.end()..].to_string(),
            ),
            None => (
                format!("{}<sheetData>", &xml[..whole.start()]),
                "",
                format!("</sheetData>{}", &xml[whole.end()..]),
            ),
        };

        let mut rows = Vec::new();
        let mut previous = 0;
        for m in ROW.find_iter(inner) {
            let raw = m.as_str();
            let end = raw.find('>').unwrap_or(raw.len());
            let num: u32 = get_attr(&raw[..end], "r")
                .and_then(|r| r.parse().ok())
                .unwrap_or(previous + 1);
            if num == 0 || num > MAX_ROW {
                return Err(structure(format!("row number {} is outside the sheet", num)));
            }
            previous = num;
            rows.push(Row {
                num,
                raw: raw.to_string(),
                parsed: None,
            });
        }
        rows.sort_by_key(|r| r.num);

        Ok(Self {
            head,
            rows,
            tail,
            extent: None,
        })
    }

    fn row_mut(&mut self, num: u32) -> &mut Row {
        let index = match self.rows.binary_search_by_key(&num, |r| r.num) {
            Ok(index) => index,
            Err(index) => {
                self.rows
                    .insert(index, Row::new(num, format!(r#" r="{}""#, num), Vec::new()));
                index
            }
        };
        &mut self.rows[index]
    }

    fn insert_rows(&mut self, at: u32, count: u32, copy_style_from: Option<u32>) -> Result<(), GenerationError> {
        if count == 0 {
            return Ok(());
        }
        if at == 0 || at.saturating_add(count - 1) > MAX_ROW {
            return Err(GenerationError::ResultShape {
                expected: format!("rows within 1..={}", MAX_ROW),
                actual: format!("insert of {} rows at {}", count, at),
            });
        }
        if let Some(s) = copy_style_from {
            if s == 0 || s > MAX_ROW {
                return Err(GenerationError::ResultShape {
                    expected: format!("style source row within 1..={}", MAX_ROW),
                    actual: s.to_string(),
                });
            }
        }

        for row in self.rows.iter_mut().rev().filter(|r| r.num >= at) {
            let shifted = row
                .num
                .checked_add(count)
                .filter(|n| *n <= MAX_ROW)
                .ok_or_else(|| structure(format!("row {} would move past the last sheet row", row.num)))?;
            row.renumber(shifted)?;
        }

        self.head = replace_ref_attr(&self.head, &DIMENSION, |r| shift_refs(r, at, count));
        self.tail = replace_ref_attr(&self.tail, &RANGE_REFS, |r| shift_refs(r, at, count));

        // style source is addressed by its row number before the insert
        let source = copy_style_from.map(|s| if s >= at { s + count } else { s });
        let template = match source {
            Some(num) => match self.rows.binary_search_by_key(&num, |r| r.num) {
                Ok(index) => Some(match &self.rows[index].parsed {
                    Some(parsed) => parsed.clone(),
                    None => ParsedRow::parse(&self.rows[index].raw)?,
                }),
                Err(_) => {
                    warn!("Style source row {} does not exist; inserting plain rows", num);
                    None
                }
            },
            None => None,
        };

        let position = self.rows.partition_point(|r| r.num < at);
        let new_rows: Vec<Row> = (at..at + count)
            .map(|num| match &template {
                Some(t) => Row::new(
                    num,
                    set_attr(&t.attrs, "r", Some(&num.to_string())),
                    t.cells
                        .iter()
                        .filter_map(|c| {
                            get_attr(&c.attrs, "s").map(|s| Cell {
                                col: c.col,
                                attrs: format!(r#" r="{}{}" s="{}""#, column_name(c.col), num, escape_attr(&s)),
                                inner: None,
                            })
                        })
                        .collect(),
                ),
                None => Row::new(num, format!(r#" r="{}""#, num), Vec::new()),
            })
            .collect();
        self.rows.splice(position..position, new_rows);

        if let Some((col, row)) = self.extent {
            self.extent = Some((col, if row >= at { row + count } else { row }));
        }
        Ok(())
    }

    fn write(
        &mut self,
        col: u32,
        row: u32,
        value: &CellValue,
        number_format: Option<&str>,
        styles: &mut Option<StyleBook>,
    ) -> Result<(), GenerationError> {
        let cell = self.row_mut(row).parsed_mut()?.cell_mut(col, row);
        cell.write(value);
        if let Some(code) = number_format {
            let book = styles
                .as_mut()
                .ok_or_else(|| structure("workbook has no styles part for number formats"))?;
            let style = book.style_with_format(cell.style(), code);
            cell.attrs = set_attr(&cell.attrs, "s", Some(&style.to_string()));
        }
        self.extent = Some(match self.extent {
            Some((c, r)) => (c.max(col), r.max(row)),
            None => (col, row),
        });
        Ok(())
    }

    fn to_xml(&self) -> String {
        let head = match self.extent {
            Some((col, row)) => replace_ref_attr(&self.head, &DIMENSION, |r| expand_dimension(r, col, row)),
            None => self.head.clone(),
        };
        let rows: String = self.rows.iter().map(Row::to_xml).collect();
        format!("{}{}{}", head, rows, self.tail)
    }
}

fn expand_dimension(reference: &str, col: u32, row: u32) -> String {
    let (first, last) = reference.split_once(':').unwrap_or((reference, reference));
    let (Some((c1, r1)), Some((c2, r2))) = (parse_cell_ref(first), parse_cell_ref(last)) else {
        return reference.to_string();
    };
    format!(
        "{}{}:{}{}",
        column_name(c1.min(col)),
        r1.min(row),
        column_name(c2.max(col)),
        r2.max(row)
    )
}

fn builtin_num_fmt(code: &str) -> Option<u32> {
    Some(match code {
        "General" => 0,
        "0" => 1,
        "0.00" => 2,
        "#,##0" => 3,
        "#,##0.00" => 4,
        "0%" => 9,
        "0.00%" => 10,
        "0.00E+00" => 11,
        "mm-dd-yy" => 14,
        "d-mmm-yy" => 15,
        "h:mm" => 20,
        "@" => 49,
        _ => return None,
    })
}

const DEFAULT_XF: &str = r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#;

/// Number formats and cell formats of `styles.xml`
#[derive(Debug, Clone)]
struct StyleBook {
    xml: String,
    num_fmts: Vec<(u32, String)>,
    xfs: Vec<String>,
    dirty: bool,
    cache: HashMap<(u32, u32), u32>,
}

impl StyleBook {
    fn parse(xml: String) -> Self {
        let num_fmts: Vec<(u32, String)> = NUM_FMTS
            .captures(&xml)
            .and_then(|c| c.get(1))
            .map(|inner| {
                NUM_FMT
                    .find_iter(inner.as_str())
                    .filter_map(|m| {
                        let attrs = attributes(m.as_str());
                        let id = attrs.get("numFmtId")?.parse().ok()?;
                        let code = decode_entities(attrs.get("formatCode")?);
                        Some((id, code))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let xfs: Vec<String> = CELL_XFS
            .captures(&xml)
            .and_then(|c| c.get(1))
            .map(|inner| {
                XF.find_iter(inner.as_str())
                    .map(|m| m.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            xml,
            num_fmts,
            xfs,
            dirty: false,
            cache: HashMap::new(),
        }
    }

    fn format_id(&mut self, code: &str) -> u32 {
        if let Some(id) = builtin_num_fmt(code) {
            return id;
        }
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c == code) {
            return *id;
        }
        let id = self
            .num_fmts
            .iter()
            .map(|(id, _)| id + 1)
            .max()
            .unwrap_or(FIRST_CUSTOM_NUM_FMT)
            .max(FIRST_CUSTOM_NUM_FMT);
        self.num_fmts.push((id, code.to_string()));
        self.dirty = true;
        id
    }

    /// Index of a cell format equal to `base` but with number format `code`
    fn style_with_format(&mut self, base: u32, code: &str) -> u32 {
        let fmt_id = self.format_id(code);
        if let Some(index) = self.cache.get(&(base, fmt_id)) {
            return *index;
        }
        let base_xf = self
            .xfs
            .get(base as usize)
            .or_else(|| self.xfs.first())
            .map(String::as_str)
            .unwrap_or(DEFAULT_XF);
        let xf = with_number_format(base_xf, fmt_id);
        let index = self.xfs.len() as u32;
        self.xfs.push(xf);
        self.cache.insert((base, fmt_id), index);
        self.dirty = true;
        index
    }

    fn to_xml(&self) -> Result<String, GenerationError> {
        let xfs = format!(
            r#"<cellXfs count="{}">{}</cellXfs>"#,
            self.xfs.len(),
            self.xfs.concat()
        );
        let xml = if CELL_XFS.is_match(&self.xml) {
            CELL_XFS.replace(&self.xml, NoExpand(&xfs)).into_owned()
        } else {
            return Err(structure("styles part has no cellXfs element"));
        };

        if self.num_fmts.is_empty() {
            return Ok(xml);
        }
        let fmts = format!(
            r#"<numFmts count="{}">{}</numFmts>"#,
            self.num_fmts.len(),
            self.num_fmts
                .iter()
                .map(|(id, code)| format!(r#"<numFmt numFmtId="{}" formatCode="{}"/>"#, id, escape_attr(code)))
                .collect::<String>()
        );
        if NUM_FMTS.is_match(&xml) {
            return Ok(NUM_FMTS.replace(&xml, NoExpand(&fmts)).into_owned());
        }
        let open = STYLE_SHEET_OPEN
            .find(&xml)
            .ok_or_else(|| structure("styles part has no styleSheet element"))?;
        Ok(format!("{}{}{}", &xml[..open.end()], fmts, &xml[open.end()..]))
    }
}

fn with_number_format(xf: &str, fmt_id: u32) -> String {
    let end = xf.find('>').unwrap_or(xf.len());
    let self_closing = xf[..end].ends_with('/');
    let attr_end = if self_closing { end - 1 } else { end };
    let attrs = xf.get(3..attr_end).unwrap_or("");
    let attrs = set_attr(attrs, "numFmtId", Some(&fmt_id.to_string()));
    let attrs = set_attr(&attrs, "applyNumberFormat", Some("1"));
    if self_closing {
        format!("<xf{}/>", attrs)
    } else {
        format!("<xf{}{}", attrs, &xf[end..])
    }
}

/// Sheet names and part paths in workbook order
fn resolve_sheets(
    package: &mut Package<'_>,
    workbook_part: &str,
    workbook_xml: &str,
) -> Result<Vec<(String, String)>, GenerationError> {
    let rels_path = rels_path_for(workbook_part);
    let rels = package
        .read_string(&rels_path)?
        .ok_or_else(|| structure(format!("missing part {}", rels_path)))?;
    let targets: HashMap<String, String> = parse_relationships(&rels)
        .into_iter()
        .map(|rel| (rel.id, rel.target))
        .collect();
    let base = part_dir(workbook_part);

    SHEET_ENTRY
        .find_iter(workbook_xml)
        .map(|m| {
            let attrs = attributes(m.as_str());
            let name = decode_entities(attrs.get("name").map(String::as_str).unwrap_or(""));
            let rel_id = attrs
                .iter()
                .find(|(k, _)| k.ends_with(":id"))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| structure(format!("sheet '{}' has no relationship id", name)))?;
            let target = targets
                .get(&rel_id)
                .ok_or_else(|| structure(format!("sheet '{}' points to unknown {}", name, rel_id)))?;
            Ok((name, resolve_target(base, target)))
        })
        .collect()
}

fn sheet_path<'s>(sheets: &'s [(String, String)], name: Option<&str>) -> Result<&'s str, GenerationError> {
    let found = match name {
        None => sheets.first(),
        Some(name) => sheets
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| sheets.iter().find(|(n, _)| n.eq_ignore_ascii_case(name))),
    };
    found
        .map(|(_, path)| path.as_str())
        .ok_or_else(|| structure(format!("sheet '{}' not found", name.unwrap_or("<first>"))))
}

/// Applies sheet operations in order and returns the new workbook bytes
pub fn merge_workbook(template: &[u8], ops: &[SheetOp]) -> Result<MergeOutput, GenerationError> {
    let mut package = Package::open(template)?;
    let workbook_part = package.main_part(DEFAULT_WORKBOOK_PART)?;
    let workbook_xml = package.require_string(&workbook_part)?;
    let sheets = resolve_sheets(&mut package, &workbook_part, &workbook_xml)?;
    if sheets.is_empty() {
        return Err(structure("workbook has no sheets"));
    }

    let mut styles = package.read_string(STYLES_PART)?.map(StyleBook::parse);
    let mut docs: BTreeMap<String, SheetDoc> = BTreeMap::new();

    for op in ops {
        let path = sheet_path(&sheets, op.sheet())?.to_string();
        let doc = match docs.entry(path) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let xml = package.require_string(entry.key())?;
                entry.insert(SheetDoc::parse(&xml)?)
            }
        };

        match op {
            SheetOp::InsertRows {
                at,
                count,
                copy_style_from_row,
                ..
            } => doc.insert_rows(*at, *count, *copy_style_from_row)?,
            SheetOp::SetCells { cells, .. } => {
                for write in cells {
                    let (col, row) =
                        parse_cell_ref(&write.address).ok_or_else(|| invalid_address(&write.address))?;
                    doc.write(col, row, &write.value, write.number_format.as_deref(), &mut styles)?;
                }
            }
            SheetOp::WriteRange {
                start,
                values,
                number_format,
                ..
            } => {
                let (col, row) = parse_cell_ref(start).ok_or_else(|| invalid_address(start))?;
                for (i, line) in values.iter().enumerate() {
                    for (j, value) in line.iter().enumerate() {
                        let (c, r) = (col + j as u32, row + i as u32);
                        if c > MAX_COL || r > MAX_ROW {
                            return Err(invalid_address(&format!("{}{}", column_name(c), r)));
                        }
                        doc.write(c, r, value, number_format.as_deref(), &mut styles)?;
                    }
                }
            }
        }
    }

    let mut edits = BTreeMap::new();
    for (path, doc) in &docs {
        debug!("Rewriting worksheet {}", path);
        edits.insert(path.clone(), doc.to_xml().into_bytes());
    }
    if let Some(book) = styles.as_ref().filter(|b| b.dirty) {
        edits.insert(STYLES_PART.to_string(), book.to_xml()?.into_bytes());
    }

    Ok(MergeOutput {
        bytes: rewrite(template, &edits)?,
        degradation: None,
    })
}

/// Sheet names and their cell values, for skeleton rendering
pub(crate) fn read_sheets(template: &[u8]) -> Result<Vec<(String, String)>, GenerationError> {
    let mut package = Package::open(template)?;
    let workbook_part = package.main_part(DEFAULT_WORKBOOK_PART)?;
    let workbook_xml = package.require_string(&workbook_part)?;
    let sheets = resolve_sheets(&mut package, &workbook_part, &workbook_xml)?;
    sheets
        .into_iter()
        .map(|(name, path)| Ok((name, package.require_string(&path)?)))
        .collect()
}
