//! Local text conversions offered to artifacts
//!
//! `markdown_to_html` is a straight pulldown-cmark render. `html_to_nodes`
//! understands the subset of HTML that markdown produces (headings,
//! paragraphs, lists, tables, inline emphasis, line breaks) and maps it onto
//! builder block nodes; anything else contributes its text only.

use docforge_core::GenerationError;
use docforge_core::domain::result::{BlockNode, Run};
use pulldown_cmark::{Options, Parser, html};
use regex::Regex;
use std::sync::LazyLock;

use crate::render::render_nodes;
use crate::standalone::standalone_docx;
use crate::xml::decode_entities;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*?(/?)>|([^<]+)|<").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const CODE_FONT: &str = "Consolas";

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Builds a standalone document package from HTML (or plain text)
pub fn html_to_docx(html: &str) -> Result<Vec<u8>, GenerationError> {
    standalone_docx(&render_nodes(&html_to_nodes(html)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Paragraph,
    Heading(u8),
    Bullet,
    Numbered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ListKind {
    Bullet,
    Numbered,
}

#[derive(Default)]
struct Inline {
    bold: usize,
    italic: usize,
    underline: usize,
    strike: usize,
    code: usize,
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

struct Converter {
    nodes: Vec<BlockNode>,
    kind: BlockKind,
    runs: Vec<Run>,
    inline: Inline,
    lists: Vec<ListKind>,
    table: Option<TableBuilder>,
    preformatted: usize,
}

impl Converter {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            kind: BlockKind::Paragraph,
            runs: Vec::new(),
            inline: Inline::default(),
            lists: Vec::new(),
            table: None,
            preformatted: 0,
        }
    }

    fn flush(&mut self) {
        let mut runs = std::mem::take(&mut self.runs);
        if let Some(first) = runs.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        if let Some(last) = runs.last_mut() {
            last.text = last.text.trim_end().to_string();
        }
        runs.retain(|r| !r.text.is_empty());
        if !runs.is_empty() {
            self.nodes.push(match self.kind {
                BlockKind::Paragraph => BlockNode::Paragraph { runs },
                BlockKind::Heading(level) => BlockNode::Heading { level, runs },
                BlockKind::Bullet => BlockNode::BulletItem { runs },
                BlockKind::Numbered => BlockNode::NumberedItem { runs },
            });
        }
        self.kind = BlockKind::Paragraph;
    }

    fn start_block(&mut self, kind: BlockKind) {
        self.flush();
        self.kind = kind;
    }

    fn text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        let text = if self.preformatted > 0 {
            decoded
        } else {
            WHITESPACE.replace_all(&decoded, " ").into_owned()
        };

        if let Some(table) = self.table.as_mut() {
            if let Some(cell) = table.cell.as_mut() {
                cell.push_str(&text);
            }
            return;
        }

        if self.runs.is_empty() && text.trim().is_empty() {
            return;
        }
        self.push_run(text);
    }

    fn push_run(&mut self, text: String) {
        let run = Run {
            text,
            bold: self.inline.bold > 0,
            italic: self.inline.italic > 0,
            underline: self.inline.underline > 0,
            strike: self.inline.strike > 0,
            font: (self.inline.code > 0).then(|| CODE_FONT.to_string()),
            ..Run::default()
        };
        match self.runs.last_mut() {
            Some(last) if same_format(last, &run) => last.text.push_str(&run.text),
            _ => self.runs.push(run),
        }
    }

    fn open(&mut self, tag: &str) {
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse().unwrap_or(1);
                self.start_block(BlockKind::Heading(level));
            }
            "p" | "div" | "blockquote" | "section" | "article" => self.start_block(BlockKind::Paragraph),
            "pre" => {
                self.start_block(BlockKind::Paragraph);
                self.preformatted += 1;
                self.inline.code += 1;
            }
            "ul" => {
                self.flush();
                self.lists.push(ListKind::Bullet);
            }
            "ol" => {
                self.flush();
                self.lists.push(ListKind::Numbered);
            }
            "li" => {
                let kind = match self.lists.last() {
                    Some(ListKind::Numbered) => BlockKind::Numbered,
                    _ => BlockKind::Bullet,
                };
                self.start_block(kind);
            }
            "br" => {
                if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                    cell.push(' ');
                } else {
                    self.push_run("\n".to_string());
                }
            }
            "hr" => self.flush(),
            "strong" | "b" => self.inline.bold += 1,
            "em" | "i" => self.inline.italic += 1,
            "u" | "ins" => self.inline.underline += 1,
            "s" | "strike" | "del" => self.inline.strike += 1,
            "code" | "kbd" | "samp" => self.inline.code += 1,
            "table" => {
                self.flush();
                self.table = Some(TableBuilder::default());
            }
            "tr" => {
                if let Some(table) = self.table.as_mut() {
                    table.row = Some(Vec::new());
                }
            }
            "td" | "th" => {
                if let Some(table) = self.table.as_mut() {
                    table.cell = Some(String::new());
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, tag: &str) {
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "div" | "blockquote" | "section"
            | "article" | "li" => self.flush(),
            "pre" => {
                self.flush();
                self.preformatted = self.preformatted.saturating_sub(1);
                self.inline.code = self.inline.code.saturating_sub(1);
            }
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "strong" | "b" => self.inline.bold = self.inline.bold.saturating_sub(1),
            "em" | "i" => self.inline.italic = self.inline.italic.saturating_sub(1),
            "u" | "ins" => self.inline.underline = self.inline.underline.saturating_sub(1),
            "s" | "strike" | "del" => self.inline.strike = self.inline.strike.saturating_sub(1),
            "code" | "kbd" | "samp" => self.inline.code = self.inline.code.saturating_sub(1),
            "td" | "th" => {
                if let Some(table) = self.table.as_mut() {
                    if let Some(cell) = table.cell.take() {
                        table.row.get_or_insert_with(Vec::new).push(cell.trim().to_string());
                    }
                }
            }
            "tr" => {
                if let Some(table) = self.table.as_mut() {
                    if let Some(row) = table.row.take() {
                        table.rows.push(row);
                    }
                }
            }
            "table" => {
                if let Some(mut table) = self.table.take() {
                    if let Some(row) = table.row.take() {
                        table.rows.push(row);
                    }
                    if !table.rows.is_empty() {
                        self.nodes.push(BlockNode::Table {
                            rows: table.rows,
                            widths: None,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<BlockNode> {
        self.close("table");
        self.flush();
        self.nodes
    }
}

fn same_format(a: &Run, b: &Run) -> bool {
    a.bold == b.bold
        && a.italic == b.italic
        && a.underline == b.underline
        && a.strike == b.strike
        && a.font == b.font
}

/// Maps HTML onto block nodes; plain text becomes paragraphs split on blank
/// lines
pub fn html_to_nodes(html: &str) -> Vec<BlockNode> {
    if !html.contains('<') {
        return html
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| BlockNode::Paragraph {
                runs: vec![Run::plain(decode_entities(p))],
            })
            .collect();
    }

    let mut converter = Converter::new();
    for token in TOKEN.captures_iter(html) {
        if let Some(text) = token.get(4) {
            converter.text(text.as_str());
            continue;
        }
        let Some(name) = token.get(2) else {
            // comment or stray '<'
            if token[0].starts_with("<!--") {
                continue;
            }
            converter.text("<");
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = !token[1].is_empty();
        let self_closing = !token[3].is_empty();
        if closing {
            converter.close(&name);
        } else {
            converter.open(&name);
            if self_closing && name != "br" && name != "hr" {
                converter.close(&name);
            }
        }
    }
    converter.finish()
}
