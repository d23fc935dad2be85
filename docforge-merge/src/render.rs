//! Rendering of builder block nodes to WordprocessingML body markup

use docforge_core::domain::result::{BlockNode, Run};

use crate::xml::{escape_attr, escape_text};

/// Usable width of an A4 page with default margins, in twentieths of a point
pub const DEFAULT_TABLE_WIDTH: u32 = 9000;

/// Renders nodes as a body-level fragment (`w:` prefix)
pub fn render_nodes(nodes: &[BlockNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            BlockNode::Heading { level, runs } => {
                paragraph(&mut out, Some(&format!("Heading{}", (*level).clamp(1, 6))), runs)
            }
            BlockNode::Paragraph { runs } => paragraph(&mut out, None, runs),
            BlockNode::BulletItem { runs } => paragraph(&mut out, Some("ListBullet"), runs),
            BlockNode::NumberedItem { runs } => paragraph(&mut out, Some("ListNumber"), runs),
            BlockNode::Table { rows, widths } => table(&mut out, rows, widths.as_deref()),
            BlockNode::PageBreak => out.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
        }
    }
    out
}

fn paragraph(out: &mut String, style: Option<&str>, runs: &[Run]) {
    out.push_str("<w:p>");
    if let Some(style) = style {
        out.push_str(&format!(r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, escape_attr(style)));
    }
    for r in runs {
        run(out, r);
    }
    out.push_str("</w:p>");
}

/// One `w:r`; newlines in the text become line breaks
pub fn run(out: &mut String, run: &Run) {
    out.push_str("<w:r>");
    let props = run_properties(run);
    if !props.is_empty() {
        out.push_str("<w:rPr>");
        out.push_str(&props);
        out.push_str("</w:rPr>");
    }
    for (i, line) in run.text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("<w:br/>");
        }
        if !line.is_empty() {
            out.push_str(r#"<w:t xml:space="preserve">"#);
            out.push_str(&escape_text(line));
            out.push_str("</w:t>");
        }
    }
    out.push_str("</w:r>");
}

// Element order follows the CT_RPr sequence.
fn run_properties(run: &Run) -> String {
    let mut props = String::new();
    if let Some(font) = &run.font {
        let font = escape_attr(font);
        props.push_str(&format!(
            r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}" w:cs="{0}"/>"#,
            font
        ));
    }
    if run.bold {
        props.push_str("<w:b/>");
    }
    if run.italic {
        props.push_str("<w:i/>");
    }
    if run.strike {
        props.push_str("<w:strike/>");
    }
    if let Some(color) = &run.color {
        props.push_str(&format!(
            r#"<w:color w:val="{}"/>"#,
            escape_attr(color.trim_start_matches('#'))
        ));
    }
    if let Some(size) = run.size {
        // half-points
        let half_points = (size * 2.0).round().max(1.0) as u32;
        props.push_str(&format!(r#"<w:sz w:val="{}"/>"#, half_points));
    }
    if run.underline {
        props.push_str(r#"<w:u w:val="single"/>"#);
    }
    props
}

fn table(out: &mut String, rows: &[Vec<String>], widths: Option<&[u32]>) {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return;
    }
    let widths: Vec<u32> = match widths {
        Some(w) if w.len() == columns => w.to_vec(),
        _ => vec![DEFAULT_TABLE_WIDTH / columns as u32; columns],
    };

    out.push_str(r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tblGrid>"#);
    for width in &widths {
        out.push_str(&format!(r#"<w:gridCol w:w="{}"/>"#, width));
    }
    out.push_str("</w:tblGrid>");

    for (index, row) in rows.iter().enumerate() {
        let header = index == 0 && rows.len() > 1;
        out.push_str("<w:tr>");
        if header {
            out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
        }
        for (col, width) in widths.iter().enumerate() {
            let text = row.get(col).map(String::as_str).unwrap_or("");
            out.push_str(&format!(
                r#"<w:tc><w:tcPr><w:tcW w:w="{}" w:type="dxa"/></w:tcPr><w:p>"#,
                width
            ));
            if !text.is_empty() {
                run(
                    out,
                    &Run {
                        text: text.to_string(),
                        bold: header,
                        ..Run::default()
                    },
                );
            }
            out.push_str("</w:p></w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
}
