//! Document merge path
//!
//! The body-content window of the main part runs from just after the body
//! start tag to just before the trailing section properties (or to the body
//! end tag when there are none). The window is replaced wholesale; every byte
//! outside it is kept as is.

use docforge_core::GenerationError;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::html::html_to_docx;
use crate::package::{
    CONTENT_TYPES, Package, Relationship, parse_relationships, part_dir, rels_path_for,
    resolve_target, rewrite,
};
use crate::xml::{escape_attr, insert_before_close};
use crate::{MergeDegradation, MergeOutput};

pub const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";

const IMAGE_REL_SUFFIX: &str = "/image";

const EMPTY_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

static BODY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:(\w+):)?body\b[^>]*?(/?)>").unwrap());

static BLOCK_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?(?:p|tbl)[\s>/]").unwrap());

static REL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\br:(embed|link|id)="([^"]*)""#).unwrap());

static TRAILING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

/// Byte range of the replaceable body content
#[derive(Debug, Clone, PartialEq)]
pub struct BodyWindow {
    pub start: usize,
    pub end: usize,
    /// Namespace prefix of the body element including the colon, or empty
    pub prefix: String,
}

pub fn locate_body_window(xml: &str) -> Result<BodyWindow, GenerationError> {
    let open = BODY_OPEN
        .captures(xml)
        .ok_or_else(|| GenerationError::template_structure("main part has no body element"))?;
    if !open[2].is_empty() {
        return Err(GenerationError::template_structure("body element is empty"));
    }
    let prefix = open
        .get(1)
        .map(|p| format!("{}:", p.as_str()))
        .unwrap_or_default();
    let start = open.get(0).map(|m| m.end()).unwrap_or(0);

    let close_tag = format!("</{}body>", prefix);
    let close = xml[start..]
        .rfind(&close_tag)
        .map(|pos| start + pos)
        .ok_or_else(|| GenerationError::template_structure("body element is not closed"))?;

    let end = trailing_section_start(&xml[start..close], &prefix)
        .map(|pos| start + pos)
        .unwrap_or(close);

    Ok(BodyWindow { start, end, prefix })
}

/// Offset of a section-properties element that is the last thing in `body`
fn trailing_section_start(body: &str, prefix: &str) -> Option<usize> {
    let open = Regex::new(&format!(r"<{}sectPr[\s>/]", regex::escape(prefix))).ok()?;
    let pos = open.find_iter(body).last()?.start();

    let tag_end = pos + body[pos..].find('>')? + 1;
    let element_end = if body[..tag_end].ends_with("/>") {
        tag_end
    } else {
        let close_tag = format!("</{}sectPr>", prefix);
        tag_end + body[tag_end..].find(&close_tag)? + close_tag.len()
    };

    body[element_end..].trim().is_empty().then_some(pos)
}

/// Whether a fragment contains at least one paragraph or table
pub fn has_block_elements(fragment: &str) -> bool {
    BLOCK_ELEMENT.is_match(fragment)
}

/// Body window content of a standalone package
pub fn extract_body_fragment(package_bytes: &[u8]) -> Result<String, GenerationError> {
    let mut package = Package::open(package_bytes)?;
    let main = package.main_part(DEFAULT_DOCUMENT_PART)?;
    let xml = package.require_string(&main)?;
    let window = locate_body_window(&xml)?;
    Ok(xml[window.start..window.end].to_string())
}

/// Splices `markup` (or the body of `source_package` when `markup` is blank)
/// into the template
pub fn merge_document(
    template: &[u8],
    markup: &str,
    source_package: Option<&[u8]>,
) -> Result<MergeOutput, GenerationError> {
    let fragment = match source_package {
        Some(source) if markup.trim().is_empty() => extract_body_fragment(source)?,
        _ => markup.to_string(),
    };

    if !has_block_elements(&fragment) {
        let reason = "fragment has no paragraph or table element; produced a standalone document";
        warn!("Merge degraded: {}", reason);
        return Ok(MergeOutput {
            bytes: html_to_docx(&fragment)?,
            degradation: Some(MergeDegradation {
                reason: reason.to_string(),
            }),
        });
    }

    let mut package = Package::open(template)?;
    let main = package.main_part(DEFAULT_DOCUMENT_PART)?;
    let xml = package.require_string(&main)?;
    let window = locate_body_window(&xml)?;

    let mut edits = BTreeMap::new();
    let fragment = match source_package {
        Some(source) => merge_media(&mut package, &main, source, &fragment, &mut edits)?,
        None => fragment,
    };

    let mut merged = String::with_capacity(xml.len() + fragment.len());
    merged.push_str(&xml[..window.start]);
    merged.push_str(&fragment);
    merged.push_str(&xml[window.end..]);
    debug!(
        "Replaced body window {}..{} of {} with {} bytes",
        window.start,
        window.end,
        main,
        fragment.len()
    );
    edits.insert(main, merged.into_bytes());

    Ok(MergeOutput {
        bytes: rewrite(template, &edits)?,
        degradation: None,
    })
}

/// Copies the images `fragment` refers to from `source` into the template and
/// returns the fragment with its relationship ids rewritten
fn merge_media(
    template: &mut Package<'_>,
    main: &str,
    source_bytes: &[u8],
    fragment: &str,
    edits: &mut BTreeMap<String, Vec<u8>>,
) -> Result<String, GenerationError> {
    let mut source = Package::open(source_bytes)?;
    let source_main = source.main_part(DEFAULT_DOCUMENT_PART)?;
    let images: HashMap<String, Relationship> = source
        .read_string(&rels_path_for(&source_main))?
        .map(|xml| parse_relationships(&xml))
        .unwrap_or_default()
        .into_iter()
        .filter(|rel| rel.rel_type.ends_with(IMAGE_REL_SUFFIX))
        .map(|rel| (rel.id.clone(), rel))
        .collect();

    let mut referenced: Vec<String> = Vec::new();
    for caps in REL_REFERENCE.captures_iter(fragment) {
        let id = caps[2].to_string();
        if images.contains_key(&id) && !referenced.contains(&id) {
            referenced.push(id);
        }
    }
    if referenced.is_empty() {
        return Ok(fragment.to_string());
    }

    let rels_path = rels_path_for(main);
    let rels_xml = template
        .read_string(&rels_path)?
        .unwrap_or_else(|| EMPTY_RELS.to_string());
    let mut next_id = max_numeric_id(&parse_relationships(&rels_xml)) + 1;
    let mut content_types = template.require_string(CONTENT_TYPES)?;
    let mut taken: HashSet<String> = template.names().into_iter().collect();

    let main_dir = part_dir(main);
    let source_dir = part_dir(&source_main).to_string();
    let mut mapping: HashMap<String, String> = HashMap::new();
    let mut new_rels = String::new();

    for old_id in referenced {
        let Some(rel) = images.get(&old_id) else {
            continue;
        };
        let new_id = format!("rId{}", next_id);
        next_id += 1;

        let target = if rel.external {
            rel.target.clone()
        } else {
            let source_path = resolve_target(&source_dir, &rel.target);
            let bytes = source.read(&source_path)?.ok_or_else(|| {
                GenerationError::template_structure(format!(
                    "source package is missing {}",
                    source_path
                ))
            })?;
            let path = unique_media_path(main_dir, &source_path, &taken);
            taken.insert(path.clone());
            content_types = ensure_default_content_type(&content_types, &path)?;
            edits.insert(path.clone(), bytes);
            relative_target(main_dir, &path)
        };

        new_rels.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
            new_id,
            escape_attr(&rel.rel_type),
            escape_attr(&target),
            if rel.external {
                r#" TargetMode="External""#
            } else {
                ""
            }
        ));
        debug!("Mapped source image {} to {} ({})", old_id, new_id, target);
        mapping.insert(old_id, new_id);
    }

    let rels_xml = insert_before_close(&rels_xml, "</Relationships>", &new_rels)
        .ok_or_else(|| GenerationError::template_structure(format!("{} is malformed", rels_path)))?;
    edits.insert(rels_path, rels_xml.into_bytes());
    edits.insert(CONTENT_TYPES.to_string(), content_types.into_bytes());

    let rewritten = REL_REFERENCE.replace_all(fragment, |caps: &Captures| {
        match mapping.get(&caps[2]) {
            Some(new_id) => format!(r#"r:{}="{}""#, &caps[1], new_id),
            None => caps[0].to_string(),
        }
    });
    Ok(rewritten.into_owned())
}

/// Highest numeric suffix among relationship ids, 0 when there is none
pub fn max_numeric_id(rels: &[Relationship]) -> u64 {
    rels.iter()
        .filter_map(|rel| TRAILING_DIGITS.captures(&rel.id))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn unique_media_path(main_dir: &str, source_path: &str, taken: &HashSet<String>) -> String {
    let media_dir = if main_dir.is_empty() {
        "media".to_string()
    } else {
        format!("{}/media", main_dir)
    };
    let file = source_path.rsplit('/').next().unwrap_or(source_path);
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (file, String::new()),
    };

    let candidate = format!("{}/{}", media_dir, file);
    if !taken.contains(&candidate) {
        return candidate;
    }
    (1..)
        .map(|n| format!("{}/{}_{}{}", media_dir, stem, n, ext))
        .find(|c| !taken.contains(c))
        .unwrap_or(candidate)
}

fn relative_target(main_dir: &str, path: &str) -> String {
    match path.strip_prefix(&format!("{}/", main_dir)) {
        Some(relative) if !main_dir.is_empty() => relative.to_string(),
        _ => format!("/{}", path),
    }
}

fn ensure_default_content_type(content_types: &str, path: &str) -> Result<String, GenerationError> {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return Ok(content_types.to_string());
    };
    let ext = ext.to_ascii_lowercase();
    let existing = Regex::new(&format!(
        r#"(?i)<Default\b[^>]*\bExtension="{}""#,
        regex::escape(&ext)
    ))
    .map_err(|e| GenerationError::template_structure(e.to_string()))?;
    if existing.is_match(content_types) {
        return Ok(content_types.to_string());
    }

    let element = format!(
        r#"<Default Extension="{}" ContentType="{}"/>"#,
        escape_attr(&ext),
        media_content_type(&ext)
    );
    insert_before_close(content_types, "</Types>", &element)
        .ok_or_else(|| GenerationError::template_structure("content types part is malformed"))
}

fn media_content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        _ => "application/octet-stream",
    }
}
