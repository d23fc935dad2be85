//! Zip container access
//!
//! Reading goes through [`Package`]. Writing always starts from the original
//! archive: entries that are not edited are copied raw (compressed bytes and
//! headers untouched), edited or added parts are deflated.

use docforge_core::GenerationError;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const PACKAGE_RELS: &str = "_rels/.rels";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";

const OFFICE_DOCUMENT_TYPE: &str = "/officeDocument";

/// Upper bound on the buffer reserved up front for one entry
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

static RELATIONSHIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Relationship\b[^>]*>").unwrap());

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w:]+)\s*=\s*"([^"]*)""#).unwrap());

/// Read-only view over a zip archive held in memory
pub struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, GenerationError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| GenerationError::template_structure(format!("not a zip archive: {}", e)))?;
        Ok(Self { archive })
    }

    /// Entry names in archive order
    pub fn names(&mut self) -> Vec<String> {
        (0..self.archive.len())
            .filter_map(|i| self.archive.by_index_raw(i).ok().map(|f| f.name().to_string()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Decompressed bytes of an entry, `None` if absent
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, GenerationError> {
        let Some(index) = self.archive.index_for_name(name) else {
            return Ok(None);
        };
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| GenerationError::template_structure(format!("{}: {}", name, e)))?;
        // the declared size comes from the archive and is not trusted
        let declared = usize::try_from(file.size()).unwrap_or(MAX_PREALLOCATION);
        let mut buf = Vec::with_capacity(declared.min(MAX_PREALLOCATION));
        file.read_to_end(&mut buf)
            .map_err(|e| GenerationError::template_structure(format!("{}: {}", name, e)))?;
        Ok(Some(buf))
    }

    /// Entry decoded as UTF-8 text
    pub fn read_string(&mut self, name: &str) -> Result<Option<String>, GenerationError> {
        match self.read(name)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
                GenerationError::template_structure(format!("{} is not valid UTF-8", name))
            }),
            None => Ok(None),
        }
    }

    /// Like [`Package::read_string`] but a missing entry is a structure error
    pub fn require_string(&mut self, name: &str) -> Result<String, GenerationError> {
        self.read_string(name)?
            .ok_or_else(|| GenerationError::template_structure(format!("missing part {}", name)))
    }

    /// Main part of the package, resolved through the package relationships
    pub fn main_part(&mut self, default: &str) -> Result<String, GenerationError> {
        let Some(rels) = self.read_string(PACKAGE_RELS)? else {
            return Ok(default.to_string());
        };
        Ok(parse_relationships(&rels)
            .into_iter()
            .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_TYPE))
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| default.to_string()))
    }
}

/// One `<Relationship>` element
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

pub fn parse_relationships(xml: &str) -> Vec<Relationship> {
    RELATIONSHIP
        .find_iter(xml)
        .map(|m| {
            let attrs = attributes(m.as_str());
            let get = |key: &str| attrs.get(key).cloned().unwrap_or_default();
            Relationship {
                id: get("Id"),
                rel_type: get("Type"),
                target: get("Target"),
                external: get("TargetMode").eq_ignore_ascii_case("External"),
            }
        })
        .collect()
}

/// Attributes of the first start tag in `tag`
pub fn attributes(tag: &str) -> BTreeMap<String, String> {
    let end = tag.find('>').unwrap_or(tag.len());
    ATTRIBUTE
        .captures_iter(&tag[..end])
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// Relationship part that belongs to `part`, e.g. `word/_rels/document.xml.rels`
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Directory of a part, without trailing slash
pub fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolves a relationship target against the directory of its source part
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Writes a new archive from `original` with `edits` applied
///
/// Edited entries keep their position; entries that do not exist in the
/// original are appended in name order.
pub fn rewrite(original: &[u8], edits: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, GenerationError> {
    let mut archive = ZipArchive::new(Cursor::new(original))
        .map_err(|e| GenerationError::template_structure(format!("not a zip archive: {}", e)))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = std::collections::BTreeSet::new();

    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).map_err(storage)?;
        let name = file.name().to_string();
        match edits.get(&name) {
            Some(bytes) => {
                drop(file);
                writer.start_file(name.as_str(), options).map_err(storage)?;
                writer.write_all(bytes)?;
            }
            None => writer.raw_copy_file(file).map_err(storage)?,
        }
        written.insert(name);
    }

    for (name, bytes) in edits {
        if written.contains(name) {
            continue;
        }
        writer.start_file(name.as_str(), options).map_err(storage)?;
        writer.write_all(bytes)?;
    }

    let cursor = writer.finish().map_err(storage)?;
    Ok(cursor.into_inner())
}

/// Builds a fresh archive from `(name, bytes)` parts
pub fn build(parts: &[(&str, &[u8])]) -> Result<Vec<u8>, GenerationError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in parts {
        writer.start_file(*name, options).map_err(storage)?;
        writer.write_all(bytes)?;
    }
    let cursor = writer.finish().map_err(storage)?;
    Ok(cursor.into_inner())
}

fn storage(err: zip::result::ZipError) -> GenerationError {
    GenerationError::storage(format!("zip: {}", err))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Test fixture: archive from textual parts
    pub(crate) fn zip_of(parts: &[(&str, &str)]) -> Vec<u8> {
        let parts: Vec<(&str, &[u8])> = parts.iter().map(|(n, c)| (*n, c.as_bytes())).collect();
        build(&parts).unwrap()
    }

    #[test]
    fn test_read_ignores_inflated_declared_size() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("word/document.xml", stored).unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        // claim an uncompressed size of almost 4 GiB in both headers
        let forged = 0xFFFF_FFF0u32.to_le_bytes();
        bytes[22..26].copy_from_slice(&forged);
        let central = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&forged);

        let mut package = Package::open(&bytes).unwrap();
        if let Ok(Some(content)) = package.read("word/document.xml") {
            assert_eq!(content, b"<w:document/>");
        }
    }

    /// Raw (still compressed) bytes of every entry, for byte-identity checks
    pub(crate) fn raw_entries(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index_raw(i).unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).unwrap();
            out.insert(file.name().to_string(), buf);
        }
        out
    }

    #[test]
    fn test_main_part_from_package_rels() {
        let bytes = zip_of(&[(
            PACKAGE_RELS,
            r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="/word/main.xml"/></Relationships>"#,
        )]);
        let mut package = Package::open(&bytes).unwrap();
        assert_eq!(package.main_part("word/document.xml").unwrap(), "word/main.xml");
    }

    #[test]
    fn test_main_part_default_without_rels() {
        let bytes = zip_of(&[("word/document.xml", "<w:document/>")]);
        let mut package = Package::open(&bytes).unwrap();
        assert_eq!(
            package.main_part("word/document.xml").unwrap(),
            "word/document.xml"
        );
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("xl", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("word", "/word/media/a.png"), "word/media/a.png");
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
    }

    #[test]
    fn test_rewrite_copies_untouched_entries_raw() {
        let original = zip_of(&[("a.xml", "<a/>"), ("b.xml", "<b/>")]);
        let mut edits = BTreeMap::new();
        edits.insert("b.xml".to_string(), b"<b>changed</b>".to_vec());
        edits.insert("c.xml".to_string(), b"<c/>".to_vec());

        let rewritten = rewrite(&original, &edits).unwrap();

        let before = raw_entries(&original);
        let after = raw_entries(&rewritten);
        assert_eq!(before["a.xml"], after["a.xml"]);

        let mut package = Package::open(&rewritten).unwrap();
        assert_eq!(package.names(), vec!["a.xml", "b.xml", "c.xml"]);
        assert_eq!(package.read_string("b.xml").unwrap().unwrap(), "<b>changed</b>");
    }

    #[test]
    fn test_open_rejects_non_zip() {
        assert!(matches!(
            Package::open(b"not a zip"),
            Err(GenerationError::TemplateStructure(_))
        ));
    }
}
