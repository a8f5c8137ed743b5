//! DOCX package access
//!
//! A DOCX file is an OPC package: a ZIP archive whose entries ("parts") are
//! tied together by relationship parts (`_rels/*.rels`) and declared in
//! `[Content_Types].xml`. The whole package is held in memory; entries keep
//! their archive order so a rewritten package lists parts the way the template
//! did.
//!
//! Writing is deterministic: every entry gets the same fixed timestamp and
//! compression, so identical parts produce identical archives.

use crate::error::{ManudocError, Result};
use crate::xml::{XmlDocument, XmlElement, XmlNode};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main document part
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Content types part
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Relationship type for images
pub const IMAGE_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
}

/// In-memory DOCX package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
}

impl DocxPackage {
    /// Create an empty package
    #[inline]
    #[must_use = "creates an empty package"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a package from a file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened, `Zip` if it is not a ZIP
    /// archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ManudocError::io(path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a package from any seekable reader
    ///
    /// # Errors
    ///
    /// Returns `Zip` if the content is not a ZIP archive or an entry cannot be
    /// read.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
            file.read_to_end(&mut data)?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
            });
        }
        Ok(Self { entries })
    }

    /// Read a package from bytes
    ///
    /// # Errors
    ///
    /// Same as [`DocxPackage::from_reader`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Part names in archive order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Whether a part exists
    #[inline]
    #[must_use = "checks whether the part exists"]
    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Raw bytes of a part
    #[must_use = "returns the part content"]
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Part content as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` if the part is missing, `Utf8` if it is not
    /// valid UTF-8.
    pub fn part_str(&self, name: &str) -> Result<String> {
        let bytes = self
            .part(name)
            .ok_or_else(|| ManudocError::InvalidTemplate(format!("missing part {name}")))?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Parse a part as XML
    ///
    /// # Errors
    ///
    /// Returns an error if the part is missing or not well-formed XML.
    pub fn xml_part(&self, name: &str) -> Result<XmlDocument> {
        XmlDocument::parse(&self.part_str(name)?)
    }

    /// Replace a part, or append it when it does not exist yet
    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.data = data;
        } else {
            self.entries.push(PackageEntry { name, data });
        }
    }

    /// Serialise an XML document into a part
    ///
    /// # Errors
    ///
    /// Returns `Xml` if serialisation fails.
    pub fn set_xml_part(&mut self, name: impl Into<String>, doc: &XmlDocument) -> Result<()> {
        self.set_part(name, doc.to_bytes()?);
        Ok(())
    }

    /// Check the parts every WordprocessingML package needs
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` naming the first missing part.
    pub fn validate(&self) -> Result<()> {
        for required in [CONTENT_TYPES_PART, DOCUMENT_PART] {
            if !self.has_part(required) {
                return Err(ManudocError::InvalidTemplate(format!(
                    "package has no {required} part"
                )));
            }
        }
        Ok(())
    }

    /// Pick an unused part name of the form `{prefix}{n}.{ext}`
    #[must_use = "returns a free part name"]
    pub fn unique_part_name(&self, prefix: &str, ext: &str) -> String {
        (1..)
            .map(|n| format!("{prefix}{n}.{ext}"))
            .find(|name| !self.has_part(name))
            .unwrap_or_else(|| format!("{prefix}.{ext}"))
    }

    /// Add a relationship from `source_part` and return its id
    ///
    /// `target` is relative to the source part's folder, e.g. `media/image1.png`
    /// for a relationship from `word/document.xml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing relationship part is malformed.
    pub fn add_relationship(
        &mut self,
        source_part: &str,
        rel_type: &str,
        target: &str,
    ) -> Result<String> {
        let rels_name = relationships_part_name(source_part);
        let mut doc = if self.has_part(&rels_name) {
            self.xml_part(&rels_name)?
        } else {
            XmlDocument {
                declaration: Some(crate::xml::Declaration::default()),
                root: XmlElement::new("Relationships").with_attr("xmlns", RELATIONSHIPS_NS),
            }
        };

        let next = doc
            .root
            .elements()
            .filter_map(|rel| rel.attr("Id"))
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{next}");

        doc.root.children.push(XmlNode::Element(
            XmlElement::new("Relationship")
                .with_attr("Id", id.as_str())
                .with_attr("Type", rel_type)
                .with_attr("Target", target),
        ));
        self.set_xml_part(rels_name, &doc)?;
        Ok(id)
    }

    /// Declare a default content type for a file extension if none exists
    ///
    /// # Errors
    ///
    /// Returns an error if `[Content_Types].xml` is missing or malformed.
    pub fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) -> Result<()> {
        let mut doc = self.xml_part(CONTENT_TYPES_PART)?;
        let declared = doc.root.elements().any(|e| {
            e.is("Default")
                && e.attr("Extension")
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        });
        if declared {
            return Ok(());
        }

        // Defaults must precede Overrides
        let position = doc
            .root
            .children
            .iter()
            .position(|c| c.is_element("Override"))
            .unwrap_or(doc.root.children.len());
        doc.root.children.insert(
            position,
            XmlNode::Element(
                XmlElement::new("Default")
                    .with_attr("Extension", extension)
                    .with_attr("ContentType", content_type),
            ),
        );
        self.set_xml_part(CONTENT_TYPES_PART, &doc)
    }

    /// Serialise the package to ZIP bytes
    ///
    /// # Errors
    ///
    /// Returns `Zip` or `Buffer` if the archive cannot be assembled.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for entry in &self.entries {
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the package to a file
    ///
    /// # Errors
    ///
    /// Returns `Io` carrying `path` if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| ManudocError::io(path, e))
    }
}

/// Relationship part belonging to a source part
///
/// `word/document.xml` → `word/_rels/document.xml.rels`
#[must_use = "returns the relationship part name"]
pub fn relationships_part_name(source_part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{source_part}.rels"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    fn minimal_package() -> DocxPackage {
        let mut pkg = DocxPackage::new();
        pkg.set_part(CONTENT_TYPES_PART, CONTENT_TYPES.as_bytes().to_vec());
        pkg.set_part(DOCUMENT_PART, b"<w:document/>".to_vec());
        pkg
    }

    #[test]
    fn test_relationships_part_name() {
        assert_eq!(
            relationships_part_name("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(relationships_part_name("root.xml"), "_rels/root.xml.rels");
    }

    #[test]
    fn test_add_relationship_creates_part_and_increments() {
        let mut pkg = minimal_package();
        let first = pkg
            .add_relationship(DOCUMENT_PART, IMAGE_RELATIONSHIP, "media/image1.png")
            .unwrap();
        let second = pkg
            .add_relationship(DOCUMENT_PART, IMAGE_RELATIONSHIP, "media/image2.png")
            .unwrap();
        assert_eq!(first, "rId1");
        assert_eq!(second, "rId2");

        let rels = pkg.part_str("word/_rels/document.xml.rels").unwrap();
        assert!(rels.contains(r#"Target="media/image2.png""#));
    }

    #[test]
    fn test_content_type_inserted_before_overrides() {
        let mut pkg = minimal_package();
        pkg.ensure_default_content_type("png", "image/png").unwrap();
        pkg.ensure_default_content_type("PNG", "image/png").unwrap();

        let types = pkg.part_str(CONTENT_TYPES_PART).unwrap();
        assert_eq!(types.matches("Extension=\"png\"").count(), 1);
        assert!(types.find("Extension=\"png\"").unwrap() < types.find("<Override").unwrap());
    }

    #[test]
    fn test_bytes_roundtrip_and_determinism() {
        let pkg = minimal_package();
        let first = pkg.to_bytes().unwrap();
        let second = pkg.to_bytes().unwrap();
        assert_eq!(first, second);

        let reread = DocxPackage::from_bytes(&first).unwrap();
        assert_eq!(reread, pkg);
        reread.validate().unwrap();
    }

    #[test]
    fn test_validate_reports_missing_document() {
        let mut pkg = DocxPackage::new();
        pkg.set_part(CONTENT_TYPES_PART, CONTENT_TYPES.as_bytes().to_vec());
        let err = pkg.validate().unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn test_unique_part_name() {
        let mut pkg = minimal_package();
        assert_eq!(pkg.unique_part_name("word/media/image", "png"), "word/media/image1.png");
        pkg.set_part("word/media/image1.png", vec![1]);
        assert_eq!(pkg.unique_part_name("word/media/image", "png"), "word/media/image2.png");
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            DocxPackage::from_bytes(b"plain text"),
            Err(ManudocError::Zip(_))
        ));
    }
}
