//! Template store
//!
//! The bundled journal template is compiled into the library, so generation
//! works without any file on disk. A configured template path replaces it.

use crate::config::GeneratorConfig;
use crate::error::{ManudocError, Result};
use crate::package::{DocxPackage, DOCUMENT_PART};
use crate::processor::{is_story_part, scan_tokens};
use std::path::{Path, PathBuf};

/// Parts of the bundled template, in archive order
const BUNDLED_PARTS: &[(&str, &str)] = &[
    (
        "[Content_Types].xml",
        include_str!("../assets/template/[Content_Types].xml"),
    ),
    ("_rels/.rels", include_str!("../assets/template/_rels/.rels")),
    (
        "word/document.xml",
        include_str!("../assets/template/word/document.xml"),
    ),
    (
        "word/_rels/document.xml.rels",
        include_str!("../assets/template/word/_rels/document.xml.rels"),
    ),
    (
        "word/styles.xml",
        include_str!("../assets/template/word/styles.xml"),
    ),
    (
        "word/header1.xml",
        include_str!("../assets/template/word/header1.xml"),
    ),
];

/// Where a template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Template compiled into the library
    Bundled,
    /// `.docx` file on disk
    File(PathBuf),
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bundled => write!(f, "bundled template"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Loads template packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStore {
    source: TemplateSource,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::bundled()
    }
}

impl TemplateStore {
    /// Store serving the bundled template
    #[inline]
    #[must_use = "creates a template store"]
    pub const fn bundled() -> Self {
        Self {
            source: TemplateSource::Bundled,
        }
    }

    /// Store serving a template file
    #[inline]
    #[must_use = "creates a template store"]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: TemplateSource::File(path.into()),
        }
    }

    /// Store for the template named by `config`, or the bundled one
    #[must_use = "creates a template store"]
    pub fn from_config(config: &GeneratorConfig) -> Self {
        config
            .template
            .as_ref()
            .map_or_else(Self::bundled, |path| Self::from_path(path.clone()))
    }

    /// Where templates are loaded from
    #[inline]
    #[must_use = "returns the template source"]
    pub const fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Load a fresh copy of the template package
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` if the file does not exist, `InvalidTemplate`
    /// if it is not a ZIP archive or lacks the main document part.
    pub fn load(&self) -> Result<DocxPackage> {
        let package = match &self.source {
            TemplateSource::Bundled => bundled_package(),
            TemplateSource::File(path) => load_file(path)?,
        };
        package.validate()?;
        log::debug!("Loaded {} ({} parts)", self.source, package.part_names().count());
        Ok(package)
    }

    /// Placeholder names the template contains, in document order
    ///
    /// The main document comes first, then headers and footers.
    ///
    /// # Errors
    ///
    /// Same as [`TemplateStore::load`], plus XML errors for malformed parts.
    pub fn placeholders(&self) -> Result<Vec<String>> {
        let package = self.load()?;
        let mut parts: Vec<&str> = package.part_names().filter(|n| is_story_part(n)).collect();
        parts.sort_by_key(|name| *name != DOCUMENT_PART);

        let mut names = Vec::new();
        for part in parts {
            names.extend(scan_tokens(&package.xml_part(part)?.root));
        }
        Ok(names)
    }

    /// Write the bundled template to `path` as a `.docx`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn export_bundled(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ManudocError::io(parent, e))?;
        }
        bundled_package().save(path)?;
        log::info!("Exported bundled template to {}", path.display());
        Ok(())
    }
}

/// The bundled template as a package
#[must_use = "returns the bundled template package"]
pub fn bundled_package() -> DocxPackage {
    let mut package = DocxPackage::new();
    for (name, content) in BUNDLED_PARTS {
        package.set_part(*name, content.as_bytes().to_vec());
    }
    package
}

fn load_file(path: &Path) -> Result<DocxPackage> {
    if !path.exists() {
        return Err(ManudocError::TemplateNotFound(path.to_path_buf()));
    }
    DocxPackage::open(path).map_err(|e| match e {
        ManudocError::Zip(zip) => {
            ManudocError::InvalidTemplate(format!("{} is not a DOCX package: {zip}", path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::Placeholder;

    #[test]
    fn test_bundled_template_loads() {
        let package = TemplateStore::bundled().load().unwrap();
        assert!(package.has_part(DOCUMENT_PART));
        assert!(package.has_part("word/styles.xml"));
    }

    #[test]
    fn test_bundled_template_has_every_placeholder() {
        let names = TemplateStore::bundled().placeholders().unwrap();
        for placeholder in Placeholder::ALL {
            assert!(
                names.iter().any(|n| n == placeholder.name()),
                "missing {}",
                placeholder.name()
            );
        }
        assert_eq!(names.first().map(String::as_str), Some("research_type"));
        assert_eq!(names.last().map(String::as_str), Some("header_name"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let store = TemplateStore::from_path("/nonexistent/template.docx");
        assert!(matches!(store.load(), Err(ManudocError::TemplateNotFound(_))));
    }

    #[test]
    fn test_non_zip_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"plain text").unwrap();
        let err = TemplateStore::from_path(&path).load().unwrap_err();
        assert!(matches!(err, ManudocError::InvalidTemplate(_)));
    }

    #[test]
    fn test_zip_without_document_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.docx");
        let mut package = DocxPackage::new();
        package.set_part("[Content_Types].xml", b"<Types/>".to_vec());
        package.save(&path).unwrap();
        let err = TemplateStore::from_path(&path).load().unwrap_err();
        assert!(matches!(err, ManudocError::InvalidTemplate(_)));
    }

    #[test]
    fn test_export_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/template.docx");
        TemplateStore::export_bundled(&path).unwrap();
        let exported = TemplateStore::from_path(&path).placeholders().unwrap();
        assert_eq!(exported, TemplateStore::bundled().placeholders().unwrap());
    }

    #[test]
    fn test_from_config() {
        let mut config = GeneratorConfig::default();
        assert_eq!(TemplateStore::from_config(&config).source(), &TemplateSource::Bundled);
        config.template = Some(PathBuf::from("t.docx"));
        assert_eq!(
            TemplateStore::from_config(&config).source(),
            &TemplateSource::File(PathBuf::from("t.docx"))
        );
    }
}
