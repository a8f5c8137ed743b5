//! Error types for manuscript generation
//!
//! Fatal conditions abort a generation call and are returned as [`ManudocError`].
//! Non-fatal conditions (a figure that could not be decoded, an HTML table that
//! had to be inserted as text) are collected as [`Warning`]s and returned next to
//! the output path.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while generating a manuscript document
#[derive(Error, Debug)]
pub enum ManudocError {
    /// A required payload field is absent or blank
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Placeholders left unresolved after processing
    #[error("Unresolved template placeholders: {}", .0.join(", "))]
    Template(Vec<String>),

    /// Template asset does not exist
    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Template exists but is not a usable DOCX package
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Figure could not be embedded (fatal only in strict mode)
    #[error(transparent)]
    Figure(#[from] FigureError),

    /// Output could not be written
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path that was being read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Payload does not match the request structure
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration is inconsistent or unreadable
    #[error("Configuration error: {0}")]
    Config(String),

    /// ZIP archive error
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing or writing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// In-memory I/O error (package assembly)
    #[error("I/O error: {0}")]
    Buffer(#[from] io::Error),
}

/// Result type for manuscript generation
pub type Result<T> = std::result::Result<T, ManudocError>;

impl ManudocError {
    /// Attach a path to an I/O error
    #[inline]
    #[must_use = "creates an error value"]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for ManudocError {
    #[inline]
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

impl From<toml::de::Error> for ManudocError {
    #[inline]
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ManudocError {
    #[inline]
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.into())
    }
}

/// A figure that could not be embedded
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("figure {index} skipped: {reason}")]
pub struct FigureError {
    /// 1-based position of the fragment in the payload
    pub index: usize,
    /// Caption of the fragment, if any
    pub caption: Option<String>,
    /// Why the image could not be used
    pub reason: String,
}

/// Non-fatal condition reported alongside a successful generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A figure was skipped
    Figure(FigureError),
    /// An HTML table fragment had no parsable table and was inserted as text
    TableFallback {
        /// 1-based position of the fragment in the payload
        index: usize,
        /// Why the table could not be built
        reason: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Figure(err) => write!(f, "{err}"),
            Self::TableFallback { index, reason } => {
                write!(f, "table {index} inserted as text: {reason}")
            }
        }
    }
}
