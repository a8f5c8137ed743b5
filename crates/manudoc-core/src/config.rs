//! Generator configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! template = "templates/journal.docx"
//! required_fields = ["research_title", "authors"]
//! extra_fields = ["volume", "issue"]
//! citation_suffix = "IJMA 2025; XX-XX [Article in Press]."
//! max_figure_width_in = 6.0
//! strict_figures = false
//! normalize_affiliations = true
//! ```

use crate::error::{ManudocError, Result};
use crate::placeholder::Placeholder;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// EMUs per inch (DrawingML unit)
pub const EMU_PER_INCH: f64 = 914_400.0;

/// Twentieths of a point per inch (WordprocessingML unit)
pub const TWIPS_PER_INCH: f64 = 1440.0;

/// Settings shared by the mapper, the processor and the merge units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Template file; the bundled template is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,

    /// Payload fields that must be present and non-blank
    pub required_fields: Vec<String>,

    /// Additional plain-text placeholders filled from same-named payload fields
    pub extra_fields: Vec<String>,

    /// Separator written after each author name
    pub author_separator: String,

    /// Text following the first author's short name in the running header
    pub header_suffix: String,

    /// Journal reference appended to the generated citation
    pub citation_suffix: String,

    /// `chrono` format used to render ISO dates
    pub date_format: String,

    /// Rewrite affiliations as `Department, Faculty, University, City, Country`
    pub normalize_affiliations: bool,

    /// Table style id applied to generated tables
    pub table_style: String,

    /// Add explicit single-line borders to generated tables
    pub table_borders: bool,

    /// Paragraph style id applied to table and figure captions
    pub caption_style: String,

    /// Usable text width in inches; tables span it and figures never exceed it
    pub max_figure_width_in: f64,

    /// Abort generation on the first figure that cannot be embedded
    pub strict_figures: bool,

    /// File name prefix for timestamped output
    pub output_prefix: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            template: None,
            required_fields: vec![
                Placeholder::ResearchTitle.name().to_string(),
                Placeholder::Authors.name().to_string(),
            ],
            extra_fields: Vec::new(),
            author_separator: ";".to_string(),
            header_suffix: "et al.".to_string(),
            citation_suffix: "IJMA 2025; XX-XX [Article in Press].".to_string(),
            date_format: "%d-%m-%Y".to_string(),
            normalize_affiliations: false,
            table_style: "TableGrid".to_string(),
            table_borders: true,
            caption_style: "Caption".to_string(),
            max_figure_width_in: 6.5,
            strict_figures: false,
            output_prefix: "IJMA_document".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Parse a configuration from TOML text and validate it
    ///
    /// # Errors
    ///
    /// Returns `Config` if the TOML is malformed or the settings are inconsistent.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `Config` if it is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ManudocError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Check that required fields name known placeholders and that numeric
    /// settings are usable
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for name in &self.extra_fields {
            if Placeholder::from_name(name).is_some() {
                return Err(ManudocError::Config(format!(
                    "extra field '{name}' shadows a built-in placeholder"
                )));
            }
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ManudocError::Config(format!(
                    "extra field '{name}' is not a valid placeholder name"
                )));
            }
        }

        for name in &self.required_fields {
            let known = Placeholder::from_name(name).is_some_and(Placeholder::is_payload_field)
                || self.extra_fields.iter().any(|f| f == name);
            if !known {
                return Err(ManudocError::Config(format!(
                    "required field '{name}' is not a payload field"
                )));
            }
        }

        let mut sample = String::new();
        if write!(sample, "{}", NaiveDate::default().format(&self.date_format)).is_err() {
            return Err(ManudocError::Config(format!(
                "date_format '{}' is not a valid date format",
                self.date_format
            )));
        }

        if !(self.max_figure_width_in.is_finite() && self.max_figure_width_in > 0.0) {
            return Err(ManudocError::Config(format!(
                "max_figure_width_in must be positive, got {}",
                self.max_figure_width_in
            )));
        }

        Ok(())
    }

    /// Whether `field` must be supplied by the payload
    #[inline]
    #[must_use = "returns whether the field is required"]
    pub fn is_required(&self, field: &str) -> bool {
        self.required_fields.iter().any(|f| f == field)
    }

    /// Maximum figure width in EMUs
    #[inline]
    #[must_use = "returns the figure width limit"]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_figure_width_emu(&self) -> u64 {
        (self.max_figure_width_in * EMU_PER_INCH).round() as u64
    }

    /// Text width in twips, used for table grid columns
    #[inline]
    #[must_use = "returns the text width"]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn text_width_twips(&self) -> u32 {
        (self.max_figure_width_in * TWIPS_PER_INCH).round() as u32
    }
}
