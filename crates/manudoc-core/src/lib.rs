//! Manuscript template filler
//!
//! Fills a Word (`.docx`) journal template with manuscript metadata and
//! content: title, authors and affiliations, dates, abstract, body sections,
//! references, plus tables and figures converted into native Word content.
//!
//! ## Usage
//!
//! ```no_run
//! use manudoc_core::{DocumentService, GeneratorConfig, ManuscriptRequest};
//!
//! let request = ManuscriptRequest::from_json(r#"{
//!     "research_title": "Outcome of early mobilisation after knee surgery",
//!     "authors": ["Lee, Ann", "Omar Hassan"],
//!     "affiliation": ["Department of Surgery, Cairo University"]
//! }"#)?;
//!
//! let service = DocumentService::new(GeneratorConfig::default())?;
//! let report = service.generate(&request, "out/manuscript.docx")?;
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pipeline
//!
//! - [`mapper`] turns a [`ManuscriptRequest`] into formatted placeholder values
//! - [`template`] loads the bundled template or a template file
//! - [`processor`] substitutes values into the body, headers and footers
//! - [`tables`] and [`figures`] build native tables and inline pictures
//! - [`service`] ties the steps together and writes the output
//!
//! [`submission`] reads a payload's metadata from a journal submission page,
//! and [`affiliation`] rewrites free-text affiliations into one layout when
//! `normalize_affiliations` is set.

pub mod affiliation;
pub mod config;
pub mod error;
pub mod figures;
pub mod formatting;
pub mod mapper;
pub mod package;
pub mod payload;
pub mod placeholder;
pub mod processor;
pub mod service;
pub mod style;
pub mod submission;
pub mod tables;
pub mod template;
pub mod xml;

// Re-export main types
pub use config::GeneratorConfig;
pub use error::{FigureError, ManudocError, Result, Warning};
pub use mapper::{PlaceholderMap, PlaceholderValue, ValueMapper};
pub use package::DocxPackage;
pub use payload::{FigureFragment, FigureSource, ManuscriptRequest, TableContent, TableFragment};
pub use placeholder::Placeholder;
pub use processor::DocumentProcessor;
pub use service::{timestamped_file_name, DocumentService, GenerationReport, RenderedDocument};
pub use submission::{Submission, SubmissionAuthor};
pub use template::{TemplateSource, TemplateStore};
