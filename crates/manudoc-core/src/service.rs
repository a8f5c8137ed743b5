//! Document service: the single generation entry point
//!
//! `generate` runs the whole pipeline for one request: map values (required
//! fields are checked first), load a fresh template copy, substitute, then
//! write the package. Nothing is written unless every earlier step succeeded.

use crate::config::GeneratorConfig;
use crate::error::{ManudocError, Result, Warning};
use crate::mapper::ValueMapper;
use crate::payload::ManuscriptRequest;
use crate::processor::DocumentProcessor;
use crate::template::TemplateStore;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Outcome of a successful generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    /// Path of the written document
    pub output_path: PathBuf,
    /// Non-fatal conditions met while filling the template
    pub warnings: Vec<Warning>,
    /// Wall time of the generation
    #[serde(skip)]
    pub latency: Duration,
}

/// A filled document held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// DOCX bytes
    pub bytes: Vec<u8>,
    /// Non-fatal conditions met while filling the template
    pub warnings: Vec<Warning>,
}

/// Generates manuscript documents from requests
#[derive(Debug, Clone)]
pub struct DocumentService {
    config: GeneratorConfig,
    templates: TemplateStore,
}

impl DocumentService {
    /// Service using `config` and the template it names
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is inconsistent.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let templates = TemplateStore::from_config(&config);
        Ok(Self { config, templates })
    }

    /// Replace the template store
    #[must_use = "returns the updated service"]
    pub fn with_template_store(mut self, templates: TemplateStore) -> Self {
        self.templates = templates;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use = "returns the configuration"]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Active template store
    #[inline]
    #[must_use = "returns the template store"]
    pub const fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Fill the template and return the document bytes
    ///
    /// # Errors
    ///
    /// Returns `MissingField`, `TemplateNotFound`, `InvalidTemplate`,
    /// `Template`, or `Figure` (strict mode).
    pub fn render(&self, request: &ManuscriptRequest) -> Result<RenderedDocument> {
        let values = ValueMapper::new(&self.config).map(request)?;
        let mut package = self.templates.load()?;
        let warnings = DocumentProcessor::new(&self.config).process(&mut package, &values)?;
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Ok(RenderedDocument {
            bytes: package.to_bytes()?,
            warnings,
        })
    }

    /// Fill the template and write it to `output_path`
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentService::render`], plus `Io` if the output cannot be
    /// written.
    pub fn generate(&self, request: &ManuscriptRequest, output_path: impl AsRef<Path>) -> Result<GenerationReport> {
        let start = Instant::now();
        let output_path = output_path.as_ref();
        let rendered = self.render(request)?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ManudocError::io(parent, e))?;
        }
        std::fs::write(output_path, &rendered.bytes).map_err(|e| ManudocError::io(output_path, e))?;

        let latency = start.elapsed();
        log::info!(
            "Generated {} in {:.1} ms ({} warnings)",
            output_path.display(),
            latency.as_secs_f64() * 1000.0,
            rendered.warnings.len()
        );
        Ok(GenerationReport {
            output_path: output_path.to_path_buf(),
            warnings: rendered.warnings,
            latency,
        })
    }

    /// Parse a JSON payload and generate from it
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` for malformed JSON, otherwise the same as
    /// [`DocumentService::generate`].
    pub fn generate_json(&self, json: &str, output_path: impl AsRef<Path>) -> Result<GenerationReport> {
        let request = ManuscriptRequest::from_json(json)?;
        self.generate(&request, output_path)
    }

    /// Generate into `dir` under a timestamped file name
    ///
    /// # Errors
    ///
    /// Same as [`DocumentService::generate`].
    pub fn generate_timestamped(&self, request: &ManuscriptRequest, dir: impl AsRef<Path>) -> Result<GenerationReport> {
        let name = timestamped_file_name(&self.config.output_prefix, Local::now());
        self.generate(request, dir.as_ref().join(name))
    }
}

/// `{prefix}_{YYYYMMDD_HHMMSS}.docx`
#[must_use = "returns the file name"]
pub fn timestamped_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{prefix}_{}.docx", at.format("%Y%m%d_%H%M%S"))
}
