//! Configuration discovery for the command line
//!
//! Configuration files can be placed in:
//! - User home directory: `~/.manudoc.toml` (user defaults)
//! - Project directory: `./.manudoc.toml` (project defaults)
//! - Custom location via `--config`
//!
//! Precedence (highest to lowest): command-line flags, `--config`, project
//! config, user config, built-in defaults. Layers are merged key by key, so a
//! project file only needs the keys it changes.

use anyhow::{Context, Result};
use colored::Colorize;
use manudoc_core::GeneratorConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched in the home and current directories
pub const CONFIG_FILE_NAME: &str = ".manudoc.toml";

/// Discovered configuration file locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayers {
    /// `~/.manudoc.toml`, when present
    pub user: Option<PathBuf>,
    /// `./.manudoc.toml`, when present
    pub project: Option<PathBuf>,
    /// Path given with `--config`
    pub explicit: Option<PathBuf>,
}

impl ConfigLayers {
    /// Find the user and project files and record the explicit one
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let user = dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .filter(|path| path.exists());
        let project = Some(PathBuf::from(CONFIG_FILE_NAME)).filter(|path| path.exists());
        Self {
            user,
            project,
            explicit,
        }
    }

    /// Merge the layers into a validated configuration
    ///
    /// A broken user or project file is reported and skipped; a broken
    /// `--config` file is an error.
    pub fn load(&self) -> Result<GeneratorConfig> {
        let mut merged = toml::Table::new();
        for (label, path) in [("user", &self.user), ("project", &self.project)] {
            let Some(path) = path else { continue };
            match read_layer(path) {
                Ok(layer) => merge_tables(&mut merged, layer),
                Err(e) => eprintln!(
                    "{} Failed to load {label} config from {}: {e:#}",
                    "Warning:".yellow().bold(),
                    path.display()
                ),
            }
        }
        if let Some(path) = &self.explicit {
            merge_tables(&mut merged, read_layer(path)?);
        }

        let config: GeneratorConfig = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Read one configuration file, resolving `template` against its directory
fn read_layer(path: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if let Some(toml::Value::String(template)) = table.get_mut("template") {
        let template_path = Path::new(template.as_str());
        if template_path.is_relative() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                *template = dir.join(template_path).to_string_lossy().into_owned();
            }
        }
    }
    log::debug!("Loaded config layer {}", path.display());
    Ok(table)
}

/// Overlay `overlay` onto `base`, recursing into nested tables
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_no_layers_gives_defaults() {
        let config = ConfigLayers::default().load().unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_precedence() {
        let dir = TempDir::new().unwrap();
        let layers = ConfigLayers {
            user: Some(write(&dir, "user.toml", "output_prefix = \"user\"\nheader_suffix = \"and others\"")),
            project: Some(write(&dir, "project.toml", "output_prefix = \"project\"")),
            explicit: Some(write(&dir, "explicit.toml", "strict_figures = true")),
        };
        let config = layers.load().unwrap();
        assert_eq!(config.output_prefix, "project");
        assert_eq!(config.header_suffix, "and others");
        assert!(config.strict_figures);
    }

    #[test]
    fn test_broken_project_layer_skipped() {
        let dir = TempDir::new().unwrap();
        let layers = ConfigLayers {
            project: Some(write(&dir, "project.toml", "output_prefix = ")),
            ..ConfigLayers::default()
        };
        assert_eq!(layers.load().unwrap().output_prefix, "IJMA_document");
    }

    #[test]
    fn test_broken_explicit_layer_fails() {
        let dir = TempDir::new().unwrap();
        let layers = ConfigLayers {
            explicit: Some(write(&dir, "explicit.toml", "strict_figures = \"maybe\"")),
            ..ConfigLayers::default()
        };
        assert!(layers.load().is_err());
    }

    #[test]
    fn test_template_resolved_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let layers = ConfigLayers {
            explicit: Some(write(&dir, "explicit.toml", "template = \"journal.docx\"")),
            ..ConfigLayers::default()
        };
        let config = layers.load().unwrap();
        assert_eq!(config.template, Some(dir.path().join("journal.docx")));
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: toml::Table = toml::from_str("a = 1\n[t]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Table = toml::from_str("b = 2\n[t]\ny = 3").unwrap();
        merge_tables(&mut base, overlay);
        assert_eq!(base["a"].as_integer(), Some(1));
        assert_eq!(base["b"].as_integer(), Some(2));
        assert_eq!(base["t"]["x"].as_integer(), Some(1));
        assert_eq!(base["t"]["y"].as_integer(), Some(3));
    }
}
