//! manudoc CLI - manuscript document generator
//!
//! Fills the journal `.docx` template from a JSON payload.

mod settings;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use manudoc_core::{DocumentService, GenerationReport, ManuscriptRequest, Submission, TemplateStore};
use settings::ConfigLayers;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "manudoc")]
#[command(version, about = "Fill manuscript .docx templates from JSON payloads", long_about = None)]
struct Args {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a manuscript document from a JSON payload
    #[command(after_help = "Defaults can be set via .manudoc.toml in the home or current directory.")]
    Generate {
        /// JSON payload file, or - for stdin
        #[arg(short, long)]
        payload: PathBuf,

        /// Output .docx path (a directory with --timestamped)
        #[arg(short, long, required_unless_present = "timestamped")]
        output: Option<PathBuf>,

        /// Template .docx to fill instead of the bundled one
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Configuration file (overrides user and project config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fail when a figure cannot be embedded
        #[arg(long)]
        strict_figures: bool,

        /// Rewrite affiliations as Department, Faculty, University, City, Country
        #[arg(long)]
        normalize_affiliations: bool,

        /// Name the output {prefix}_{timestamp}.docx
        #[arg(long)]
        timestamped: bool,

        /// Print the generation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the placeholders a template contains
    Placeholders {
        /// Template .docx to inspect instead of the bundled one
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Configuration file (overrides user and project config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the bundled template to a file for editing
    ExportTemplate {
        /// Destination .docx path
        path: PathBuf,
    },

    /// Extract a JSON payload from a saved submission page
    Scrape {
        /// Submission page (.html)
        html: PathBuf,

        /// Write the payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match args.command {
        Commands::Generate {
            payload,
            output,
            template,
            config,
            strict_figures,
            normalize_affiliations,
            timestamped,
            json,
        } => {
            let mut generator_config = ConfigLayers::discover(config).load()?;
            if let Some(template) = template {
                generator_config.template = Some(template);
            }
            generator_config.strict_figures |= strict_figures;
            generator_config.normalize_affiliations |= normalize_affiliations;

            let request = read_payload(&payload)?;
            let service = DocumentService::new(generator_config).context("Invalid configuration")?;
            let report = if timestamped {
                let dir = output.unwrap_or_else(|| PathBuf::from("."));
                service.generate_timestamped(&request, &dir)
            } else {
                let output = output.context("--output is required")?;
                service.generate(&request, with_docx_extension(&output))
            }
            .context("Generation failed")?;

            print_report(&report, json)?;
        }
        Commands::Placeholders {
            template,
            config,
            json,
        } => {
            let generator_config = ConfigLayers::discover(config).load()?;
            let store = template.map_or_else(|| TemplateStore::from_config(&generator_config), TemplateStore::from_path);
            let names = store
                .placeholders()
                .with_context(|| format!("Failed to read {}", store.source()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{{{{{name}}}}}");
                }
            }
        }
        Commands::ExportTemplate { path } => {
            let path = with_docx_extension(&path);
            TemplateStore::export_bundled(&path).context("Failed to export template")?;
            println!("{} {}", "Exported".green().bold(), path.display());
        }
        Commands::Scrape { html, output } => {
            let page = fs::read_to_string(&html)
                .with_context(|| format!("Failed to read submission page: {}", html.display()))?;
            let submission = Submission::from_html(&page);
            if submission.is_empty() {
                anyhow::bail!("No manuscript title or authors found in {}", html.display());
            }
            let payload = serde_json::to_string_pretty(&submission.to_payload())?;
            match output {
                Some(path) => {
                    fs::write(&path, payload).with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("{} {}", "Wrote".green().bold(), path.display());
                }
                None => println!("{payload}"),
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn read_payload(path: &Path) -> Result<ManuscriptRequest> {
    let json = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read payload from stdin")?;
        buffer
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read payload: {}", path.display()))?
    };
    ManuscriptRequest::from_json(&json).with_context(|| format!("Invalid payload: {}", path.display()))
}

/// Append `.docx` unless the path already ends with it
fn with_docx_extension(path: &Path) -> PathBuf {
    let has_docx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
    if has_docx {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".docx");
    PathBuf::from(name)
}

fn print_report(report: &GenerationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for warning in &report.warnings {
        eprintln!("{} {warning}", "Warning:".yellow().bold());
    }
    println!(
        "{} {} ({:.1} ms)",
        "Generated".green().bold(),
        report.output_path.display(),
        report.latency.as_secs_f64() * 1000.0
    );
    Ok(())
}
