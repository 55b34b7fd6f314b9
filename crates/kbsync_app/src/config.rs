use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kbsync_core::{ConverterKind, ExportSettings};
use serde::Deserialize;

/// Export a helpdesk knowledge base to local Markdown (and optionally PDF)
/// files. Re-running only rewrites articles whose content changed.
#[derive(Debug, Parser)]
#[command(name = "kbsync", author, version, about, long_about = None)]
pub struct Cli {
    /// Helpdesk domain, e.g. acme.freshservice.com.
    #[arg(long, env = "FRESHSERVICE_DOMAIN", value_name = "HOST")]
    pub domain: Option<String>,

    /// API key sent as the HTTP Basic user name.
    #[arg(long, env = "FRESHSERVICE_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output root. Defaults to ./kb-export if not set in config.
    #[arg(short, long, env = "KBSYNC_OUTPUT", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Items requested per listing page (1-100).
    #[arg(long, env = "KBSYNC_PAGE_SIZE", value_name = "N")]
    pub page_size: Option<u32>,

    /// Pause between requests, in milliseconds.
    #[arg(long, env = "KBSYNC_DELAY_MS", value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Skip articles that are not published.
    #[arg(long, env = "KBSYNC_PUBLISHED_ONLY")]
    pub published_only: bool,

    /// Render a PDF next to every written article (needs pandoc and a PDF engine).
    #[arg(long, env = "KBSYNC_PDF")]
    pub pdf: bool,

    /// Overwrite changed files without keeping a backup copy.
    #[arg(long)]
    pub no_backup: bool,

    #[arg(long, env = "KBSYNC_BACKUP", value_name = "BOOL", hide = true)]
    pub backup: Option<bool>,

    /// HTML to Markdown converter: builtin or pandoc.
    #[arg(long, env = "KBSYNC_CONVERTER", value_name = "NAME")]
    pub converter: Option<ConverterKind>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "KBSYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write the log to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log every article decision, including unchanged ones.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Values accepted from the config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub domain: Option<String>,
    pub api_key: Option<String>,
    pub output: Option<PathBuf>,
    pub page_size: Option<u32>,
    pub delay_ms: Option<u64>,
    pub published_only: Option<bool>,
    pub pdf: Option<bool>,
    pub backup: Option<bool>,
    pub converter: Option<ConverterKind>,
    pub attachment_patterns: Option<Vec<String>>,
}

pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Merge CLI (flags and environment) over the config file over defaults.
/// The result still has to pass [`ExportSettings::validated`].
pub fn resolve(cli: &Cli, file: FileConfig) -> ExportSettings {
    let defaults = ExportSettings::default();

    let backup_on_change = if cli.no_backup {
        false
    } else {
        cli.backup.or(file.backup).unwrap_or(defaults.backup_on_change)
    };

    ExportSettings {
        domain: cli.domain.clone().or(file.domain).unwrap_or_default(),
        api_key: cli.api_key.clone().or(file.api_key).unwrap_or_default(),
        output_root: cli
            .output
            .clone()
            .or(file.output)
            .unwrap_or(defaults.output_root),
        page_size: cli
            .page_size
            .or(file.page_size)
            .unwrap_or(defaults.page_size),
        request_delay: cli
            .delay_ms
            .or(file.delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_delay),
        published_only: cli.published_only || file.published_only.unwrap_or(false),
        generate_pdf: cli.pdf || file.pdf.unwrap_or(false),
        backup_on_change,
        converter: cli.converter.or(file.converter).unwrap_or_default(),
        attachment_patterns: file
            .attachment_patterns
            .unwrap_or(defaults.attachment_patterns),
    }
}
