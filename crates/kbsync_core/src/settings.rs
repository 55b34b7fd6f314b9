use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const MAX_PAGE_SIZE: u32 = 100;

const PLACEHOLDER_KEYS: &[&str] = &[
    "your_api_key",
    "your-api-key",
    "yourapikey",
    "api_key",
    "changeme",
    "<api-key>",
    "<api_key>",
];

/// Path fragments and hosts that mark a `src` as a helpdesk attachment even
/// when it carries no image extension.
pub const DEFAULT_ATTACHMENT_PATTERNS: &[&str] = &[
    "/helpdesk/attachments/",
    "attachment.freshservice.com",
    "/inline/attachment",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// In-process `html2md` conversion.
    #[default]
    Builtin,
    /// External `pandoc` process, falling back to the built-in converter.
    Pandoc,
}

impl FromStr for ConverterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(ConverterKind::Builtin),
            "pandoc" => Ok(ConverterKind::Pandoc),
            other => Err(format!("unknown converter {other:?} (expected builtin or pandoc)")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("helpdesk domain is not set")]
    MissingDomain,
    #[error("helpdesk domain {0:?} is not a valid host name")]
    InvalidDomain(String),
    #[error("API key is not set")]
    MissingApiKey,
    #[error("API key looks like a placeholder; set a real key")]
    PlaceholderApiKey,
    #[error("page size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    PageSize(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    /// Bare host name, e.g. `acme.freshservice.com`.
    pub domain: String,
    pub api_key: String,
    pub output_root: PathBuf,
    pub page_size: u32,
    pub request_delay: Duration,
    pub published_only: bool,
    pub generate_pdf: bool,
    pub backup_on_change: bool,
    pub converter: ConverterKind,
    pub attachment_patterns: Vec<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            domain: String::new(),
            api_key: String::new(),
            output_root: PathBuf::from("kb-export"),
            page_size: MAX_PAGE_SIZE,
            request_delay: Duration::from_millis(500),
            published_only: false,
            generate_pdf: false,
            backup_on_change: true,
            converter: ConverterKind::Builtin,
            attachment_patterns: DEFAULT_ATTACHMENT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ExportSettings {
    /// Checks credentials and limits, normalizing the domain to a bare host.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        self.domain = normalize_domain(&self.domain)?;

        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(SettingsError::MissingApiKey);
        }
        if is_placeholder_key(key) {
            return Err(SettingsError::PlaceholderApiKey);
        }
        self.api_key = key.to_string();

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SettingsError::PageSize(self.page_size));
        }
        Ok(self)
    }

    /// `https://<domain>`, used to resolve relative asset references.
    pub fn site_base(&self) -> String {
        format!("https://{}", self.domain)
    }

    pub fn api_base(&self) -> String {
        format!("https://{}/api/v2", self.domain)
    }
}

fn normalize_domain(raw: &str) -> Result<String, SettingsError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SettingsError::MissingDomain);
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|_| SettingsError::InvalidDomain(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.path().trim_matches('/') != "" {
        return Err(SettingsError::InvalidDomain(raw.to_string()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| SettingsError::InvalidDomain(raw.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn is_placeholder_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    PLACEHOLDER_KEYS.contains(&lower.as_str()) || lower.chars().all(|c| c == 'x')
}
