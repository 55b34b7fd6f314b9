//! Embedded media and attachment download with `src` rewriting.
//!
//! References are discovered on the parsed DOM, so `src`-looking text inside
//! prose or comments is never treated as an asset. The rewrite itself edits
//! only the value spans of `src` attributes in the original markup and leaves
//! every other byte untouched.
//!
//! The `assets/` directory is shared by every article of a folder. A small
//! index next to the files records which URL each name was downloaded from, so
//! two different URLs with the same basename never share a file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use export_logging::{export_debug, export_warn};
use kbsync_core::Article;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::filename::{has_extension, sanitize_asset_filename};
use crate::persist::{AtomicFileWriter, PersistError};
use crate::{FetchError, Fetcher};

/// Directory name, relative to the folder output, that holds downloaded assets.
pub const ASSETS_DIR: &str = "assets";

/// Name of the per-directory index mapping asset filenames to source URLs.
pub const ASSET_SOURCES_FILE: &str = ".sources.json";

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico", "tif", "tiff", "avif",
];

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not store asset: {0}")]
    Persist(#[from] PersistError),
    #[error("could not encode asset index: {0}")]
    Index(#[from] serde_json::Error),
}

/// Result of [`AssetPipeline::rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    pub html: String,
    pub downloaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// One remote asset and every raw `src` spelling that refers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCandidate {
    pub url: Url,
    pub raw_sources: Vec<String>,
}

/// Filename → source URL for one assets directory.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SourceIndex {
    files: BTreeMap<String, String>,
}

impl SourceIndex {
    fn load(assets_dir: &Path) -> Self {
        let path = assets_dir.join(ASSET_SOURCES_FILE);
        let Ok(bytes) = fs::read(&path) else {
            return Self::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            export_warn!("ignoring unreadable asset index {}: {}", path.display(), err);
            Self::default()
        })
    }

    /// `preferred` unless it already belongs to another URL; then the first
    /// free or matching `<stem>-<n>.<ext>`.
    fn claim(&self, preferred: &str, url: &str) -> String {
        let (stem, ext) = match preferred.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (preferred, String::new()),
        };
        let mut suffix = 0usize;
        loop {
            let candidate = if suffix == 0 {
                preferred.to_string()
            } else {
                format!("{stem}-{suffix}{ext}")
            };
            match self.files.get(&candidate) {
                Some(owner) if owner != url => suffix += 1,
                _ => return candidate,
            }
        }
    }

    /// Returns `true` when the index changed.
    fn record(&mut self, filename: &str, url: &str) -> bool {
        if self.files.get(filename).is_some_and(|owner| owner == url) {
            return false;
        }
        self.files.insert(filename.to_string(), url.to_string());
        true
    }
}

pub struct AssetPipeline<'a> {
    fetcher: &'a dyn Fetcher,
    base: Option<Url>,
    attachment_patterns: Vec<String>,
}

impl<'a> AssetPipeline<'a> {
    /// `site_base` resolves relative references such as `/helpdesk/attachments/1`.
    pub fn new(
        fetcher: &'a dyn Fetcher,
        site_base: Option<&str>,
        attachment_patterns: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            base: site_base.and_then(|b| Url::parse(b).ok()),
            attachment_patterns,
        }
    }

    /// Download every embedded asset of `html` into `assets_dir` and point the
    /// `src` attributes at `assets/<filename>`. Failed downloads keep their
    /// original URL and leave any earlier local copy in place.
    pub async fn rewrite(&self, article_id: u64, html: &str, assets_dir: &Path) -> RewriteOutput {
        let candidates =
            collect_candidates(html, self.base.as_ref(), &self.attachment_patterns);
        let mut replacements: HashMap<String, String> = HashMap::new();
        let mut downloaded = 0;
        let mut failed = 0;

        for (index, candidate) in candidates.iter().enumerate() {
            let preferred = asset_filename(&candidate.url, article_id, index + 1);
            match self
                .store(candidate.url.as_str(), assets_dir, &preferred)
                .await
            {
                Ok(filename) => {
                    downloaded += 1;
                    let local = format!("{ASSETS_DIR}/{filename}");
                    for raw in &candidate.raw_sources {
                        replacements.insert(raw.clone(), local.clone());
                    }
                }
                Err(err) => {
                    failed += 1;
                    export_warn!(
                        "article {}: keeping remote asset {}: {}",
                        article_id,
                        candidate.url,
                        err
                    );
                }
            }
        }

        RewriteOutput {
            html: rewrite_src_attributes(html, &replacements),
            downloaded,
            failed,
        }
    }

    /// Download the article's explicit attachments.
    pub async fn download_attachments(
        &self,
        article: &Article,
        assets_dir: &Path,
    ) -> AttachmentSummary {
        let mut summary = AttachmentSummary::default();
        for (index, attachment) in article.attachments.iter().enumerate() {
            let url = attachment.url.trim();
            if url.is_empty() {
                continue;
            }
            let declared = if attachment.name.trim().is_empty() {
                url_basename(url)
            } else {
                attachment.name.clone()
            };
            let preferred = if declared.is_empty() {
                format!("attachment-{}-{}", article.id, index + 1)
            } else {
                sanitize_asset_filename(&declared)
            };

            match self.store(url, assets_dir, &preferred).await {
                Ok(_) => summary.downloaded += 1,
                Err(err) => {
                    summary.failed += 1;
                    export_warn!(
                        "article {}: attachment {} failed: {}",
                        article.id,
                        preferred,
                        err
                    );
                }
            }
        }
        summary
    }

    /// Download `url` under `preferred` (or a suffixed variant owned by the
    /// same URL) and return the filename used.
    async fn store(
        &self,
        url: &str,
        assets_dir: &Path,
        preferred: &str,
    ) -> Result<String, AssetError> {
        let mut sources = SourceIndex::load(assets_dir);
        let filename = sources.claim(preferred, url);

        let body = self.fetcher.download(url).await?;
        let writer = AtomicFileWriter::new(assets_dir.to_path_buf());
        writer.write(&filename, &body)?;
        if sources.record(&filename, url) {
            writer.write(ASSET_SOURCES_FILE, &serde_json::to_vec_pretty(&sources)?)?;
        }
        export_debug!("downloaded {} -> {}", url, assets_dir.join(&filename).display());
        Ok(filename)
    }
}

/// Downloadable `src` references of `html` in document order, deduplicated by
/// resolved URL.
pub fn collect_candidates(
    html: &str,
    base: Option<&Url>,
    attachment_patterns: &[String],
) -> Vec<AssetCandidate> {
    let mut candidates: Vec<AssetCandidate> = Vec::new();
    for raw in src_values(html) {
        let Some(url) = resolve(&raw, base) else {
            continue;
        };
        if !is_downloadable(&url, attachment_patterns) {
            continue;
        }
        match candidates.iter_mut().find(|c| c.url == url) {
            Some(existing) => {
                if !existing.raw_sources.contains(&raw) {
                    existing.raw_sources.push(raw);
                }
            }
            None => candidates.push(AssetCandidate {
                url,
                raw_sources: vec![raw],
            }),
        }
    }
    candidates
}

/// Image extension or helpdesk attachment pattern.
pub fn is_downloadable(url: &Url, attachment_patterns: &[String]) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let has_image_ext = url
        .path()
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    has_image_ext
        || attachment_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && url.as_str().contains(pattern.as_str()))
}

/// Basename of the URL path without query; `article-<id>-image-<n>.png` when it
/// has no extension.
pub fn asset_filename(url: &Url, article_id: u64, position: usize) -> String {
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    if basename.is_empty() || !has_extension(basename) {
        return format!("article-{article_id}-image-{position}.png");
    }
    sanitize_asset_filename(basename)
}

/// Replace the value of every `src` attribute whose decoded value is a key of
/// `replacements`. Text content, comments and other attributes are left alone.
pub fn rewrite_src_attributes(html: &str, replacements: &HashMap<String, String>) -> String {
    if replacements.is_empty() {
        return html.to_string();
    }
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let region = &rest[open..];
        if let Some(comment) = region.strip_prefix("<!--") {
            let end = comment.find("-->").map(|i| 4 + i + 3).unwrap_or(region.len());
            out.push_str(&region[..end]);
            rest = &region[end..];
            continue;
        }
        let end = tag_end(region);
        out.push_str(&rewrite_tag(&region[..end], replacements));
        rest = &region[end..];
    }
    out.push_str(rest);
    out
}

fn src_values(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse("[src]") else {
        return Vec::new();
    };
    fragment
        .select(&selector)
        .filter_map(|element| element.value().attr("src"))
        .map(str::to_string)
        .collect()
}

fn resolve(raw: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(trimmed).ok(),
        Err(_) => None,
    }
}

fn url_basename(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default()
}

/// Byte index just past the `>` closing the tag that starts `region`.
fn tag_end(region: &str) -> usize {
    let mut quote: Option<u8> = None;
    for (i, b) in region.bytes().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return i + 1,
            None => {}
        }
    }
    region.len()
}

fn rewrite_tag(tag: &str, replacements: &HashMap<String, String>) -> String {
    let bytes = tag.as_bytes();
    let mut out = String::with_capacity(tag.len());
    let mut copied = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if b == b'"' || b == b'\'' {
            quote = Some(b);
            i += 1;
            continue;
        }
        if !(b.is_ascii_whitespace() && is_src_name(&bytes[i + 1..])) {
            i += 1;
            continue;
        }

        let mut j = skip_whitespace(bytes, i + 4);
        if j >= bytes.len() || bytes[j] != b'=' {
            i = j;
            continue;
        }
        j = skip_whitespace(bytes, j + 1);
        if j >= bytes.len() {
            break;
        }

        let (start, end, next, quoted) = if bytes[j] == b'"' || bytes[j] == b'\'' {
            let q = bytes[j];
            let end = bytes[j + 1..]
                .iter()
                .position(|&c| c == q)
                .map(|p| j + 1 + p)
                .unwrap_or(bytes.len());
            (j + 1, end, (end + 1).min(bytes.len()), true)
        } else {
            let end = bytes[j..]
                .iter()
                .position(|&c| c.is_ascii_whitespace() || c == b'>')
                .map(|p| j + p)
                .unwrap_or(bytes.len());
            (j, end, end, false)
        };

        if let Some(local) = replacements.get(&decode_entities(&tag[start..end])) {
            out.push_str(&tag[copied..start]);
            if quoted {
                out.push_str(local);
            } else {
                out.push('"');
                out.push_str(local);
                out.push('"');
            }
            copied = end;
        }
        i = next;
    }
    out.push_str(&tag[copied..]);
    out
}

fn is_src_name(rest: &[u8]) -> bool {
    rest.len() >= 3
        && rest[..3].eq_ignore_ascii_case(b"src")
        && rest
            .get(3)
            .map(|&c| c == b'=' || c.is_ascii_whitespace())
            .unwrap_or(false)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
