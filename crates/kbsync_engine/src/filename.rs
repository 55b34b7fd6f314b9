use std::path::Path;

const MAX_TITLE_LEN: usize = 80;
const MAX_ASSET_NAME_LEN: usize = 100;
const MAX_EXTENSION_LEN: usize = 10;

/// Windows-safe, deterministic article filename: `{sanitized_title}--{id}.md`.
pub fn article_filename(title: &str, id: u64) -> String {
    let sanitized = sanitize_title(title, "untitled");
    format!("{sanitized}--{id}.md")
}

/// Directory name for a category or folder; falls back to `{kind}-{id}` when
/// the name has nothing usable left.
pub fn directory_name(name: &str, kind: &str, id: u64) -> String {
    let fallback = format!("{kind}-{id}");
    sanitize_title(name, &fallback)
}

/// Restrict an asset filename to `[a-zA-Z0-9._-]`.
///
/// Runs of the same separator collapse to one, separators are
/// trimmed from both ends and the name is capped while keeping its extension.
pub fn sanitize_asset_filename(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev: Option<char> = None;
    for c in input.chars() {
        let c = if c.is_ascii_alphanumeric() || is_separator(c) {
            c
        } else {
            '_'
        };
        if is_separator(c) && prev == Some(c) {
            continue;
        }
        compacted.push(c);
        prev = Some(c);
    }

    let trimmed = compacted.trim_matches(is_separator);
    if trimmed.is_empty() {
        return "file".to_string();
    }
    if trimmed.len() <= MAX_ASSET_NAME_LEN {
        return trimmed.to_string();
    }

    // Only ASCII is left at this point, so byte slicing is safe.
    let (stem, ext) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_EXTENSION_LEN => (stem, Some(ext)),
        _ => (trimmed, None),
    };
    match ext {
        Some(ext) => {
            let keep = MAX_ASSET_NAME_LEN - ext.len() - 1;
            let stem = stem[..keep.min(stem.len())].trim_end_matches(is_separator);
            format!("{stem}.{ext}")
        }
        None => trimmed[..MAX_ASSET_NAME_LEN]
            .trim_end_matches(is_separator)
            .to_string(),
    }
}

/// Whether a filename carries an extension (`photo.png` does, `download` does not).
pub fn has_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| !ext.is_empty())
        .unwrap_or(false)
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

fn sanitize_title(input: &str, fallback: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    // Collapse multiple underscores
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut final_name = truncate_chars(&compacted, MAX_TITLE_LEN)
        .trim_end_matches(&['_', ' ', '.'][..])
        .to_string();
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn truncate_chars(input: &str, max: usize) -> &str {
    match input.char_indices().nth(max) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
