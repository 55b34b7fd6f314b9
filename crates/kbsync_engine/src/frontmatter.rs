use kbsync_core::Article;

pub const SOURCE_MARKER: &str = "freshservice";

/// Assemble the exported Markdown document: frontmatter, an H1 title and the
/// converted body. The output depends only on its inputs; no timestamps of
/// the run itself are embedded, so unchanged articles render byte-identically.
pub fn build_markdown_document(article: &Article, body_markdown: &str) -> String {
    let mut doc = String::with_capacity(body_markdown.len() + 256);
    doc.push_str("---\n");
    doc.push_str(&format!("title: {}\n", quote(&article.title)));
    doc.push_str(&format!("id: {}\n", article.id));
    doc.push_str(&format!("folder_id: {}\n", article.folder_id));
    if let Some(created) = article.created_at.as_deref() {
        doc.push_str(&format!("created_at: {}\n", quote(created)));
    }
    if let Some(updated) = article.updated_at.as_deref() {
        doc.push_str(&format!("updated_at: {}\n", quote(updated)));
    }
    if !article.tags.is_empty() {
        let tags: Vec<String> = article.tags.iter().map(|t| tag_value(t)).collect();
        doc.push_str(&format!("tags: [{}]\n", tags.join(", ")));
    }
    if let Some(status) = article.status {
        doc.push_str(&format!("status: {}\n", status.code()));
    }
    doc.push_str(&format!("source: {SOURCE_MARKER}\n"));
    doc.push_str("---\n\n");

    doc.push_str(&format!("# {}\n\n", article.title.trim()));
    let body = body_markdown.trim();
    if !body.is_empty() {
        doc.push_str(body);
        doc.push('\n');
    }
    doc
}

fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

fn tag_value(tag: &str) -> String {
    let needs_quotes = tag.is_empty()
        || tag != tag.trim()
        || tag
            .chars()
            .any(|c| matches!(c, ',' | '[' | ']' | '{' | '}' | ':' | '#' | '"' | '\'' | '\n'));
    if needs_quotes {
        quote(tag)
    } else {
        tag.to_string()
    }
}
