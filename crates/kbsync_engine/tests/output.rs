use kbsync_core::{Article, ArticleStatus};
use kbsync_engine::{
    build_markdown_document, content_digest, select_pdf_engine, Converter, Html2MdConverter,
    PdfEngine,
};
use pretty_assertions::assert_eq;

fn article() -> Article {
    Article {
        id: 17,
        title: r#"Say "hi" to C:\drive"#.to_string(),
        status: Some(ArticleStatus::Published),
        description: Some("<p>Body</p>".to_string()),
        created_at: Some("2024-01-01T00:00:00Z".to_string()),
        updated_at: Some("2024-03-01T12:00:00Z".to_string()),
        tags: vec!["setup".to_string(), "a, b".to_string()],
        attachments: Vec::new(),
        folder_id: 4,
    }
}

#[test]
fn frontmatter_layout_is_exact() {
    let doc = build_markdown_document(&article(), "Body text\n\n");

    assert_eq!(
        doc,
        concat!(
            "---\n",
            "title: \"Say \\\"hi\\\" to C:\\\\drive\"\n",
            "id: 17\n",
            "folder_id: 4\n",
            "created_at: \"2024-01-01T00:00:00Z\"\n",
            "updated_at: \"2024-03-01T12:00:00Z\"\n",
            "tags: [setup, \"a, b\"]\n",
            "status: 2\n",
            "source: freshservice\n",
            "---\n",
            "\n",
            "# Say \"hi\" to C:\\drive\n",
            "\n",
            "Body text\n",
        )
    );
}

#[test]
fn optional_fields_are_omitted() {
    let mut bare = article();
    bare.created_at = None;
    bare.updated_at = None;
    bare.tags.clear();
    bare.status = Some(ArticleStatus::Draft);

    let doc = build_markdown_document(&bare, "x");
    assert!(!doc.contains("created_at"));
    assert!(!doc.contains("updated_at"));
    assert!(!doc.contains("tags:"));
    assert!(doc.contains("status: 1\n"));

    bare.status = None;
    let doc = build_markdown_document(&bare, "x");
    assert!(!doc.contains("status:"));
    assert!(doc.contains("source: freshservice\n"));
}

#[tokio::test]
async fn rendering_is_hash_stable() {
    let html = r#"<h2>Steps</h2><ol><li>Open <a href="https://x.example">settings</a></li><li>Save</li></ol><img src="assets/x.png">"#;
    let converter = Html2MdConverter;

    let first = converter.to_markdown(html).await;
    let second = converter.to_markdown(html).await;
    assert!(first.warnings.is_empty());

    let a = build_markdown_document(&article(), &first.markdown);
    let b = build_markdown_document(&article(), &second.markdown);
    assert_eq!(content_digest(a.as_bytes()), content_digest(b.as_bytes()));
    assert!(a.contains("assets/x.png"));
}

#[tokio::test]
async fn builtin_converter_produces_markdown() {
    let out = Html2MdConverter.to_markdown("<h1>Hello</h1><p>world</p>").await;
    let trimmed = out.markdown.trim();
    assert!(
        trimmed.starts_with("# Hello") || trimmed.starts_with("Hello\n=="),
        "unexpected markdown output: {out:?}"
    );
    assert!(trimmed.contains("world"));
}

#[test]
fn pdf_engine_follows_priority_order() {
    assert_eq!(select_pdf_engine(|_| true), Some(PdfEngine::Xelatex));
    assert_eq!(
        select_pdf_engine(|p| p == "weasyprint" || p == "wkhtmltopdf"),
        Some(PdfEngine::Wkhtmltopdf)
    );
    assert_eq!(select_pdf_engine(|_| false), None);
}
