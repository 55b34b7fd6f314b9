use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kbsync_engine::{
    backup_path, backup_stamp, AssetPipeline, ExportError, Exporter, FetchSettings, HelpdeskApi,
    Html2MdConverter, PageSettings, PdfError, PdfRenderer, ReqwestFetcher, WalkerOptions,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CountingPdf {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PdfRenderer for CountingPdf {
    async fn render(&self, _markdown: &Path, pdf: &Path) -> Result<(), PdfError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(pdf, b"%PDF-1.4").map_err(|source| PdfError::Io {
            path: pdf.to_path_buf(),
            source,
        })
    }
}

async fn json_route(server: &MockServer, route: &str, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// A listing route that only answers when `key=value` is in the query.
async fn filtered_route(
    server: &MockServer,
    route: &str,
    (key, value): (&str, &str),
    status: u16,
    body: Value,
) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param(key, value))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1..)
        .mount(server)
        .await;
}

/// One category with a healthy folder and a folder whose listing fails.
async fn mount_kb(server: &MockServer, install_body: &str) {
    json_route(
        server,
        "/api/v2/solutions/categories",
        200,
        json!([{ "id": 1, "name": "Guides" }]),
    )
    .await;
    filtered_route(
        server,
        "/api/v2/solutions/folders",
        ("category_id", "1"),
        200,
        json!([{ "id": 10, "name": "Setup" }, { "id": 11, "name": "Broken" }]),
    )
    .await;
    filtered_route(
        server,
        "/api/v2/solutions/articles",
        ("folder_id", "10"),
        200,
        json!([
            { "id": 100, "title": "Install", "status": 2 },
            { "id": 101, "title": "Draft notes", "status": 1 },
            { "id": 102, "title": "Missing", "status": 2 },
            { "id": 103, "title": "Empty", "status": 2 }
        ]),
    )
    .await;
    filtered_route(
        server,
        "/api/v2/solutions/articles",
        ("folder_id", "11"),
        500,
        json!({ "message": "boom" }),
    )
    .await;
    json_route(
        server,
        "/api/v2/solutions/articles/100",
        200,
        json!({
            "id": 100,
            "title": "Install",
            "status": 2,
            "description": install_body,
            "tags": ["setup"],
            "updated_at": "2024-03-01T12:00:00Z"
        }),
    )
    .await;
    json_route(
        server,
        "/api/v2/solutions/articles/101",
        200,
        json!({ "id": 101, "title": "Draft notes", "status": 1, "description": "<p>wip</p>" }),
    )
    .await;
    json_route(
        server,
        "/api/v2/solutions/articles/102",
        404,
        json!({ "message": "not found" }),
    )
    .await;
    json_route(
        server,
        "/api/v2/solutions/articles/103",
        200,
        json!({ "id": 103, "title": "Empty", "status": 2, "description": "  " }),
    )
    .await;
}

fn options(root: &Path, published_only: bool) -> WalkerOptions {
    WalkerOptions {
        output_root: root.to_path_buf(),
        published_only,
        backup_on_change: true,
        article_delay: Duration::ZERO,
    }
}

fn paging() -> PageSettings {
    PageSettings {
        per_page: 100,
        delay: Duration::ZERO,
        max_pages: 10,
    }
}

fn exporter<'a>(
    fetcher: &'a ReqwestFetcher,
    server: &MockServer,
    converter: &'a Html2MdConverter,
    root: &Path,
    published_only: bool,
) -> Exporter<'a> {
    Exporter::new(
        HelpdeskApi::new(fetcher, format!("{}/api/v2", server.uri()), paging()),
        AssetPipeline::new(fetcher, Some(&server.uri()), Vec::new()),
        converter,
        options(root, published_only),
    )
}

fn files_ending_with(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(suffix) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

#[tokio::test]
async fn second_run_without_changes_writes_nothing() {
    let server = MockServer::start().await;
    mount_kb(&server, "<p>Install steps</p>").await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;
    let pdf = CountingPdf::default();

    let first = exporter(&fetcher, &server, &converter, temp.path(), true)
        .with_pdf(&pdf)
        .run()
        .await
        .unwrap();
    assert_eq!(first.exported, 1);
    assert_eq!(first.filtered, 1);
    assert_eq!(first.failed, 2);
    assert_eq!(first.listing_failures, 1);
    assert_eq!(first.pdfs, 1);
    assert!(first.has_failures());

    let markdown = files_ending_with(temp.path(), ".md");
    assert_eq!(markdown.len(), 1);
    assert!(markdown[0].to_string_lossy().ends_with("Install--100.md"));
    let text = fs::read_to_string(&markdown[0]).unwrap();
    assert!(text.starts_with("---\ntitle: \"Install\"\nid: 100\nfolder_id: 10\n"));
    assert!(text.contains("# Install\n"));
    assert!(text.contains("Install steps"));
    assert_eq!(files_ending_with(temp.path(), ".pdf").len(), 1);

    let second = exporter(&fetcher, &server, &converter, temp.path(), true)
        .with_pdf(&pdf)
        .run()
        .await
        .unwrap();
    assert_eq!(second.exported, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.backups, 0);
    assert_eq!(pdf.calls.load(Ordering::SeqCst), 1);
    assert!(files_ending_with(temp.path(), ".bak.md").is_empty());
}

#[tokio::test]
async fn changed_article_is_backed_up_once() {
    let server = MockServer::start().await;
    mount_kb(&server, "<p>Install steps</p>").await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;
    let pdf = CountingPdf::default();

    let first = exporter(&fetcher, &server, &converter, temp.path(), true)
        .with_pdf(&pdf)
        .run()
        .await
        .unwrap();
    assert_eq!(first.backups, 0);

    server.reset().await;
    mount_kb(&server, "<p>Install steps, revised</p>").await;

    let second = exporter(&fetcher, &server, &converter, temp.path(), true)
        .with_pdf(&pdf)
        .run()
        .await
        .unwrap();
    assert_eq!(second.exported, 1);
    assert_eq!(second.backups, 1);
    assert_eq!(files_ending_with(temp.path(), ".bak.md").len(), 1);
    assert_eq!(files_ending_with(temp.path(), ".bak.pdf").len(), 1);
    assert_eq!(pdf.calls.load(Ordering::SeqCst), 2);

    let current = files_ending_with(temp.path(), "Install--100.md");
    assert_eq!(current.len(), 1);
    assert!(fs::read_to_string(&current[0]).unwrap().contains("revised"));
}

#[tokio::test]
async fn identical_existing_backup_is_not_counted_again() {
    let server = MockServer::start().await;
    mount_kb(&server, "<p>Install steps</p>").await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;

    exporter(&fetcher, &server, &converter, temp.path(), true)
        .run()
        .await
        .unwrap();
    let md = files_ending_with(temp.path(), "Install--100.md").remove(0);
    let stamp = backup_stamp(fs::metadata(&md).unwrap().modified().unwrap());
    fs::copy(&md, backup_path(&md, &stamp)).unwrap();

    server.reset().await;
    mount_kb(&server, "<p>Install steps, revised</p>").await;
    let second = exporter(&fetcher, &server, &converter, temp.path(), true)
        .run()
        .await
        .unwrap();

    assert_eq!(second.exported, 1);
    assert_eq!(second.backups, 0);
    assert_eq!(files_ending_with(temp.path(), ".bak.md").len(), 1);
    assert!(fs::read_to_string(&md).unwrap().contains("revised"));
}

#[tokio::test]
async fn listing_without_status_defers_to_the_detail() {
    let server = MockServer::start().await;
    json_route(
        &server,
        "/api/v2/solutions/categories",
        200,
        json!([{ "id": 1, "name": "Guides" }]),
    )
    .await;
    filtered_route(
        &server,
        "/api/v2/solutions/folders",
        ("category_id", "1"),
        200,
        json!({ "folders": [{ "id": 10, "name": "Setup" }] }),
    )
    .await;
    filtered_route(
        &server,
        "/api/v2/solutions/articles",
        ("folder_id", "10"),
        200,
        json!({ "articles": [
            { "id": 200, "title": "Published later" },
            { "id": 201, "title": "Still a draft" }
        ] }),
    )
    .await;
    json_route(
        &server,
        "/api/v2/solutions/articles/200",
        200,
        json!({ "article": { "id": 200, "title": "Published later", "status": 2, "description": "<p>Live</p>" } }),
    )
    .await;
    json_route(
        &server,
        "/api/v2/solutions/articles/201",
        200,
        json!({ "id": 201, "title": "Still a draft", "status": 1, "description": "<p>wip</p>" }),
    )
    .await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;

    let report = exporter(&fetcher, &server, &converter, temp.path(), true)
        .run()
        .await
        .unwrap();

    assert_eq!(report.exported, 1);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.failed, 0);
    let markdown = files_ending_with(temp.path(), ".md");
    assert_eq!(markdown.len(), 1);
    assert!(markdown[0].to_string_lossy().ends_with("Published later--200.md"));
    assert!(fs::read_to_string(&markdown[0]).unwrap().contains("status: 2\n"));
}

#[tokio::test]
async fn drafts_are_exported_without_the_filter() {
    let server = MockServer::start().await;
    mount_kb(&server, "<p>Install steps</p>").await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;

    let report = exporter(&fetcher, &server, &converter, temp.path(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(report.exported, 2);
    assert_eq!(report.filtered, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(report.pdfs, 0);
    assert_eq!(report.processed(), 4);
    assert!(files_ending_with(temp.path(), ".pdf").is_empty());
}

#[tokio::test]
async fn missing_categories_abort_the_run() {
    let server = MockServer::start().await;
    json_route(&server, "/api/v2/solutions/categories", 200, json!([])).await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;

    let err = exporter(&fetcher, &server, &converter, temp.path(), true)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NoCategories));
}

#[tokio::test]
async fn failed_category_listing_aborts_the_run() {
    let server = MockServer::start().await;
    json_route(
        &server,
        "/api/v2/solutions/categories",
        401,
        json!({ "message": "unauthorized" }),
    )
    .await;
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default(), None).unwrap();
    let converter = Html2MdConverter;

    let err = exporter(&fetcher, &server, &converter, temp.path(), true)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Categories(_)));
}
