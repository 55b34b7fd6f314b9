//! kbsync engine: remote fetching, asset pipeline, rendering and incremental persistence.
mod api;
mod assets;
mod convert;
mod fetch;
mod filename;
mod frontmatter;
mod paginate;
mod pdf;
mod persist;
mod reconcile;
mod tools;
mod types;
mod walker;

pub use api::HelpdeskApi;
pub use assets::{
    asset_filename, collect_candidates, is_downloadable, rewrite_src_attributes, AssetCandidate,
    AssetError, AssetPipeline, AttachmentSummary, RewriteOutput, ASSETS_DIR, ASSET_SOURCES_FILE,
    IMAGE_EXTENSIONS,
};
pub use convert::{ConversionOutput, Converter, Html2MdConverter, PandocConverter};
pub use fetch::{ApiCredentials, FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::{article_filename, directory_name, sanitize_asset_filename};
pub use frontmatter::{build_markdown_document, SOURCE_MARKER};
pub use paginate::{fetch_all, PageSettings};
pub use pdf::{
    select_pdf_engine, PandocPdfRenderer, PdfEngine, PdfError, PdfRenderer, PDF_ENGINE_PRIORITY,
};
pub use persist::{ensure_output_dir, ensure_writable_dir, stage_in, AtomicFileWriter, PersistError};
pub use reconcile::{
    backup_path, backup_stamp, backup_superseded, content_digest, file_digest, reconcile,
    ContentDigest, ReconcileError, ReconcileOutcome, StagedDocument,
};
pub use tools::find_program;
pub use types::{FailureKind, FetchError};
pub use walker::{ExportError, Exporter, WalkerOptions};
