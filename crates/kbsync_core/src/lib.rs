//! kbsync core: pure domain types, settings validation and run accounting.
mod model;
mod reconcile;
mod report;
mod settings;

pub use model::{Article, ArticleStatus, Attachment, Category, Folder};
pub use reconcile::{decide, Reconcile};
pub use report::{ArticleOutcome, FailureReason, RunReport};
pub use settings::{
    ConverterKind, ExportSettings, SettingsError, DEFAULT_ATTACHMENT_PATTERNS, MAX_PAGE_SIZE,
};
