use std::path::{Path, PathBuf};
use std::time::Duration;

use export_logging::{export_debug, export_error, export_info, export_warn};
use kbsync_core::{
    Article, ArticleOutcome, ArticleStatus, Category, FailureReason, Folder, Reconcile, RunReport,
};
use thiserror::Error;

use crate::api::HelpdeskApi;
use crate::assets::{AssetPipeline, ASSETS_DIR};
use crate::convert::Converter;
use crate::filename::{article_filename, directory_name};
use crate::frontmatter::build_markdown_document;
use crate::pdf::PdfRenderer;
use crate::persist::{ensure_writable_dir, PersistError};
use crate::reconcile::reconcile;
use crate::FetchError;

#[derive(Debug, Clone)]
pub struct WalkerOptions {
    pub output_root: PathBuf,
    pub published_only: bool,
    pub backup_on_change: bool,
    /// Pause after each processed article.
    pub article_delay: Duration,
}

/// Errors that stop a run before any article is processed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("output root {} is unusable: {source}", path.display())]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("could not list categories: {0}")]
    Categories(#[source] FetchError),
    #[error("the helpdesk returned no categories")]
    NoCategories,
}

/// Sequential category → folder → article export.
pub struct Exporter<'a> {
    api: HelpdeskApi<'a>,
    assets: AssetPipeline<'a>,
    converter: &'a dyn Converter,
    pdf: Option<&'a dyn PdfRenderer>,
    options: WalkerOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(
        api: HelpdeskApi<'a>,
        assets: AssetPipeline<'a>,
        converter: &'a dyn Converter,
        options: WalkerOptions,
    ) -> Self {
        Self {
            api,
            assets,
            converter,
            pdf: None,
            options,
        }
    }

    pub fn with_pdf(mut self, renderer: &'a dyn PdfRenderer) -> Self {
        self.pdf = Some(renderer);
        self
    }

    /// Export the whole knowledge base. Only the root listing can fail the
    /// run; every later failure is logged and counted in the report.
    pub async fn run(&self) -> Result<RunReport, ExportError> {
        let root = &self.options.output_root;
        ensure_writable_dir(root).map_err(|source| ExportError::OutputRoot {
            path: root.clone(),
            source,
        })?;

        let categories = self
            .api
            .categories()
            .await
            .map_err(ExportError::Categories)?;
        if categories.is_empty() {
            return Err(ExportError::NoCategories);
        }
        export_info!("Found {} categories", categories.len());

        let mut report = RunReport::new();
        for category in &categories {
            self.export_category(category, &mut report).await;
        }
        Ok(report)
    }

    async fn export_category(&self, category: &Category, report: &mut RunReport) {
        let dir = self
            .options
            .output_root
            .join(directory_name(&category.name, "category", category.id));

        let folders = match self.api.folders(category.id).await {
            Ok(folders) => folders,
            Err(err) => {
                export_error!(
                    "Category {} ({}): folder listing failed, skipping category: {}",
                    category.name,
                    category.id,
                    err
                );
                report.record_listing_failure();
                return;
            }
        };
        export_info!(
            "Category {} ({}): {} folders",
            category.name,
            category.id,
            folders.len()
        );

        for folder in &folders {
            self.export_folder(&dir, folder, report).await;
        }
    }

    async fn export_folder(&self, category_dir: &Path, folder: &Folder, report: &mut RunReport) {
        let dir = category_dir.join(directory_name(&folder.name, "folder", folder.id));

        let articles = match self.api.articles(folder.id).await {
            Ok(articles) => articles,
            Err(err) => {
                export_error!(
                    "Folder {} ({}): article listing failed, skipping folder: {}",
                    folder.name,
                    folder.id,
                    err
                );
                report.record_listing_failure();
                return;
            }
        };
        export_info!(
            "Folder {} ({}): {} articles",
            folder.name,
            folder.id,
            articles.len()
        );

        for summary in &articles {
            // Listings without a status defer the decision to the detail.
            if let Some(status) = summary.status {
                if self.options.published_only && !status.is_published() {
                    export_debug!(
                        "Article {} is not published (status {}), skipped",
                        summary.id,
                        status.code()
                    );
                    report.record(ArticleOutcome::Filtered);
                    continue;
                }
            }

            let outcome = self.export_article(&dir, summary, report).await;
            report.record(outcome);

            if !self.options.article_delay.is_zero() {
                tokio::time::sleep(self.options.article_delay).await;
            }
        }
    }

    async fn export_article(
        &self,
        folder_dir: &Path,
        summary: &Article,
        report: &mut RunReport,
    ) -> ArticleOutcome {
        let mut article = match self.api.article(summary.id).await {
            Ok(article) => article,
            Err(err) => {
                export_warn!("Article {}: detail fetch failed: {}", summary.id, err);
                return ArticleOutcome::Failed(FailureReason::DetailFetch);
            }
        };
        if article.folder_id == 0 {
            article.folder_id = summary.folder_id;
        }
        if article.title.trim().is_empty() {
            article.title = summary.title.clone();
        }
        article.status = article.status.or(summary.status);
        if self.options.published_only && !article.status.is_some_and(ArticleStatus::is_published) {
            export_debug!("Article {} is not published, skipped", article.id);
            return ArticleOutcome::Filtered;
        }

        let Some(body) = article.body() else {
            export_warn!("Article {} ({}): empty body, skipped", article.id, article.title);
            return ArticleOutcome::Failed(FailureReason::EmptyBody);
        };

        let assets_dir = folder_dir.join(ASSETS_DIR);
        let rewritten = self.assets.rewrite(article.id, body, &assets_dir).await;
        report.record_assets(rewritten.downloaded, rewritten.failed);

        let converted = self.converter.to_markdown(&rewritten.html).await;
        for warning in &converted.warnings {
            export_warn!("Article {}: {}", article.id, warning);
        }

        let document = build_markdown_document(&article, &converted.markdown);
        let md_path = folder_dir.join(article_filename(&article.title, article.id));
        let pdf_path = md_path.with_extension("pdf");

        let outcome = match reconcile(
            &md_path,
            document.as_bytes(),
            self.options.backup_on_change,
            std::slice::from_ref(&pdf_path),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                export_warn!("Article {}: {}", article.id, err);
                return ArticleOutcome::Failed(FailureReason::Persist);
            }
        };

        match outcome.decision {
            Reconcile::Skip => {
                export_debug!("Unchanged: {}", md_path.display());
                return ArticleOutcome::Unchanged;
            }
            Reconcile::Write => export_info!("Written: {}", md_path.display()),
            Reconcile::WriteWithBackup => {
                for backup in &outcome.backups {
                    export_info!("Backed up: {}", backup.display());
                }
                export_info!("Updated: {}", md_path.display());
            }
        }

        let attachments = self.assets.download_attachments(&article, &assets_dir).await;
        report.record_assets(attachments.downloaded, attachments.failed);

        if let Some(renderer) = self.pdf {
            match renderer.render(&md_path, &pdf_path).await {
                Ok(()) => {
                    export_debug!("PDF: {}", pdf_path.display());
                    report.record_pdf(true);
                }
                Err(err) => {
                    export_warn!("Article {}: {}", article.id, err);
                    report.record_pdf(false);
                }
            }
        }

        ArticleOutcome::Written {
            backed_up: !outcome.backups.is_empty(),
        }
    }
}
