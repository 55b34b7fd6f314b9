use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tools::find_program;

/// PDF engines handed to pandoc, highest priority first.
pub const PDF_ENGINE_PRIORITY: [PdfEngine; 4] = [
    PdfEngine::Xelatex,
    PdfEngine::Pdflatex,
    PdfEngine::Wkhtmltopdf,
    PdfEngine::Weasyprint,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfEngine {
    Xelatex,
    Pdflatex,
    Wkhtmltopdf,
    Weasyprint,
}

impl PdfEngine {
    pub fn program(self) -> &'static str {
        match self {
            PdfEngine::Xelatex => "xelatex",
            PdfEngine::Pdflatex => "pdflatex",
            PdfEngine::Wkhtmltopdf => "wkhtmltopdf",
            PdfEngine::Weasyprint => "weasyprint",
        }
    }
}

/// First engine in [`PDF_ENGINE_PRIORITY`] for which `is_available` holds.
pub fn select_pdf_engine(is_available: impl Fn(&str) -> bool) -> Option<PdfEngine> {
    PDF_ENGINE_PRIORITY
        .into_iter()
        .find(|engine| is_available(engine.program()))
}

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("could not prepare pdf output {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pdf renderer failed for {}: {message}", path.display())]
    Render { path: PathBuf, message: String },
}

/// Markdown file to PDF file.
#[async_trait::async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, markdown: &Path, pdf: &Path) -> Result<(), PdfError>;
}

#[derive(Debug, Clone)]
pub struct PandocPdfRenderer {
    pandoc: PathBuf,
    engine: PdfEngine,
}

impl PandocPdfRenderer {
    pub fn new(pandoc: PathBuf, engine: PdfEngine) -> Self {
        Self { pandoc, engine }
    }

    /// Look for pandoc and an engine once. `None` disables PDF output for the run.
    pub fn detect() -> Option<Self> {
        let pandoc = find_program("pandoc")?;
        let engine = select_pdf_engine(|program| find_program(program).is_some())?;
        Some(Self::new(pandoc, engine))
    }

    pub fn engine(&self) -> PdfEngine {
        self.engine
    }
}

#[async_trait::async_trait]
impl PdfRenderer for PandocPdfRenderer {
    async fn render(&self, markdown: &Path, pdf: &Path) -> Result<(), PdfError> {
        let dir = pdf.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source| PdfError::Io {
            path: pdf.to_path_buf(),
            source,
        };
        let staging = tempfile::Builder::new()
            .prefix(".kbsync-")
            .suffix(".pdf")
            .tempfile_in(dir)
            .map_err(io_err)?;

        let output = tokio::process::Command::new(&self.pandoc)
            .arg(markdown)
            .arg("--from=gfm+yaml_metadata_block")
            .arg(format!("--pdf-engine={}", self.engine.program()))
            .arg(format!("--resource-path={}", dir.display()))
            .arg("-o")
            .arg(staging.path())
            .output()
            .await
            .map_err(io_err)?;

        if !output.status.success() {
            return Err(PdfError::Render {
                path: pdf.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        staging
            .persist(pdf)
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }
}
