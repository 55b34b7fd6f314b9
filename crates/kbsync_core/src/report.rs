use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    DetailFetch,
    EmptyBody,
    Persist,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::DetailFetch => write!(f, "article detail could not be fetched"),
            FailureReason::EmptyBody => write!(f, "article body is empty"),
            FailureReason::Persist => write!(f, "article could not be written"),
        }
    }
}

/// What happened to a single article during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOutcome {
    Written { backed_up: bool },
    Unchanged,
    /// Dropped by the published-only filter. Neither an export nor a failure.
    Filtered,
    Failed(FailureReason),
}

/// Counters for one export run.
///
/// The walker owns a single report and records each side effect after it
/// has succeeded; nothing is ever rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub exported: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub filtered: usize,
    pub backups: usize,
    pub pdfs: usize,
    pub pdf_failures: usize,
    pub assets_downloaded: usize,
    pub asset_failures: usize,
    pub listing_failures: usize,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ArticleOutcome) {
        match outcome {
            ArticleOutcome::Written { backed_up } => {
                self.exported += 1;
                if backed_up {
                    self.backups += 1;
                }
            }
            ArticleOutcome::Unchanged => self.unchanged += 1,
            ArticleOutcome::Filtered => self.filtered += 1,
            ArticleOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn record_pdf(&mut self, rendered: bool) {
        if rendered {
            self.pdfs += 1;
        } else {
            self.pdf_failures += 1;
        }
    }

    pub fn record_assets(&mut self, downloaded: usize, failed: usize) {
        self.assets_downloaded += downloaded;
        self.asset_failures += failed;
    }

    pub fn record_listing_failure(&mut self) {
        self.listing_failures += 1;
    }

    /// Articles that reached a terminal state other than filtering.
    pub fn processed(&self) -> usize {
        self.exported + self.unchanged + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.listing_failures > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "exported:          {}", self.exported)?;
        writeln!(f, "unchanged:         {}", self.unchanged)?;
        writeln!(f, "failed:            {}", self.failed)?;
        writeln!(f, "drafts filtered:   {}", self.filtered)?;
        writeln!(f, "backups:           {}", self.backups)?;
        writeln!(f, "pdfs:              {}", self.pdfs)?;
        writeln!(f, "pdf failures:      {}", self.pdf_failures)?;
        writeln!(f, "assets downloaded: {}", self.assets_downloaded)?;
        writeln!(f, "asset failures:    {}", self.asset_failures)?;
        write!(f, "listing failures:  {}", self.listing_failures)
    }
}
