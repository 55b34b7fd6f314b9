//! Staging, hash comparison and backup of superseded artifacts.
//!
//! Every rendered document is first written to a temp file in its destination
//! directory. The staged bytes are compared by SHA-256 against the file already
//! at the destination, and only then is the temp file either discarded or
//! renamed over the destination, so a half-written file is never visible.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use kbsync_core::{decide, Reconcile};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::persist::{stage_in, PersistError};

pub type ContentDigest = [u8; 32];

const MAX_BACKUP_SUFFIX: u32 = 1_000;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("could not stage {}: {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("could not read existing {}: {source}", path.display())]
    ReadExisting {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not replace {}: {source}", path.display())]
    Replace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub decision: Reconcile,
    /// Backup files created by this commit, Markdown first.
    pub backups: Vec<PathBuf>,
}

/// Freshly rendered content waiting for its reconcile decision.
#[derive(Debug)]
pub struct StagedDocument {
    dest: PathBuf,
    tmp: NamedTempFile,
    digest: ContentDigest,
}

impl StagedDocument {
    pub fn stage(dest: &Path, content: &[u8]) -> Result<Self, ReconcileError> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let tmp = stage_in(dir, content).map_err(|source| ReconcileError::Stage {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
            digest: content_digest(content),
        })
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn decide(&self, backup_on_change: bool) -> Result<Reconcile, ReconcileError> {
        let existing = match file_digest(&self.dest) {
            Ok(digest) => Some(digest),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ReconcileError::ReadExisting {
                    path: self.dest.clone(),
                    source,
                })
            }
        };
        Ok(decide(&self.digest, existing.as_ref(), backup_on_change))
    }

    /// Apply `decision`. `companions` are co-located artifacts (the PDF) that
    /// are backed up together with the destination when it is superseded.
    pub fn commit(
        self,
        decision: Reconcile,
        companions: &[PathBuf],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let backups = match decision {
            // Dropping the temp file deletes it.
            Reconcile::Skip => Vec::new(),
            Reconcile::Write => Vec::new(),
            Reconcile::WriteWithBackup => backup_superseded(&self.dest, companions)?,
        };
        if decision.writes() {
            self.tmp
                .persist(&self.dest)
                .map_err(|err| ReconcileError::Replace {
                    path: self.dest.clone(),
                    source: err.error,
                })?;
        }
        Ok(ReconcileOutcome { decision, backups })
    }
}

/// Stage `content`, decide against the file at `dest`, and apply the decision.
pub fn reconcile(
    dest: &Path,
    content: &[u8],
    backup_on_change: bool,
    companions: &[PathBuf],
) -> Result<ReconcileOutcome, ReconcileError> {
    let staged = StagedDocument::stage(dest, content)?;
    let decision = staged.decide(backup_on_change)?;
    staged.commit(decision, companions)
}

pub fn content_digest(content: &[u8]) -> ContentDigest {
    Sha256::digest(content).into()
}

pub fn file_digest(path: &Path) -> io::Result<ContentDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// `YYYYMMDD-HHMMSS` in local time.
pub fn backup_stamp(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified)
        .format("%Y%m%d-%H%M%S")
        .to_string()
}

/// `<stem>.<stamp>.bak.<ext>` next to `path`.
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{stamp}.bak.{}", ext.to_string_lossy()),
        None => format!("{stem}.{stamp}.bak"),
    };
    path.with_file_name(name)
}

/// Copy `path` and every existing companion to backup names derived from the
/// last-modified time of `path`.
///
/// When a backup with that stamp already exists with other content, a numeric
/// suffix (`-1`, `-2`, ...) is appended to the stamp. An existing backup with
/// identical content is reused instead of copied again.
pub fn backup_superseded(
    path: &Path,
    companions: &[PathBuf],
) -> Result<Vec<PathBuf>, ReconcileError> {
    let backup_err = |source: io::Error| ReconcileError::Backup {
        path: path.to_path_buf(),
        source,
    };

    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(backup_err)?;
    let stamp = free_stamp(path, &backup_stamp(modified)).map_err(backup_err)?;

    let mut created = Vec::new();
    let sources = std::iter::once(path).chain(
        companions
            .iter()
            .map(PathBuf::as_path)
            .filter(|companion| companion.is_file()),
    );
    for source in sources {
        let target = backup_path(source, &stamp);
        if target.exists() {
            continue;
        }
        fs::copy(source, &target).map_err(|source_err| ReconcileError::Backup {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        created.push(target);
    }
    Ok(created)
}

fn free_stamp(path: &Path, base: &str) -> io::Result<String> {
    let current = file_digest(path)?;
    for attempt in 0..=MAX_BACKUP_SUFFIX {
        let stamp = if attempt == 0 {
            base.to_string()
        } else {
            format!("{base}-{attempt}")
        };
        let candidate = backup_path(path, &stamp);
        if !candidate.exists() || file_digest(&candidate)? == current {
            return Ok(stamp);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup name for {}", path.display()),
    ))
}
