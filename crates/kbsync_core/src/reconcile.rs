/// Persistence decision for one freshly rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// No artifact exists yet at the destination.
    Write,
    /// The destination already holds identical bytes.
    Skip,
    /// The destination holds different bytes that must be backed up first.
    WriteWithBackup,
}

impl Reconcile {
    pub fn writes(self) -> bool {
        !matches!(self, Reconcile::Skip)
    }
}

/// Compare the digest of staged content with the digest of the existing file
/// (if any). A superseded file is only backed up when `backup_on_change` is set.
pub fn decide<H: PartialEq>(staged: &H, existing: Option<&H>, backup_on_change: bool) -> Reconcile {
    match existing {
        None => Reconcile::Write,
        Some(existing) if existing == staged => Reconcile::Skip,
        Some(_) if backup_on_change => Reconcile::WriteWithBackup,
        Some(_) => Reconcile::Write,
    }
}
