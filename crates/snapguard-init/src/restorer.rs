//! Rebuilding a data directory from a stored snapshot

use std::io;
use std::path::PathBuf;

use snapguard_core::Snapshot;
use snapguard_storage::{SnapStore, StoreError};
use thiserror::Error;
use tracing::info;

use crate::validator::{DB_FILE, WAL_DIR};

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("writing restored data: {0}")]
    Io(#[from] io::Error),
}

/// What to restore and where.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub data_dir: PathBuf,
    pub snapshot: Snapshot,
}

/// Applies a snapshot to an (empty) data directory.
pub trait Restorer: Send + Sync {
    fn restore(&self, store: &dyn SnapStore, options: &RestoreOptions) -> Result<(), RestoreError>;
}

/// Copies the snapshot payload into `<data_dir>/member/snap/db`.
///
/// The payload is streamed into a temp file next to the destination and only
/// renamed into place once fully read (and, when encrypted, fully verified),
/// so an interrupted restore never leaves a plausible-looking database behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRestorer;

impl Restorer for FileRestorer {
    fn restore(&self, store: &dyn SnapStore, options: &RestoreOptions) -> Result<(), RestoreError> {
        let db_path = options.data_dir.join(DB_FILE);
        let snap_dir = db_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| options.data_dir.clone());
        std::fs::create_dir_all(&snap_dir)?;
        std::fs::create_dir_all(options.data_dir.join(WAL_DIR))?;

        let mut reader = store.fetch(&options.snapshot)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".restore-")
            .tempfile_in(&snap_dir)?;
        let bytes = io::copy(&mut reader, tmp.as_file_mut())?;
        drop(reader);
        tmp.as_file().sync_all()?;
        tmp.persist(&db_path).map_err(|e| RestoreError::Io(e.error))?;

        info!(
            snapshot = %options.snapshot.snap_name,
            bytes,
            db = %db_path.display(),
            "snapshot applied"
        );
        Ok(())
    }
}
