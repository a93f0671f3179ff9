use std::path::PathBuf;

use snapguard_storage::StoreError;
use thiserror::Error;

use crate::restorer::RestoreError;

/// Initializer failures, one variant per phase, each keeping its cause.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid storage configuration: {0}")]
    Config(#[source] StoreError),

    #[error("failed to delete the data directory {path}: {source}")]
    Wipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create snapstore from configured storage provider: {0}")]
    Backend(#[source] StoreError),

    #[error("failed to get latest snapshot: {0}")]
    Latest(#[source] StoreError),

    #[error("failed to restore snapshot {snapshot}: {source}")]
    Restore {
        snapshot: String,
        #[source]
        source: RestoreError,
    },
}

impl InitError {
    /// Short name of the phase that failed.
    pub fn phase(&self) -> &'static str {
        match self {
            InitError::Config(_) => "config",
            InitError::Wipe { .. } => "wipe",
            InitError::Backend(_) => "backend",
            InitError::Latest(_) => "latest",
            InitError::Restore { .. } => "restore",
        }
    }
}
