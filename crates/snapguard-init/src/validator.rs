//! Data directory validation

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Relative path of the database file inside a data directory
pub const DB_FILE: &str = "member/snap/db";

/// Relative path of the write-ahead log directory inside a data directory
pub const WAL_DIR: &str = "member/wal";

/// Outcome of checking the data directory, produced once per initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataDirStatus {
    Valid,
    Missing,
    Corrupt,
    /// The check itself failed; treated as unsafe to reuse.
    Unknown(String),
}

impl fmt::Display for DataDirStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDirStatus::Valid => f.write_str("valid"),
            DataDirStatus::Missing => f.write_str("missing"),
            DataDirStatus::Corrupt => f.write_str("corrupt"),
            DataDirStatus::Unknown(e) => write!(f, "unknown ({e})"),
        }
    }
}

/// Decides whether a data directory can be trusted.
pub trait Validator: Send + Sync {
    fn validate(&self) -> DataDirStatus;
}

/// Structural check: the directory exists and holds a non-empty database file.
///
/// Detects wiped or half-restored directories, not bit rot inside the
/// database; plug a deeper checker in through [`Validator`] for that.
#[derive(Debug, Clone)]
pub struct DataDirValidator {
    data_dir: PathBuf,
}

impl DataDirValidator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn check(&self) -> io::Result<DataDirStatus> {
        match std::fs::metadata(&self.data_dir) {
            Ok(meta) if !meta.is_dir() => return Ok(DataDirStatus::Corrupt),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DataDirStatus::Missing),
            Err(e) => return Err(e),
        }

        match std::fs::metadata(self.data_dir.join(DB_FILE)) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(DataDirStatus::Valid),
            Ok(_) => Ok(DataDirStatus::Corrupt),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DataDirStatus::Corrupt),
            Err(e) => Err(e),
        }
    }
}

impl Validator for DataDirValidator {
    fn validate(&self) -> DataDirStatus {
        let status = self
            .check()
            .unwrap_or_else(|e| DataDirStatus::Unknown(e.to_string()));
        debug!(data_dir = %self.data_dir.display(), status = %status, "data directory checked");
        status
    }
}
