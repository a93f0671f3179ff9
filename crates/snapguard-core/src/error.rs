use std::path::PathBuf;

use thiserror::Error;

pub type SnapguardResult<T> = Result<T, SnapguardError>;

#[derive(Debug, Error)]
pub enum SnapguardError {
    #[error("config error: {0}")]
    Config(String),

    #[error("reading config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid snapshot path {path:?}: {reason}")]
    InvalidSnapshot { path: String, reason: String },
}
