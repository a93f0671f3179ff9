use thiserror::Error;

use snapguard_crypto::CryptoError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("storage config error: {0}")]
    Config(String),
}

impl StoreError {
    /// Unwrap a `CryptoError` whether it was raised directly or through a codec reader.
    pub fn crypto(&self) -> Option<&CryptoError> {
        match self {
            StoreError::Crypto(e) => Some(e),
            StoreError::Io(e) => CryptoError::from_io(e),
            _ => None,
        }
    }
}

impl From<opendal::Error> for StoreError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}
