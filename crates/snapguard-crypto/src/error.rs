use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The KDF could not produce a full key
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// Tag mismatch, truncation, or a malformed sealed header
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Cipher construction or sealing failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Unknown scheme name or other unusable encryption settings
    #[error("invalid encryption configuration: {0}")]
    Config(String),
}

impl CryptoError {
    /// Recover a `CryptoError` carried inside an `io::Error` raised by a codec reader.
    pub fn from_io(err: &io::Error) -> Option<&CryptoError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<CryptoError>())
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, CryptoError::Authentication(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, CryptoError::Config(_))
    }
}

impl From<CryptoError> for io::Error {
    fn from(err: CryptoError) -> Self {
        let kind = match err {
            CryptoError::Authentication(_) => io::ErrorKind::InvalidData,
            CryptoError::Config(_) => io::ErrorKind::InvalidInput,
            CryptoError::Derivation(_) | CryptoError::Encryption(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
