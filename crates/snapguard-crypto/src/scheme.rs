//! Scheme selection: which at-rest format a deployment reads and writes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use crate::error::CryptoError;
use crate::kdf::derive_snapshot_key;
use crate::legacy::LegacyCipherReader;
use crate::sealed::{OpeningReader, SealingReader};
use crate::secret::MasterSecret;

/// At-rest format, fixed per deployment by configuration.
///
/// Stored objects carry no scheme tag, so the scheme is never inferred from
/// the bytes: reading with the wrong scheme yields an authentication failure
/// (sealed) or garbage (legacy).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherScheme {
    /// Chunked XChaCha20-Poly1305 with per-snapshot HKDF keys
    #[default]
    Sealed,
    /// AES-256-OFB without integrity, for pre-existing backups
    Legacy,
}

impl CipherScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherScheme::Sealed => "sealed",
            CipherScheme::Legacy => "legacy",
        }
    }

    /// Wrap a plaintext reader so that reading it yields ciphertext.
    pub fn encrypting<R: Read>(
        &self,
        plaintext: R,
        secret: &MasterSecret,
        identifier: &[u8],
    ) -> Result<CipherReader<R>, CryptoError> {
        match self {
            CipherScheme::Sealed => {
                let key = derive_snapshot_key(secret, identifier)?;
                Ok(CipherReader::Seal(SealingReader::new(plaintext, &key)))
            }
            CipherScheme::Legacy => Ok(CipherReader::Legacy(LegacyCipherReader::new(
                plaintext, secret, identifier,
            )?)),
        }
    }

    /// Wrap a ciphertext reader so that reading it yields plaintext.
    pub fn decrypting<R: Read>(
        &self,
        ciphertext: R,
        secret: &MasterSecret,
        identifier: &[u8],
    ) -> Result<CipherReader<R>, CryptoError> {
        match self {
            CipherScheme::Sealed => {
                let key = derive_snapshot_key(secret, identifier)?;
                Ok(CipherReader::Open(OpeningReader::new(ciphertext, &key)))
            }
            CipherScheme::Legacy => Ok(CipherReader::Legacy(LegacyCipherReader::new(
                ciphertext, secret, identifier,
            )?)),
        }
    }
}

impl fmt::Display for CipherScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "sealed" => Ok(CipherScheme::Sealed),
            "legacy" => Ok(CipherScheme::Legacy),
            other => Err(CryptoError::Config(format!(
                "unknown encryption scheme: {other}"
            ))),
        }
    }
}

/// One direction of one codec, wrapping (and owning) the source reader.
pub enum CipherReader<R> {
    Legacy(LegacyCipherReader<R>),
    Seal(SealingReader<R>),
    Open(OpeningReader<R>),
}

impl<R: Read> CipherReader<R> {
    pub fn into_inner(self) -> R {
        match self {
            CipherReader::Legacy(r) => r.into_inner(),
            CipherReader::Seal(r) => r.into_inner(),
            CipherReader::Open(r) => r.into_inner(),
        }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CipherReader::Legacy(r) => r.read(buf),
            CipherReader::Seal(r) => r.read(buf),
            CipherReader::Open(r) => r.read(buf),
        }
    }
}
