//! Secret material: the process-wide master secret and per-snapshot keys

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretBox, SecretSlice};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The deployment's master secret.
///
/// Immutable after load and cheap to clone (shared, not copied). Absence of a
/// master secret is modelled as `Option<MasterSecret>` by callers: `None`
/// disables at-rest encryption.
#[derive(Clone, Debug)]
pub struct MasterSecret {
    bytes: Arc<SecretSlice<u8>>,
}

impl MasterSecret {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(SecretBox::new(bytes.into().into_boxed_slice())),
        }
    }

    /// Read the secret from an environment variable.
    ///
    /// Returns `None` when the variable is unset or empty, i.e. encryption
    /// disabled. Non-UTF-8 values are taken byte-for-byte on unix.
    pub fn from_env(var: &str) -> Option<Self> {
        let value = std::env::var_os(var)?;
        if value.is_empty() {
            return None;
        }
        #[cfg(unix)]
        let bytes = {
            use std::os::unix::ffi::OsStringExt;
            value.into_vec()
        };
        #[cfg(not(unix))]
        let bytes = value.to_string_lossy().into_owned().into_bytes();
        Some(Self::from_bytes(bytes))
    }
}

impl ExposeSecret<[u8]> for MasterSecret {
    fn expose_secret(&self) -> &[u8] {
        self.bytes.expose_secret()
    }
}

/// A 256-bit key scoped to a single fetch or save. Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
