//! Key derivation: master secret + snapshot name → 256-bit snapshot key

use hkdf::Hkdf;
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::secret::{DerivedKey, MasterSecret};
use crate::KEY_SIZE;

/// Derive the key for one snapshot via HKDF-SHA256.
///
/// The master secret is the input keying material and the snapshot
/// identifier is the salt; no info string. Deterministic for a given
/// (secret, identifier) pair, which is what makes save → fetch round-trip.
pub fn derive_snapshot_key(
    secret: &MasterSecret,
    identifier: &[u8],
) -> Result<DerivedKey, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(identifier), secret.expose_secret());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&[], &mut okm)
        .map_err(|e| CryptoError::Derivation(format!("HKDF expand: {e}")))?;
    Ok(DerivedKey::from_bytes(okm))
}
