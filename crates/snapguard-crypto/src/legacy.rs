//! Legacy at-rest format: AES-256 in OFB mode, XORed byte-for-byte
//!
//! ```text
//! key = SHA-256(master secret)
//! IV  = SHA-1(snapshot name)[..16]
//! ciphertext = plaintext XOR keystream      (same length, no header, no tag)
//! ```
//!
//! Kept only so snapshots written by older deployments stay readable. There is
//! no integrity check: a flipped ciphertext bit flips the same plaintext bit.
//! The IV depends only on the snapshot name, so re-saving under an existing
//! name reuses the keystream.

use std::io::{self, Read};

use aes::Aes256;
use ofb::cipher::{KeyIvInit, StreamCipher};
use secrecy::ExposeSecret;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::secret::MasterSecret;

type Aes256Ofb = ofb::Ofb<Aes256>;

/// AES block size; the IV is the SHA-1 digest truncated to this.
const BLOCK_SIZE: usize = 16;

/// Applies the OFB keystream to every byte read from `inner`.
///
/// XOR is self-inverse, so the same reader both encrypts and decrypts.
pub struct LegacyCipherReader<R> {
    cipher: Aes256Ofb,
    inner: R,
}

impl<R: Read> LegacyCipherReader<R> {
    pub fn new(inner: R, secret: &MasterSecret, identifier: &[u8]) -> Result<Self, CryptoError> {
        let mut key: [u8; 32] = Sha256::digest(secret.expose_secret()).into();
        let iv = Sha1::digest(identifier);

        let cipher = Aes256Ofb::new_from_slices(&key, &iv[..BLOCK_SIZE])
            .map_err(|e| CryptoError::Encryption(format!("AES-OFB setup: {e}")));
        key.zeroize();

        Ok(Self {
            cipher: cipher?,
            inner,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for LegacyCipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}
