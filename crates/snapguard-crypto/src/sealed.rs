//! Sealed at-rest format: chunked XChaCha20-Poly1305 (STREAM construction)
//!
//! Encrypted object format (binary):
//! ```text
//! [1 byte: version = 1][19 bytes: random stream nonce]
//! [packet 0: 65536 bytes ciphertext][16 bytes tag]
//! [packet 1: ...]
//! [last packet: 0..=65536 bytes ciphertext][16 bytes tag]
//! ```
//!
//! Each packet nonce is `stream nonce || counter (u32 BE) || last flag`, so a
//! packet only opens at its own position and the final packet only opens as
//! the final packet. Reordering, dropping or truncating packets therefore
//! fails authentication. The last packet is always present (an empty
//! plaintext still produces one 16-byte packet).

use std::io::{self, Read};

use chacha20poly1305::{
    aead::{
        generic_array::GenericArray,
        stream::{DecryptorBE32, EncryptorBE32},
        KeyInit,
    },
    XChaCha20Poly1305,
};
use rand::RngCore;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::secret::DerivedKey;
use crate::TAG_SIZE;

/// Format version written in the first header byte
pub const FORMAT_VERSION: u8 = 1;

/// XChaCha20 nonce (24) minus the STREAM overhead (4-byte counter + flag)
pub const STREAM_NONCE_SIZE: usize = 19;

/// Header length: version byte + stream nonce
pub const HEADER_SIZE: usize = 1 + STREAM_NONCE_SIZE;

/// Plaintext bytes per packet
pub const PACKET_SIZE: usize = 64 * 1024;

/// Ciphertext bytes per full packet
pub const SEALED_PACKET_SIZE: usize = PACKET_SIZE + TAG_SIZE;

/// Read from `inner` until `buf` holds `target` bytes or the reader is exhausted.
///
/// Short reads are normal; only real I/O errors are returned.
fn fill_to<R: Read>(inner: &mut R, buf: &mut Vec<u8>, target: usize) -> io::Result<()> {
    while buf.len() < target {
        let start = buf.len();
        buf.resize(target, 0);
        match inner.read(&mut buf[start..]) {
            Ok(0) => {
                buf.truncate(start);
                return Ok(());
            }
            Ok(n) => buf.truncate(start + n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => buf.truncate(start),
            Err(e) => {
                buf.truncate(start);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Drain as much of `pending[*pos..]` into `buf` as fits.
fn drain_into(pending: &[u8], pos: &mut usize, buf: &mut [u8]) -> usize {
    let n = buf.len().min(pending.len() - *pos);
    buf[..n].copy_from_slice(&pending[*pos..*pos + n]);
    *pos += n;
    n
}

/// Encrypting reader: pulls plaintext from `inner`, yields the sealed format.
pub struct SealingReader<R> {
    encryptor: Option<EncryptorBE32<XChaCha20Poly1305>>,
    plain: Zeroizing<Vec<u8>>,
    out: Vec<u8>,
    out_pos: usize,
    finished: bool,
    inner: R,
}

impl<R: Read> SealingReader<R> {
    /// Start a sealed stream with a fresh random stream nonce.
    pub fn new(inner: R, key: &DerivedKey) -> Self {
        let mut nonce = [0u8; STREAM_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(inner, key, nonce)
    }

    fn with_nonce(inner: R, key: &DerivedKey, nonce: [u8; STREAM_NONCE_SIZE]) -> Self {
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let encryptor = EncryptorBE32::from_aead(cipher, GenericArray::from_slice(&nonce));

        let mut out = Vec::with_capacity(SEALED_PACKET_SIZE);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce);

        Self {
            encryptor: Some(encryptor),
            plain: Zeroizing::new(Vec::with_capacity(PACKET_SIZE + 1)),
            out,
            out_pos: 0,
            finished: false,
            inner,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Seal the next packet into `out`.
    fn seal_packet(&mut self) -> io::Result<()> {
        // One byte of lookahead tells a full middle packet from the last one.
        fill_to(&mut self.inner, &mut self.plain, PACKET_SIZE + 1)?;

        let sealed = if self.plain.len() > PACKET_SIZE {
            let encryptor = self.encryptor.as_mut().ok_or_else(|| {
                CryptoError::Encryption("stream already finalized".into())
            })?;
            let sealed = encryptor
                .encrypt_next(&self.plain[..PACKET_SIZE])
                .map_err(|e| CryptoError::Encryption(format!("sealing packet: {e}")))?;
            self.plain.drain(..PACKET_SIZE);
            sealed
        } else {
            let encryptor = self.encryptor.take().ok_or_else(|| {
                CryptoError::Encryption("stream already finalized".into())
            })?;
            let sealed = encryptor
                .encrypt_last(self.plain.as_slice())
                .map_err(|e| CryptoError::Encryption(format!("sealing last packet: {e}")))?;
            self.plain.zeroize();
            self.finished = true;
            sealed
        };

        self.out.clear();
        self.out.extend_from_slice(&sealed);
        self.out_pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for SealingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.out_pos < self.out.len() {
                return Ok(drain_into(&self.out, &mut self.out_pos, buf));
            }
            if self.finished {
                return Ok(0);
            }
            self.seal_packet()?;
        }
    }
}

/// Decrypting reader: pulls the sealed format from `inner`, yields verified plaintext.
///
/// Plaintext is released one packet at a time and only after that packet's
/// tag verified. Once a packet fails, every further read fails too.
pub struct OpeningReader<R> {
    cipher: Option<XChaCha20Poly1305>,
    decryptor: Option<DecryptorBE32<XChaCha20Poly1305>>,
    sealed: Vec<u8>,
    out: Zeroizing<Vec<u8>>,
    out_pos: usize,
    finished: bool,
    failed: Option<String>,
    inner: R,
}

impl<R: Read> OpeningReader<R> {
    /// The header is read lazily on the first `read`.
    pub fn new(inner: R, key: &DerivedKey) -> Self {
        Self {
            cipher: Some(XChaCha20Poly1305::new(key.as_bytes().into())),
            decryptor: None,
            sealed: Vec::with_capacity(SEALED_PACKET_SIZE + 1),
            out: Zeroizing::new(Vec::new()),
            out_pos: 0,
            finished: false,
            failed: None,
            inner,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fail(&mut self, reason: String) -> io::Error {
        debug!(reason = %reason, "sealed stream rejected");
        self.out.zeroize();
        self.out_pos = 0;
        self.failed = Some(reason.clone());
        CryptoError::Authentication(reason).into()
    }

    /// Read the header once. Partial header bytes survive a backend error,
    /// so a retried read resumes where the failed one stopped.
    fn read_header(&mut self) -> io::Result<()> {
        if self.cipher.is_none() {
            return Ok(());
        }

        fill_to(&mut self.inner, &mut self.sealed, HEADER_SIZE)?;
        if self.sealed.len() < HEADER_SIZE {
            return Err(self.fail(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                self.sealed.len()
            )));
        }
        if self.sealed[0] != FORMAT_VERSION {
            return Err(self.fail(format!("unknown format version {}", self.sealed[0])));
        }

        let Some(cipher) = self.cipher.take() else {
            return Ok(());
        };
        let header: Vec<u8> = self.sealed.drain(..HEADER_SIZE).collect();
        self.decryptor = Some(DecryptorBE32::from_aead(
            cipher,
            GenericArray::from_slice(&header[1..]),
        ));
        Ok(())
    }

    /// Open the next packet into `out`.
    fn open_packet(&mut self) -> io::Result<()> {
        self.read_header()?;
        fill_to(&mut self.inner, &mut self.sealed, SEALED_PACKET_SIZE + 1)?;

        let opened = if self.sealed.len() > SEALED_PACKET_SIZE {
            let Some(decryptor) = self.decryptor.as_mut() else {
                return Err(self.fail("stream already finalized".into()));
            };
            match decryptor.decrypt_next(&self.sealed[..SEALED_PACKET_SIZE]) {
                Ok(plain) => {
                    self.sealed.drain(..SEALED_PACKET_SIZE);
                    plain
                }
                Err(_) => return Err(self.fail("packet tag mismatch".into())),
            }
        } else {
            let Some(decryptor) = self.decryptor.take() else {
                return Err(self.fail("stream already finalized".into()));
            };
            if self.sealed.len() < TAG_SIZE {
                return Err(self.fail(format!(
                    "truncated stream: final packet is {} bytes",
                    self.sealed.len()
                )));
            }
            match decryptor.decrypt_last(self.sealed.as_slice()) {
                Ok(plain) => {
                    self.sealed.clear();
                    self.finished = true;
                    plain
                }
                Err(_) => {
                    return Err(self.fail("final packet tag mismatch or truncated stream".into()))
                }
            }
        };

        self.out = Zeroizing::new(opened);
        self.out_pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for OpeningReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(reason) = &self.failed {
                return Err(CryptoError::Authentication(reason.clone()).into());
            }
            if self.out_pos < self.out.len() {
                return Ok(drain_into(&self.out, &mut self.out_pos, buf));
            }
            if self.finished {
                return Ok(0);
            }
            self.open_packet()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_snapshot_key;
    use crate::secret::MasterSecret;
    use std::io::Cursor;

    /// Encrypted size of a `plaintext_len`-byte payload. A full final packet
    /// carries the last flag itself, so an exact multiple adds no empty packet.
    fn sealed_len(plaintext_len: u64) -> u64 {
        let packets = if plaintext_len == 0 {
            1
        } else {
            plaintext_len.div_ceil(PACKET_SIZE as u64)
        };
        HEADER_SIZE as u64 + plaintext_len + packets * TAG_SIZE as u64
    }

    fn key() -> DerivedKey {
        derive_snapshot_key(&MasterSecret::from_bytes(b"sealed".to_vec()), b"snap").unwrap()
    }

    fn seal(plaintext: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        SealingReader::new(Cursor::new(plaintext.to_vec()), &key())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    fn open(sealed: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        OpeningReader::new(Cursor::new(sealed.to_vec()), &key()).read_to_end(&mut out)?;
        Ok(out)
    }

    fn assert_auth_failure(result: io::Result<Vec<u8>>) {
        let err = result.expect_err("expected authentication failure");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(CryptoError::from_io(&err).is_some_and(CryptoError::is_authentication));
    }

    #[test]
    fn test_roundtrip_sizes_around_packet_boundary() {
        for len in [0, 1, PACKET_SIZE - 1, PACKET_SIZE, PACKET_SIZE + 1, 3 * PACKET_SIZE + 7] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let sealed = seal(&plaintext);
            assert_eq!(sealed.len() as u64, sealed_len(len as u64), "len {len}");
            assert_eq!(open(&sealed).unwrap(), plaintext, "len {len}");
        }
    }

    #[test]
    fn test_exact_packet_multiple_ends_on_full_last_packet() {
        for packets in [1, 2] {
            let plaintext = vec![0x5Au8; packets * PACKET_SIZE];
            let sealed = seal(&plaintext);
            assert_eq!(sealed.len(), HEADER_SIZE + packets * SEALED_PACKET_SIZE);
            assert_eq!(open(&sealed).unwrap(), plaintext);

            // Cutting the full last packet off must not open as a shorter stream.
            if packets > 1 {
                let cut = &sealed[..HEADER_SIZE + (packets - 1) * SEALED_PACKET_SIZE];
                assert_auth_failure(open(cut));
            }
        }
    }

    #[test]
    fn test_empty_payload_still_has_tagged_packet() {
        let sealed = seal(b"");
        assert_eq!(sealed.len(), HEADER_SIZE + TAG_SIZE);
        assert_eq!(sealed[0], FORMAT_VERSION);
    }

    #[test]
    fn test_random_nonce_per_stream() {
        assert_ne!(seal(b"same plaintext"), seal(b"same plaintext"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(b"secret data");
        let other =
            derive_snapshot_key(&MasterSecret::from_bytes(b"sealed".to_vec()), b"other").unwrap();
        let mut out = Vec::new();
        let result = OpeningReader::new(Cursor::new(sealed), &other)
            .read_to_end(&mut out)
            .map(|_| out);
        assert_auth_failure(result);
    }

    #[test]
    fn test_tampered_byte_fails() {
        let mut sealed = seal(b"secret data");
        sealed[HEADER_SIZE + 2] ^= 0x01;
        assert_auth_failure(open(&sealed));
    }

    #[test]
    fn test_tampered_header_fails() {
        let mut sealed = seal(b"secret data");
        sealed[0] = 9;
        assert_auth_failure(open(&sealed));

        let mut sealed = seal(b"secret data");
        sealed[5] ^= 0x80;
        assert_auth_failure(open(&sealed));
    }

    #[test]
    fn test_truncated_header_fails() {
        let sealed = seal(b"x");
        assert_auth_failure(open(&sealed[..HEADER_SIZE - 1]));
        assert_auth_failure(open(&[]));
    }

    #[test]
    fn test_truncation_at_packet_boundary_fails() {
        let plaintext = vec![0x5Au8; 2 * PACKET_SIZE + 10];
        let sealed = seal(&plaintext);
        // Drop the final packet entirely: the remaining one was sealed as "next".
        let cut = HEADER_SIZE + 2 * SEALED_PACKET_SIZE;
        assert_auth_failure(open(&sealed[..cut]));
    }

    #[test]
    fn test_truncation_mid_packet_fails() {
        let sealed = seal(&vec![1u8; PACKET_SIZE + 100]);
        assert_auth_failure(open(&sealed[..sealed.len() - 1]));
    }

    #[test]
    fn test_reordered_packets_fail() {
        let plaintext: Vec<u8> = (0..3 * PACKET_SIZE).map(|i| (i / PACKET_SIZE) as u8).collect();
        let sealed = seal(&plaintext);

        let p0 = HEADER_SIZE..HEADER_SIZE + SEALED_PACKET_SIZE;
        let p1 = p0.end..p0.end + SEALED_PACKET_SIZE;
        let mut swapped = sealed[..HEADER_SIZE].to_vec();
        swapped.extend_from_slice(&sealed[p1.clone()]);
        swapped.extend_from_slice(&sealed[p0]);
        swapped.extend_from_slice(&sealed[p1.end..]);

        assert_auth_failure(open(&swapped));
    }

    #[test]
    fn test_verified_packets_released_before_failure() {
        let plaintext = vec![7u8; 2 * PACKET_SIZE + 1];
        let mut sealed = seal(&plaintext);
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        let mut reader = OpeningReader::new(Cursor::new(sealed), &key());
        let mut released = Vec::new();
        let mut buf = [0u8; 4096];
        let err = loop {
            match reader.read(&mut buf) {
                Ok(0) => panic!("tampered stream must not reach EOF"),
                Ok(n) => released.extend_from_slice(&buf[..n]),
                Err(e) => break e,
            }
        };

        assert!(CryptoError::from_io(&err).is_some_and(CryptoError::is_authentication));
        // Only the two intact packets came out, never the tampered tail.
        assert_eq!(released.len(), 2 * PACKET_SIZE);
        // The reader stays failed.
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn test_backend_io_error_passes_through() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "backend reset"))
            }
        }

        let mut out = Vec::new();
        let err = OpeningReader::new(Broken, &key())
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(CryptoError::from_io(&err).is_none());
    }

    #[test]
    fn test_header_read_resumes_after_backend_error() {
        /// Yields `first` bytes, fails once, then serves the rest.
        struct Hiccup {
            data: Cursor<Vec<u8>>,
            first: usize,
            failed: bool,
        }
        impl Read for Hiccup {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let pos = self.data.position() as usize;
                if pos < self.first {
                    let n = buf.len().min(self.first - pos);
                    return self.data.read(&mut buf[..n]);
                }
                if !self.failed {
                    self.failed = true;
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "slow backend"));
                }
                self.data.read(buf)
            }
        }

        let plaintext = b"resumable".to_vec();
        let mut reader = OpeningReader::new(
            Hiccup {
                data: Cursor::new(seal(&plaintext)),
                first: 7,
                failed: false,
            },
            &key(),
        );

        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(CryptoError::from_io(&err).is_none());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }
}
