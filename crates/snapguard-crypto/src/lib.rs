//! snapguard-crypto: at-rest encryption for stored snapshots
//!
//! Two schemes, one per deployment, selected by [`CipherScheme`]:
//!
//! ```text
//! Master Secret (process-wide, from DATA_ENCRYPTION_KEY)
//!   ├── sealed (default): HKDF-SHA256(ikm=secret, salt=snapshot name) → 256-bit key
//!   │     └── XChaCha20-Poly1305 STREAM, 64 KiB packets, per-packet tag
//!   └── legacy: key=SHA-256(secret), IV=SHA-1(snapshot name)[..16]
//!         └── AES-256-OFB keystream XOR, no integrity
//! ```
//!
//! All codecs are `std::io::Read` adapters: they pull from the wrapped reader
//! on demand and never buffer more than one packet.

pub mod error;
pub mod kdf;
pub mod legacy;
pub mod scheme;
pub mod sealed;
pub mod secret;

pub use error::CryptoError;
pub use kdf::derive_snapshot_key;
pub use legacy::LegacyCipherReader;
pub use scheme::{CipherReader, CipherScheme};
pub use sealed::{OpeningReader, SealingReader};
pub use secret::{DerivedKey, MasterSecret};
pub use secrecy::ExposeSecret;

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
