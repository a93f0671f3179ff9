//! snapguard-core: types shared by every snapguard crate
//!
//! - [`types::Snapshot`]: the snapshot descriptor handed between backends,
//!   codecs and the restorer. Its name doubles as the key-derivation salt.
//! - [`config::SnapguardConfig`]: TOML configuration schema.

pub mod config;
pub mod error;
pub mod types;

pub use error::{SnapguardError, SnapguardResult};
pub use types::{SnapList, Snapshot, SnapshotKind};

/// Sub-path appended to every storage container, bumped on layout changes.
pub const BACKUP_FORMAT_VERSION: &str = "v1";
