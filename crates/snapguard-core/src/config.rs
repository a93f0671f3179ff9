use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SnapguardError, SnapguardResult};

/// Environment variable holding the master secret for at-rest encryption.
///
/// Unset or empty disables encryption: snapshots are then stored in plaintext.
/// The secret is deliberately never read from the config file.
pub const ENV_DATA_ENCRYPTION_KEY: &str = "DATA_ENCRYPTION_KEY";

/// Environment variable naming the storage container (bucket or local directory).
pub const ENV_STORAGE_CONTAINER: &str = "STORAGE_CONTAINER";

/// Environment variable selecting the storage provider.
pub const ENV_STORAGE_PROVIDER: &str = "STORAGE_PROVIDER";

/// Top-level configuration (loaded from snapguard.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapguardConfig {
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub restore: RestoreConfig,
    pub log: LogConfig,
}

impl SnapguardConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> SnapguardResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|source| SnapguardError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| SnapguardError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage provider: "local" (default when empty) or "s3"
    pub provider: String,
    /// Container name: bucket for object storage, root directory for local
    pub container: Option<String>,
    /// Custom S3 endpoint (MinIO, SeaweedFS, ...)
    pub endpoint: Option<String>,
    /// S3 region (default: us-east-1)
    pub region: String,
}

/// At-rest encryption configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// "sealed" (authenticated, default) or "legacy" (unauthenticated AES-OFB).
    /// One scheme per deployment: stored objects carry no scheme tag.
    pub scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Data directory validated and rebuilt on startup
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            container: None,
            endpoint: None,
            region: "us-east-1".into(),
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            scheme: "sealed".into(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("default.etcd"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
