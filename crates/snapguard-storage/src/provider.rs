//! Storage provider selection and backend construction

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use snapguard_core::config::StorageConfig;

use crate::error::{StoreError, StoreResult};
use crate::local::LocalSnapStore;
use crate::object::{ObjectSnapStore, S3Settings};
use crate::store::SnapStore;

/// Container used by the local provider when none is configured
pub const DEFAULT_LOCAL_CONTAINER: &str = "default.bkp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Local,
    S3,
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageProvider::Local => f.write_str("local"),
            StorageProvider::S3 => f.write_str("s3"),
        }
    }
}

impl FromStr for StorageProvider {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "local" => Ok(StorageProvider::Local),
            "s3" => Ok(StorageProvider::S3),
            _ => Err(StoreError::Config(format!("unsupported storage provider: {s}"))),
        }
    }
}

/// A validated description of the backend to build.
///
/// Resolving one has no side effects, so configuration errors surface before
/// anything on disk or in a bucket is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSpec {
    Local {
        container: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
}

impl BackendSpec {
    pub fn resolve(config: &StorageConfig) -> StoreResult<Self> {
        let container = config
            .container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        match config.provider.parse::<StorageProvider>()? {
            StorageProvider::Local => Ok(BackendSpec::Local {
                container: PathBuf::from(container.unwrap_or(DEFAULT_LOCAL_CONTAINER)),
            }),
            StorageProvider::S3 => {
                let bucket = container.ok_or_else(|| {
                    StoreError::Config("storage container name not specified".into())
                })?;
                Ok(BackendSpec::S3 {
                    bucket: bucket.to_string(),
                    region: config.region.clone(),
                    endpoint: config.endpoint.clone(),
                })
            }
        }
    }

    pub fn provider(&self) -> StorageProvider {
        match self {
            BackendSpec::Local { .. } => StorageProvider::Local,
            BackendSpec::S3 { .. } => StorageProvider::S3,
        }
    }
}

/// Builds a raw (undecorated) backend from a resolved spec.
pub trait BackendFactory: Send + Sync {
    fn build(&self, spec: &BackendSpec) -> StoreResult<Box<dyn SnapStore>>;
}

/// Production factory: local filesystem or S3 via OpenDAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn build(&self, spec: &BackendSpec) -> StoreResult<Box<dyn SnapStore>> {
        match spec {
            BackendSpec::Local { container } => Ok(Box::new(LocalSnapStore::new(container)?)),
            BackendSpec::S3 {
                bucket,
                region,
                endpoint,
            } => Ok(Box::new(ObjectSnapStore::s3(&S3Settings {
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
            })?)),
        }
    }
}
