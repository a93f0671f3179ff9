//! Startup initializer: validate, and rebuild from the latest snapshot if needed

use std::io;
use std::path::{Path, PathBuf};

use snapguard_core::config::StorageConfig;
use snapguard_crypto::{CipherScheme, MasterSecret};
use snapguard_storage::{decorate, BackendFactory, BackendSpec, DefaultBackendFactory, SnapStore};
use tracing::{info, warn};

use crate::error::InitError;
use crate::restorer::{FileRestorer, RestoreOptions, Restorer};
use crate::validator::{DataDirStatus, DataDirValidator, Validator};

/// Everything the initializer needs besides the master secret.
#[derive(Debug, Clone)]
pub struct InitConfig {
    pub data_dir: PathBuf,
    pub storage: StorageConfig,
    pub scheme: CipherScheme,
}

pub struct Initializer {
    config: InitConfig,
    secret: Option<MasterSecret>,
    validator: Box<dyn Validator>,
    restorer: Box<dyn Restorer>,
    backends: Box<dyn BackendFactory>,
}

impl Initializer {
    /// Initializer with the structural validator, file restorer and the
    /// production backend factory.
    pub fn new(config: InitConfig, secret: Option<MasterSecret>) -> Self {
        let validator = Box::new(DataDirValidator::new(config.data_dir.clone()));
        Self {
            config,
            secret,
            validator,
            restorer: Box::new(FileRestorer),
            backends: Box::new(DefaultBackendFactory),
        }
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_restorer(mut self, restorer: impl Restorer + 'static) -> Self {
        self.restorer = Box::new(restorer);
        self
    }

    pub fn with_backend_factory(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.backends = Box::new(factory);
        self
    }

    pub fn config(&self) -> &InitConfig {
        &self.config
    }

    /// Leave a valid data directory alone; otherwise rebuild it.
    pub fn initialize(&self) -> Result<(), InitError> {
        let status = self.validator.validate();
        if status == DataDirStatus::Valid {
            info!(data_dir = %self.config.data_dir.display(), "data directory is valid");
            return Ok(());
        }

        warn!(
            data_dir = %self.config.data_dir.display(),
            status = %status,
            "data directory is not usable, restoring from latest snapshot"
        );
        self.restore_corrupt_data()
    }

    /// Wipe the data directory and restore the latest stored snapshot into it.
    ///
    /// No rollback: once the wipe has happened, any later failure leaves the
    /// directory deleted or partially written.
    pub fn restore_corrupt_data(&self) -> Result<(), InitError> {
        let data_dir = &self.config.data_dir;

        let spec = BackendSpec::resolve(&self.config.storage).map_err(InitError::Config)?;

        info!(data_dir = %data_dir.display(), "removing data directory");
        wipe(data_dir).map_err(|source| InitError::Wipe {
            path: data_dir.clone(),
            source,
        })?;

        let raw = self.backends.build(&spec).map_err(InitError::Backend)?;
        let store = decorate(raw, self.secret.clone(), self.config.scheme);
        info!(
            provider = %spec.provider(),
            encrypted = store.is_encrypting(),
            "snapshot store ready"
        );

        let Some(snapshot) = store.latest().map_err(InitError::Latest)? else {
            info!("no snapshot found, starting with an empty data directory");
            return Ok(());
        };

        info!(snapshot = %snapshot.snap_name, "restoring snapshot");
        let name = snapshot.snap_name.clone();
        let options = RestoreOptions {
            data_dir: data_dir.clone(),
            snapshot,
        };
        self.restorer
            .restore(&store, &options)
            .map_err(|source| InitError::Restore {
                snapshot: name.clone(),
                source,
            })?;

        info!(snapshot = %name, "successfully restored from snapshot");
        Ok(())
    }
}

/// Remove whatever sits at `path`: a directory tree, a file or a symlink.
/// Nothing there is not an error.
fn wipe(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
