//! Initializer decision-path tests
//!
//! Validator, backend factory and restorer are swapped for recording fakes so
//! each path can be checked for exactly which side effects it produced.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use snapguard_core::config::StorageConfig;
use snapguard_core::{SnapList, Snapshot, SnapshotKind};
use snapguard_crypto::{CipherScheme, MasterSecret};
use snapguard_init::validator::DB_FILE;
use snapguard_init::{
    DataDirStatus, DataDirValidator, FileRestorer, InitConfig, InitError, Initializer,
    RestoreError, RestoreOptions, Restorer, Validator,
};
use snapguard_storage::{
    decorate, BackendFactory, BackendSpec, LocalSnapStore, SnapReader, SnapStore, StoreError,
    StoreResult,
};
use tempfile::TempDir;

struct FixedStatus(DataDirStatus);

impl Validator for FixedStatus {
    fn validate(&self) -> DataDirStatus {
        self.0.clone()
    }
}

#[derive(Clone, Default)]
struct MemStore {
    objects: Arc<Mutex<BTreeMap<String, (Snapshot, Vec<u8>)>>>,
}

impl SnapStore for MemStore {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        let objects = self.objects.lock().unwrap();
        let (_, bytes) = objects
            .get(&snapshot.path())
            .ok_or_else(|| StoreError::NotFound(snapshot.path()))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    fn save(&self, snapshot: &Snapshot, mut data: SnapReader) -> StoreResult<()> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        self.objects
            .lock()
            .unwrap()
            .insert(snapshot.path(), (snapshot.clone(), bytes));
        Ok(())
    }

    fn list(&self) -> StoreResult<SnapList> {
        let objects = self.objects.lock().unwrap();
        Ok(SnapList::new(objects.values().map(|(s, _)| s.clone()).collect()))
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&snapshot.path())
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(snapshot.path()))
    }
}

/// Hands out the same shared store on every build and counts builds.
#[derive(Clone, Default)]
struct CountingFactory {
    store: MemStore,
    builds: Arc<AtomicUsize>,
}

impl BackendFactory for CountingFactory {
    fn build(&self, _spec: &BackendSpec) -> StoreResult<Box<dyn SnapStore>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.store.clone()))
    }
}

struct BrokenFactory;

impl BackendFactory for BrokenFactory {
    fn build(&self, _spec: &BackendSpec) -> StoreResult<Box<dyn SnapStore>> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// Records which snapshots it was asked to restore.
#[derive(Clone, Default)]
struct RecordingRestorer {
    restored: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl Restorer for RecordingRestorer {
    fn restore(&self, store: &dyn SnapStore, options: &RestoreOptions) -> Result<(), RestoreError> {
        self.restored
            .lock()
            .unwrap()
            .push(options.snapshot.snap_name.clone());
        if self.fail {
            return Err(RestoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "disk full",
            )));
        }
        FileRestorer.restore(store, options)
    }
}

fn config(data_dir: &Path, provider: &str) -> InitConfig {
    InitConfig {
        data_dir: data_dir.to_path_buf(),
        storage: StorageConfig {
            provider: provider.into(),
            container: Some("bucket".into()),
            ..Default::default()
        },
        scheme: CipherScheme::Sealed,
    }
}

fn populated_data_dir(root: &Path) -> std::path::PathBuf {
    let data_dir = root.join("data");
    std::fs::create_dir_all(data_dir.join("member/snap")).unwrap();
    std::fs::write(data_dir.join(DB_FILE), b"old-db").unwrap();
    std::fs::write(data_dir.join("marker"), b"keep me").unwrap();
    data_dir
}

fn snap(last: u64, created_on: u64) -> Snapshot {
    Snapshot::with_created_on(SnapshotKind::Full, 0, last, created_on)
}

#[test]
fn valid_directory_is_left_untouched() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();
    let restorer = RecordingRestorer::default();

    Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Valid))
        .with_backend_factory(factory.clone())
        .with_restorer(restorer.clone())
        .initialize()
        .unwrap();

    assert_eq!(std::fs::read(data_dir.join("marker")).unwrap(), b"keep me");
    assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
    assert!(restorer.restored.lock().unwrap().is_empty());
}

#[test]
fn corrupt_directory_restores_newest_snapshot() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();
    let secret = MasterSecret::from_bytes(b"cluster-secret".to_vec());

    // Seed the shared backend through the same decorator the initializer uses.
    let seeding = decorate(factory.store.clone(), Some(secret.clone()), CipherScheme::Sealed);
    let s1 = snap(10, 100);
    let s2 = snap(20, 200);
    seeding
        .save(&s1, Box::new(Cursor::new(b"state at 10".to_vec())))
        .unwrap();
    seeding
        .save(&s2, Box::new(Cursor::new(b"state at 20".to_vec())))
        .unwrap();

    let restorer = RecordingRestorer::default();
    Initializer::new(config(&data_dir, "local"), Some(secret))
        .with_validator(FixedStatus(DataDirStatus::Corrupt))
        .with_backend_factory(factory.clone())
        .with_restorer(restorer.clone())
        .initialize()
        .unwrap();

    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    assert_eq!(*restorer.restored.lock().unwrap(), vec![s2.snap_name]);
    assert!(!data_dir.join("marker").exists());
    assert_eq!(std::fs::read(data_dir.join(DB_FILE)).unwrap(), b"state at 20");
}

#[test]
fn empty_backend_leaves_directory_deleted() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let restorer = RecordingRestorer::default();

    Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Corrupt))
        .with_backend_factory(CountingFactory::default())
        .with_restorer(restorer.clone())
        .initialize()
        .unwrap();

    assert!(!data_dir.exists());
    assert!(restorer.restored.lock().unwrap().is_empty());
}

#[test]
fn unsupported_provider_fails_before_wiping() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();

    let err = Initializer::new(config(&data_dir, "floppy"), None)
        .with_validator(FixedStatus(DataDirStatus::Corrupt))
        .with_backend_factory(factory.clone())
        .initialize()
        .unwrap_err();

    assert!(matches!(err, InitError::Config(_)));
    assert_eq!(err.phase(), "config");
    assert!(err.to_string().contains("floppy"));
    assert_eq!(std::fs::read(data_dir.join("marker")).unwrap(), b"keep me");
    assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
}

#[test]
fn s3_without_container_fails_before_wiping() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let mut cfg = config(&data_dir, "s3");
    cfg.storage.container = None;

    let err = Initializer::new(cfg, None)
        .with_validator(FixedStatus(DataDirStatus::Missing))
        .with_backend_factory(CountingFactory::default())
        .initialize()
        .unwrap_err();

    assert_eq!(err.phase(), "config");
    assert!(data_dir.join("marker").exists());
}

#[test]
fn unknown_status_triggers_restore() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();
    let s = snap(5, 50);
    factory
        .store
        .save(&s, Box::new(Cursor::new(b"plain".to_vec())))
        .unwrap();

    let restorer = RecordingRestorer::default();
    Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Unknown("permission denied".into())))
        .with_backend_factory(factory)
        .with_restorer(restorer.clone())
        .initialize()
        .unwrap();

    assert_eq!(*restorer.restored.lock().unwrap(), vec![s.snap_name]);
    assert_eq!(std::fs::read(data_dir.join(DB_FILE)).unwrap(), b"plain");
}

#[test]
fn backend_failure_is_reported_after_wipe() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());

    let err = Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Corrupt))
        .with_backend_factory(BrokenFactory)
        .initialize()
        .unwrap_err();

    assert_eq!(err.phase(), "backend");
    assert!(err.to_string().contains("failed to create snapstore"));
    assert!(!data_dir.exists());
}

#[test]
fn failed_restore_leaves_directory_deleted() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();
    let s = snap(7, 70);
    factory
        .store
        .save(&s, Box::new(Cursor::new(b"x".to_vec())))
        .unwrap();

    let err = Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Corrupt))
        .with_backend_factory(factory)
        .with_restorer(RecordingRestorer {
            fail: true,
            ..Default::default()
        })
        .initialize()
        .unwrap_err();

    match &err {
        InitError::Restore { snapshot, .. } => assert_eq!(snapshot, &s.snap_name),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.phase(), "restore");
    assert!(!data_dir.join("marker").exists());
}

#[test]
fn wrong_secret_fails_restore_without_installing_db() {
    let tmp = TempDir::new().unwrap();
    let data_dir = populated_data_dir(tmp.path());
    let factory = CountingFactory::default();
    let s = snap(3, 30);
    decorate(
        factory.store.clone(),
        Some(MasterSecret::from_bytes(b"right".to_vec())),
        CipherScheme::Sealed,
    )
    .save(&s, Box::new(Cursor::new(b"secret state".to_vec())))
    .unwrap();

    let err = Initializer::new(
        config(&data_dir, "local"),
        Some(MasterSecret::from_bytes(b"wrong".to_vec())),
    )
    .with_validator(FixedStatus(DataDirStatus::Corrupt))
    .with_backend_factory(factory)
    .initialize()
    .unwrap_err();

    assert_eq!(err.phase(), "restore");
    assert!(!data_dir.join(DB_FILE).exists());
}

#[test]
fn end_to_end_with_local_backend() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    let container = tmp.path().join("backups");
    let secret = MasterSecret::from_bytes(b"e2e".to_vec());

    let backend = decorate(
        LocalSnapStore::new(&container).unwrap(),
        Some(secret.clone()),
        CipherScheme::Legacy,
    );
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    backend
        .save(&snap(9, 90), Box::new(Cursor::new(payload.clone())))
        .unwrap();

    let mut cfg = config(&data_dir, "local");
    cfg.storage.container = Some(container.to_string_lossy().into_owned());
    cfg.scheme = CipherScheme::Legacy;

    assert_eq!(
        DataDirValidator::new(&data_dir).validate(),
        DataDirStatus::Missing
    );
    Initializer::new(cfg.clone(), Some(secret.clone()))
        .initialize()
        .unwrap();

    assert_eq!(std::fs::read(data_dir.join(DB_FILE)).unwrap(), payload);
    assert_eq!(
        DataDirValidator::new(&data_dir).validate(),
        DataDirStatus::Valid
    );

    // Second start finds a valid directory and does nothing.
    std::fs::write(data_dir.join("marker"), b"x").unwrap();
    Initializer::new(cfg, Some(secret)).initialize().unwrap();
    assert!(data_dir.join("marker").exists());
}

#[test]
fn plain_file_at_data_path_is_replaced() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    std::fs::write(&data_dir, b"stray file").unwrap();
    assert_eq!(
        DataDirValidator::new(&data_dir).validate(),
        DataDirStatus::Corrupt
    );

    let factory = CountingFactory::default();
    let s = snap(4, 40);
    factory
        .store
        .save(&s, Box::new(Cursor::new(b"rebuilt".to_vec())))
        .unwrap();

    Initializer::new(config(&data_dir, "local"), None)
        .with_backend_factory(factory)
        .initialize()
        .unwrap();

    assert!(data_dir.is_dir());
    assert_eq!(std::fs::read(data_dir.join(DB_FILE)).unwrap(), b"rebuilt");
    assert_eq!(
        DataDirValidator::new(&data_dir).validate(),
        DataDirStatus::Valid
    );
}

#[cfg(unix)]
#[test]
fn dangling_symlink_at_data_path_is_removed() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    std::os::unix::fs::symlink(tmp.path().join("gone"), &data_dir).unwrap();

    Initializer::new(config(&data_dir, "local"), None)
        .with_validator(FixedStatus(DataDirStatus::Missing))
        .with_backend_factory(CountingFactory::default())
        .initialize()
        .unwrap();

    assert!(std::fs::symlink_metadata(&data_dir).is_err());
}
