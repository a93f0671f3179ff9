//! Local filesystem snapshot store
//!
//! Layout: `<container>/v1/<snap_dir>/<snap_name>`. Saves land in a temp file
//! next to the destination and are renamed into place once the stream has
//! been read to completion, so a partial snapshot is never listed.

use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use snapguard_core::{SnapList, Snapshot, BACKUP_FORMAT_VERSION};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{SnapReader, SnapStore};

pub struct LocalSnapStore {
    prefix: PathBuf,
}

impl LocalSnapStore {
    /// Open (creating if needed) the store under `container`.
    pub fn new(container: impl AsRef<Path>) -> StoreResult<Self> {
        let prefix = container.as_ref().join(BACKUP_FORMAT_VERSION);
        fs::create_dir_all(&prefix)?;
        debug!(prefix = %prefix.display(), "local snapstore opened");
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn object_path(&self, snapshot: &Snapshot) -> PathBuf {
        self.prefix.join(&snapshot.snap_dir).join(&snapshot.snap_name)
    }
}

fn not_found(path: &Path, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path.display().to_string())
    } else {
        StoreError::Io(err)
    }
}

impl SnapStore for LocalSnapStore {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        let path = self.object_path(snapshot);
        let file = fs::File::open(&path).map_err(|e| not_found(&path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn save(&self, snapshot: &Snapshot, mut data: SnapReader) -> StoreResult<()> {
        let path = self.object_path(snapshot);
        let dir = self.prefix.join(&snapshot.snap_dir);
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&dir)?;
        let bytes = io::copy(&mut data, tmp.as_file_mut())?;
        drop(data);
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %path.display(), bytes, "snapshot saved");
        Ok(())
    }

    fn list(&self) -> StoreResult<SnapList> {
        let mut snaps = Vec::new();
        let dirs = match fs::read_dir(&self.prefix) {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapList::default()),
            Err(e) => return Err(e.into()),
        };

        for dir in dirs {
            let dir = dir?;
            if !dir.file_type()?.is_dir() {
                continue;
            }
            let dir_name = dir.file_name().to_string_lossy().into_owned();
            for entry in fs::read_dir(dir.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !entry.file_type()?.is_file() || name.starts_with(".tmp") {
                    continue;
                }
                match Snapshot::parse_path(&format!("{dir_name}/{name}")) {
                    Ok(snap) => snaps.push(snap),
                    Err(e) => warn!("skipping unrecognised object: {e}"),
                }
            }
        }

        Ok(SnapList::new(snaps))
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let path = self.object_path(snapshot);
        fs::remove_file(&path).map_err(|e| not_found(&path, e))?;
        // Drop the backup directory once its last snapshot is gone.
        let _ = fs::remove_dir(self.prefix.join(&snapshot.snap_dir));
        debug!(path = %path.display(), "snapshot deleted");
        Ok(())
    }
}
