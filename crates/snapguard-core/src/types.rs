use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{SnapguardError, SnapguardResult};

/// Kind of snapshot stored in a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    /// Complete copy of the data store
    Full,
    /// Delta on top of a previous full snapshot
    #[serde(rename = "Incr")]
    Incremental,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Full => "Full",
            SnapshotKind::Incremental => "Incr",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = SnapguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full" | "full" => Ok(SnapshotKind::Full),
            "Incr" | "incr" | "incremental" => Ok(SnapshotKind::Incremental),
            other => Err(SnapguardError::Config(format!(
                "unknown snapshot kind: {other}"
            ))),
        }
    }
}

/// Snapshot descriptor.
///
/// Stored at `<snap_dir>/<snap_name>` relative to the backend's prefix, with
/// `snap_name = "<Kind>-<start:08>-<last:08>-<created_on>"` and
/// `snap_dir = "Backup-<created_on>"`. The name is also the cryptographic
/// salt for the snapshot's key and IV, so it must be unique per stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub start_revision: u64,
    pub last_revision: u64,
    /// Creation time, unix seconds
    pub created_on: u64,
    pub snap_dir: String,
    pub snap_name: String,
}

impl Snapshot {
    /// Create a descriptor stamped with the current time.
    pub fn new(kind: SnapshotKind, start_revision: u64, last_revision: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_created_on(kind, start_revision, last_revision, now)
    }

    pub fn with_created_on(
        kind: SnapshotKind,
        start_revision: u64,
        last_revision: u64,
        created_on: u64,
    ) -> Self {
        Self {
            kind,
            start_revision,
            last_revision,
            created_on,
            snap_dir: format!("Backup-{created_on}"),
            snap_name: format!("{kind}-{start_revision:08}-{last_revision:08}-{created_on}"),
        }
    }

    /// Identifier used as KDF salt / IV source.
    pub fn identifier(&self) -> &str {
        &self.snap_name
    }

    /// Path relative to the backend prefix.
    pub fn path(&self) -> String {
        format!("{}/{}", self.snap_dir, self.snap_name)
    }

    /// Parse `<snap_dir>/<snap_name>` back into a descriptor.
    pub fn parse_path(path: &str) -> SnapguardResult<Self> {
        let invalid = |reason: &str| SnapguardError::InvalidSnapshot {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let (snap_dir, snap_name) = path
            .trim_matches('/')
            .rsplit_once('/')
            .ok_or_else(|| invalid("expected <dir>/<name>"))?;

        let parts: Vec<&str> = snap_name.split('-').collect();
        if parts.len() != 4 {
            return Err(invalid("expected 4 '-' separated name fields"));
        }

        let kind = parts[0]
            .parse::<SnapshotKind>()
            .map_err(|_| invalid("unknown snapshot kind"))?;
        let start_revision = parts[1]
            .parse::<u64>()
            .map_err(|_| invalid("bad start revision"))?;
        let last_revision = parts[2]
            .parse::<u64>()
            .map_err(|_| invalid("bad last revision"))?;
        let created_on = parts[3]
            .parse::<u64>()
            .map_err(|_| invalid("bad creation time"))?;

        if last_revision < start_revision {
            return Err(invalid("last revision precedes start revision"));
        }

        Ok(Self {
            kind,
            start_revision,
            last_revision,
            created_on,
            snap_dir: snap_dir.to_string(),
            snap_name: snap_name.to_string(),
        })
    }
}

/// Snapshots ordered oldest → newest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapList(Vec<Snapshot>);

impl SnapList {
    pub fn new(mut snaps: Vec<Snapshot>) -> Self {
        snaps.sort_by(|a, b| {
            (a.created_on, a.last_revision, &a.snap_name)
                .cmp(&(b.created_on, b.last_revision, &b.snap_name))
        });
        Self(snaps)
    }

    /// Newest snapshot, if any.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Snapshot> {
        self.0
    }
}

impl FromIterator<Snapshot> for SnapList {
    fn from_iter<I: IntoIterator<Item = Snapshot>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SnapList {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
