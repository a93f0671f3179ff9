//! The snapshot store capability interface

use std::io::Read;

use snapguard_core::{SnapList, Snapshot};

use crate::error::StoreResult;

/// An owned byte stream. Dropping it closes the underlying resource.
pub type SnapReader = Box<dyn Read + Send>;

/// Capabilities every snapshot backend provides.
///
/// All calls are synchronous and run to completion. Concurrent calls on
/// different snapshots must be safe; concurrent calls on the same snapshot
/// are as safe as the backend makes them.
pub trait SnapStore: Send + Sync {
    /// Open a snapshot's stored bytes for reading.
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader>;

    /// Store a snapshot, reading `data` to completion. The store owns `data`
    /// and drops it before returning, on success and on error.
    fn save(&self, snapshot: &Snapshot, data: SnapReader) -> StoreResult<()>;

    /// All snapshots, oldest first.
    fn list(&self) -> StoreResult<SnapList>;

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()>;

    /// Newest snapshot by the backend's ordering, if any.
    fn latest(&self) -> StoreResult<Option<Snapshot>> {
        Ok(self.list()?.latest().cloned())
    }
}

impl<S: SnapStore + ?Sized> SnapStore for Box<S> {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        (**self).fetch(snapshot)
    }

    fn save(&self, snapshot: &Snapshot, data: SnapReader) -> StoreResult<()> {
        (**self).save(snapshot, data)
    }

    fn list(&self) -> StoreResult<SnapList> {
        (**self).list()
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        (**self).delete(snapshot)
    }

    fn latest(&self) -> StoreResult<Option<Snapshot>> {
        (**self).latest()
    }
}
