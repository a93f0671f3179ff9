//! Transparent at-rest encryption over any [`SnapStore`]

use snapguard_core::{SnapList, Snapshot};
use snapguard_crypto::{CipherScheme, MasterSecret};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::owner::StreamOwner;
use crate::store::{SnapReader, SnapStore};

/// A store chosen once at construction: pass-through or encrypting.
///
/// The variant never changes for the lifetime of the value.
pub enum SnapStoreDecorator<S> {
    PassThrough(S),
    Encrypting(EncryptingSnapStore<S>),
}

/// Wrap `store` with at-rest encryption under `scheme`.
///
/// Without a master secret the store is returned as-is; encryption is then
/// disabled and snapshots are written in plaintext.
pub fn decorate<S: SnapStore>(
    store: S,
    secret: Option<MasterSecret>,
    scheme: CipherScheme,
) -> SnapStoreDecorator<S> {
    match secret {
        None => {
            debug!("no master secret: snapshot store is not encrypted");
            SnapStoreDecorator::PassThrough(store)
        }
        Some(secret) => {
            debug!(scheme = %scheme, "snapshot store encrypts at rest");
            SnapStoreDecorator::Encrypting(EncryptingSnapStore::new(store, secret, scheme))
        }
    }
}

impl<S> SnapStoreDecorator<S> {
    pub fn is_encrypting(&self) -> bool {
        matches!(self, SnapStoreDecorator::Encrypting(_))
    }

    pub fn inner(&self) -> &S {
        match self {
            SnapStoreDecorator::PassThrough(s) => s,
            SnapStoreDecorator::Encrypting(e) => &e.inner,
        }
    }
}

impl<S: SnapStore> SnapStore for SnapStoreDecorator<S> {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        match self {
            SnapStoreDecorator::PassThrough(s) => s.fetch(snapshot),
            SnapStoreDecorator::Encrypting(e) => e.fetch(snapshot),
        }
    }

    fn save(&self, snapshot: &Snapshot, data: SnapReader) -> StoreResult<()> {
        match self {
            SnapStoreDecorator::PassThrough(s) => s.save(snapshot, data),
            SnapStoreDecorator::Encrypting(e) => e.save(snapshot, data),
        }
    }

    fn list(&self) -> StoreResult<SnapList> {
        self.inner().list()
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner().delete(snapshot)
    }

    fn latest(&self) -> StoreResult<Option<Snapshot>> {
        self.inner().latest()
    }
}

/// Encrypts payloads on save and decrypts them on fetch.
///
/// List and delete carry no payload and go straight to the inner store.
pub struct EncryptingSnapStore<S> {
    inner: S,
    secret: MasterSecret,
    scheme: CipherScheme,
}

impl<S> EncryptingSnapStore<S> {
    pub fn new(inner: S, secret: MasterSecret, scheme: CipherScheme) -> Self {
        Self {
            inner,
            secret,
            scheme,
        }
    }

    pub fn scheme(&self) -> CipherScheme {
        self.scheme
    }
}

impl<S: SnapStore> SnapStore for EncryptingSnapStore<S> {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        let raw = self.inner.fetch(snapshot)?;
        // On error `raw` is dropped (closed) inside `decrypting`.
        let plaintext = self.scheme.decrypting(
            raw,
            &self.secret,
            snapshot.identifier().as_bytes(),
        )?;
        Ok(Box::new(StreamOwner::new(plaintext, snapshot.identifier())))
    }

    fn save(&self, snapshot: &Snapshot, data: SnapReader) -> StoreResult<()> {
        if self.scheme == CipherScheme::Legacy {
            warn!(
                snapshot = %snapshot.identifier(),
                "legacy scheme: IV is derived from the snapshot name alone, \
                 re-saving under an existing name reuses the keystream"
            );
        }
        let ciphertext =
            self.scheme
                .encrypting(data, &self.secret, snapshot.identifier().as_bytes())?;
        self.inner.save(
            snapshot,
            Box::new(StreamOwner::new(ciphertext, snapshot.identifier())),
        )
    }

    fn list(&self) -> StoreResult<SnapList> {
        self.inner.list()
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner.delete(snapshot)
    }

    fn latest(&self) -> StoreResult<Option<Snapshot>> {
        self.inner.latest()
    }
}
