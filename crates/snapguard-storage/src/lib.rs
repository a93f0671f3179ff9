//! snapguard-storage: pluggable snapshot stores
//!
//! Every backend implements [`SnapStore`]. [`decorate`] wraps one so that
//! payloads are encrypted on save and decrypted on fetch; with no master
//! secret the store is passed through untouched.
//!
//! ```text
//! decorate(store, secret, scheme)
//!   ├── None secret  → SnapStoreDecorator::PassThrough(store)
//!   └── Some(secret) → SnapStoreDecorator::Encrypting(..)
//!         fetch: store.fetch → StreamOwner(decrypt(raw))
//!         save:  store.save(StreamOwner(encrypt(plaintext)))
//! ```

pub mod decorator;
pub mod error;
pub mod local;
pub mod object;
pub mod owner;
pub mod provider;
pub mod store;

pub use decorator::{decorate, EncryptingSnapStore, SnapStoreDecorator};
pub use error::{StoreError, StoreResult};
pub use local::LocalSnapStore;
pub use object::ObjectSnapStore;
pub use owner::StreamOwner;
pub use provider::{BackendFactory, BackendSpec, DefaultBackendFactory, StorageProvider};
pub use store::{SnapReader, SnapStore};
