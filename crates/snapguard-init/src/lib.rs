//! snapguard-init: decide whether the local data directory can be trusted
//!
//! ```text
//! Initializer::initialize()
//!   validator.validate()
//!     ├── Valid                         → done, nothing touched
//!     └── Missing | Corrupt | Unknown   → restore_corrupt_data()
//!           1. resolve backend spec      (config errors stop here, no side effects)
//!           2. wipe data directory
//!           3. build backend, decorate with at-rest encryption
//!           4. latest snapshot           (none → done, empty directory)
//!           5. restorer.restore(store, options)
//! ```
//!
//! There is no rollback: a failure after step 2 leaves the directory wiped.

pub mod error;
pub mod initializer;
pub mod restorer;
pub mod validator;

pub use error::InitError;
pub use initializer::{InitConfig, Initializer};
pub use restorer::{FileRestorer, RestoreError, RestoreOptions, Restorer};
pub use validator::{DataDirStatus, DataDirValidator, Validator};
