//! Storage for notevault profiles.
//!
//! - [`files`]: the file-namespace contract with filesystem, in-memory, zip
//!   and scoped backends, plus single-file controllers that encrypt at rest.
//! - [`debounce`]: deadline-bounded debouncing of snapshot writes.
//! - [`database`]: the in-memory SQLite vault and its autosave loop.
//! - [`profiles`]: creating, listing, unlocking and deleting profiles.
//! - [`config`]: the persisted settings store and [`StorageConfig`].

pub mod config;
pub mod database;
pub mod debounce;
mod error;
pub mod files;
pub mod profiles;

pub use config::{ConfigStore, StorageConfig};
pub use database::VaultDatabase;
pub use debounce::{DebounceConfig, Debouncer};
pub use error::{ProfileError, Result, StorageError};
pub use files::{
    normalize_path, EncryptedFileController, FileController, FilesStorage, FsFilesStorage,
    InMemoryFilesStorage, ScopedFilesStorage, ZipFilesStorage,
};
pub use profiles::{
    EncryptionSetup, NewProfile, OpenedProfile, ProfileEncryption, ProfileRecord, ProfilesManager,
};
