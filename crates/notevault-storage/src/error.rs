use notevault_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("path escapes the storage root: {0}")]
    PathTraversal(String),
    #[error("invalid storage path: {0:?}")]
    InvalidPath(String),
    #[error("vault snapshot is not a readable database: {0}")]
    CorruptSnapshot(String),
    #[error("database is closed")]
    DatabaseClosed,
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    /// Wrong password or a damaged key file. The caller may retry.
    #[error("invalid password")]
    InvalidPassword,
    #[error("profile {0} is encrypted and needs a password")]
    PasswordRequired(String),
    #[error("profile {0} is not encrypted")]
    NotEncrypted(String),
    #[error("vault of profile {id} is unreadable: {source}")]
    CorruptVault {
        id: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CryptoError> for ProfileError {
    fn from(err: CryptoError) -> Self {
        ProfileError::Storage(StorageError::Crypto(err))
    }
}
