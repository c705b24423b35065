//! Profiles: isolated, optionally encrypted vaults that share one storage root.
//!
//! Each profile owns the subtree `<id>/` of the root:
//!
//! - `profile.json`: `{"id", "name", "encryption": null | {"algorithm", "salt"}}`
//! - `key`: the master key wrapped under a password-derived key (encrypted profiles only)
//! - `vault.db`: the SQLite snapshot, encrypted under the master key

use std::fmt;
use std::io;
use std::sync::Arc;

use notevault_crypto::{
    derive_key, generate_key, generate_salt, CryptoError, EncryptionAlgorithm,
    EncryptionController, KdfParams,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::StorageConfig;
use crate::database::VaultDatabase;
use crate::error::{ProfileError, StorageError};
use crate::files::{EncryptedFileController, FileController, FilesStorage, ScopedFilesStorage};

pub const PROFILE_FILE: &str = "profile.json";
pub const KEY_FILE: &str = "key";
pub const VAULT_FILE: &str = "vault.db";

type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: String,
    pub name: String,
    pub encryption: Option<ProfileEncryption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEncryption {
    pub algorithm: EncryptionAlgorithm,
    pub salt: Vec<u8>,
    /// Contents of the `key` file.
    pub encrypted_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub encryption: Option<EncryptionSetup>,
}

#[derive(Clone)]
pub struct EncryptionSetup {
    pub algorithm: EncryptionAlgorithm,
    pub password: String,
}

impl fmt::Debug for EncryptionSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionSetup")
            .field("algorithm", &self.algorithm)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileMetadata {
    id: String,
    name: String,
    encryption: Option<EncryptionMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptionMetadata {
    algorithm: EncryptionAlgorithm,
    #[serde(with = "base64_bytes")]
    salt: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

pub struct ProfilesManager {
    root: Arc<dyn FilesStorage>,
    config: StorageConfig,
}

impl ProfilesManager {
    pub fn new(root: Arc<dyn FilesStorage>, config: StorageConfig) -> Self {
        Self { root, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn scope(&self, id: &str) -> Result<ScopedFilesStorage> {
        // Ids are single path segments; anything else cannot name a profile.
        let separator = |c: char| c == '/' || c == '\\';
        if id.is_empty() || id == "." || id == ".." || id.contains(separator) {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }
        Ok(ScopedFilesStorage::new(self.root.clone(), id)?)
    }

    fn read_metadata(&self, files: &ScopedFilesStorage) -> Result<Option<ProfileMetadata>> {
        match files.get(PROFILE_FILE)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn require_metadata(&self, id: &str) -> Result<(ScopedFilesStorage, ProfileMetadata)> {
        let files = self.scope(id)?;
        match self.read_metadata(&files)? {
            Some(meta) => Ok((files, meta)),
            None => Err(ProfileError::ProfileNotFound(id.to_string())),
        }
    }

    fn write_metadata(&self, files: &ScopedFilesStorage, meta: &ProfileMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(meta).map_err(StorageError::from)?;
        files.write(PROFILE_FILE, &bytes)?;
        Ok(())
    }

    fn record(&self, files: &ScopedFilesStorage, meta: ProfileMetadata) -> Result<ProfileRecord> {
        let encryption = match meta.encryption {
            Some(enc) => Some(ProfileEncryption {
                algorithm: enc.algorithm,
                salt: enc.salt,
                encrypted_key: files.get(KEY_FILE)?.unwrap_or_default(),
            }),
            None => None,
        };
        Ok(ProfileRecord {
            id: meta.id,
            name: meta.name,
            encryption,
        })
    }

    /// Every readable profile, sorted by name. Profiles whose metadata cannot
    /// be read are skipped with a warning.
    pub fn get_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let suffix = format!("/{PROFILE_FILE}");
        let mut records = Vec::new();
        for path in self.root.list()? {
            let Some(id) = path.strip_suffix(&suffix) else {
                continue;
            };
            if id.contains('/') {
                continue;
            }
            match self.load_record(id) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("skipping profile {id}: {err}"),
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn load_record(&self, id: &str) -> Result<ProfileRecord> {
        let (files, meta) = self.require_metadata(id)?;
        if meta.id != id {
            return Err(ProfileError::Storage(StorageError::InvalidPath(format!(
                "metadata id {} does not match directory {id}",
                meta.id
            ))));
        }
        if meta.encryption.is_some() && files.get(KEY_FILE)?.is_none() {
            return Err(ProfileError::Storage(StorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "key file is missing",
            ))));
        }
        self.record(&files, meta)
    }

    pub fn get_profile(&self, id: &str) -> Result<ProfileRecord> {
        let (files, meta) = self.require_metadata(id)?;
        self.record(&files, meta)
    }

    /// Create a profile with an empty vault.
    ///
    /// For encrypted profiles a random master key is generated and stored
    /// wrapped under a key derived from the password and a fresh salt. The
    /// metadata file is written last, so an interrupted `add` leaves nothing
    /// that `get_profiles` reports.
    pub async fn add(&self, profile: NewProfile) -> Result<ProfileRecord> {
        let id = Uuid::new_v4().to_string();
        let files = self.scope(&id)?;

        let (vault_encryption, encryption_meta) = match &profile.encryption {
            Some(setup) => {
                let salt = generate_salt();
                let master = generate_key(setup.algorithm.key_len());
                let wrapped =
                    wrap_master_key(setup.algorithm, &master, &setup.password, &salt, self.config.kdf)
                        .await?;
                files.write(KEY_FILE, &wrapped)?;
                (
                    EncryptionController::keyed(setup.algorithm, &master)?,
                    Some(EncryptionMetadata {
                        algorithm: setup.algorithm,
                        salt,
                    }),
                )
            }
            None => (EncryptionController::Placeholder, None),
        };

        let vault = vault_file(&files, vault_encryption.clone())?;
        let written = vault.write(Vec::new()).await;
        vault_encryption.shutdown().await;
        written?;

        let meta = ProfileMetadata {
            id: id.clone(),
            name: profile.name,
            encryption: encryption_meta,
        };
        self.write_metadata(&files, &meta)?;
        log::info!(
            "created profile {id} ({})",
            if meta.encryption.is_some() { "encrypted" } else { "plain" }
        );
        self.record(&files, meta)
    }

    pub fn update(&self, id: &str, name: &str) -> Result<ProfileRecord> {
        let (files, mut meta) = self.require_metadata(id)?;
        meta.name = name.to_string();
        self.write_metadata(&files, &meta)?;
        self.record(&files, meta)
    }

    /// Remove each profile's whole subtree. Unknown ids are ignored.
    pub fn delete(&self, ids: &[&str]) -> Result<()> {
        for id in ids {
            let files = match self.scope(id) {
                Ok(files) => files,
                Err(ProfileError::ProfileNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let listed = files.list()?.len();
            // Also takes files the backend keeps out of listings.
            self.root.delete_tree(files.prefix())?;
            if listed > 0 {
                log::info!("deleted profile {id} ({listed} files)");
            }
        }
        Ok(())
    }

    /// Rewrap the master key under `new_password` with a fresh salt. The vault
    /// itself is untouched.
    pub async fn change_password(
        &self,
        id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let (files, mut meta) = self.require_metadata(id)?;
        let Some(encryption) = meta.encryption.clone() else {
            return Err(ProfileError::NotEncrypted(id.to_string()));
        };
        let wrapped = read_wrapped_key(&files, id)?;
        let master = unwrap_master_key(
            encryption.algorithm,
            wrapped,
            old_password,
            &encryption.salt,
            self.config.kdf,
        )
        .await?;

        let salt = generate_salt();
        let rewrapped =
            wrap_master_key(encryption.algorithm, &master, new_password, &salt, self.config.kdf)
                .await?;
        // TODO: a crash between these two writes leaves a key that the stored salt
        // cannot unwrap; stage the new key next to the old one before swapping.
        files.write(KEY_FILE, &rewrapped)?;
        meta.encryption = Some(EncryptionMetadata {
            algorithm: encryption.algorithm,
            salt,
        });
        self.write_metadata(&files, &meta)?;
        log::info!("changed password of profile {id}");
        Ok(())
    }

    /// Unlock a profile and load its vault.
    ///
    /// `password` is ignored for unencrypted profiles.
    pub async fn open(&self, id: &str, password: Option<&str>) -> Result<OpenedProfile> {
        let (files, meta) = self.require_metadata(id)?;

        let encryption = match (&meta.encryption, password) {
            (None, _) => EncryptionController::Placeholder,
            (Some(_), None) => return Err(ProfileError::PasswordRequired(id.to_string())),
            (Some(enc), Some(password)) => {
                let wrapped = read_wrapped_key(&files, id)?;
                let master =
                    unwrap_master_key(enc.algorithm, wrapped, password, &enc.salt, self.config.kdf)
                        .await?;
                EncryptionController::keyed(enc.algorithm, &master)?
            }
        };

        let vault = vault_file(&files, encryption.clone())?;
        let database = match VaultDatabase::open(vault, self.config.autosave).await {
            Ok(database) => database,
            Err(err) => {
                encryption.shutdown().await;
                return Err(match err {
                    StorageError::CorruptSnapshot(_)
                    | StorageError::Crypto(
                        CryptoError::InvalidPadding | CryptoError::InvalidFrame { .. },
                    ) => ProfileError::CorruptVault {
                        id: id.to_string(),
                        source: err,
                    },
                    other => ProfileError::Storage(other),
                });
            }
        };

        let record = self.record(&files, meta)?;
        log::debug!("opened profile {id}");
        Ok(OpenedProfile {
            record,
            files: Arc::new(files),
            encryption,
            database,
        })
    }
}

impl fmt::Debug for ProfilesManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilesManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// An unlocked profile. Call [`OpenedProfile::close`] to persist pending
/// changes and drop the key.
#[derive(Debug)]
pub struct OpenedProfile {
    record: ProfileRecord,
    files: Arc<ScopedFilesStorage>,
    encryption: EncryptionController,
    database: VaultDatabase,
}

impl OpenedProfile {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &ProfileRecord {
        &self.record
    }

    /// The profile's own namespace. Contents are stored as given; use
    /// [`OpenedProfile::encryption`] for data that must be encrypted at rest.
    pub fn files(&self) -> Arc<dyn FilesStorage> {
        self.files.clone()
    }

    pub fn encryption(&self) -> &EncryptionController {
        &self.encryption
    }

    pub fn database(&self) -> &VaultDatabase {
        &self.database
    }

    /// Final flush, close the database, then stop the crypto worker.
    pub async fn close(self) -> Result<()> {
        let closed = self.database.close().await;
        self.encryption.shutdown().await;
        log::debug!("closed profile {}", self.record.id);
        Ok(closed?)
    }
}

/// A missing key file on an encrypted profile is damage, not a wrong password.
fn read_wrapped_key(files: &ScopedFilesStorage, id: &str) -> Result<Vec<u8>> {
    files.get(KEY_FILE)?.ok_or_else(|| ProfileError::CorruptVault {
        id: id.to_string(),
        source: StorageError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "key file is missing",
        )),
    })
}

fn vault_file(
    files: &ScopedFilesStorage,
    encryption: EncryptionController,
) -> Result<EncryptedFileController> {
    let storage: Arc<dyn FilesStorage> = Arc::new(files.clone());
    Ok(EncryptedFileController::new(
        FileController::new(storage, VAULT_FILE)?,
        encryption,
    ))
}

async fn wrapping_controller(
    algorithm: EncryptionAlgorithm,
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<EncryptionController> {
    let password = Zeroizing::new(password.as_bytes().to_vec());
    let salt = salt.to_vec();
    let len = algorithm.key_len();
    // Argon2 blocks for the whole derivation.
    let key = tokio::task::spawn_blocking(move || derive_key(&password, &salt, &kdf, len))
        .await
        .map_err(|err| StorageError::Io(io::Error::new(io::ErrorKind::Other, err.to_string())))??;
    Ok(EncryptionController::keyed(algorithm, &key)?)
}

async fn wrap_master_key(
    algorithm: EncryptionAlgorithm,
    master: &[u8],
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Vec<u8>> {
    let wrapper = wrapping_controller(algorithm, password, salt, kdf).await?;
    let wrapped = wrapper.encrypt(master.to_vec()).await;
    wrapper.shutdown().await;
    Ok(wrapped?)
}

/// A wrong password surfaces as a frame or padding failure, or as a key of
/// the wrong length; all of them mean [`ProfileError::InvalidPassword`].
async fn unwrap_master_key(
    algorithm: EncryptionAlgorithm,
    wrapped: Vec<u8>,
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<Vec<u8>>> {
    let unwrapper = wrapping_controller(algorithm, password, salt, kdf).await?;
    let unwrapped = unwrapper.decrypt(wrapped).await;
    unwrapper.shutdown().await;
    match unwrapped {
        Ok(key) if key.len() == algorithm.key_len() => Ok(Zeroizing::new(key)),
        Ok(key) => {
            drop(Zeroizing::new(key));
            Err(ProfileError::InvalidPassword)
        }
        Err(CryptoError::InvalidPadding | CryptoError::InvalidFrame { .. }) => {
            Err(ProfileError::InvalidPassword)
        }
        Err(other) => Err(other.into()),
    }
}
