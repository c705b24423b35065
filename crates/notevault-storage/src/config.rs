use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use notevault_crypto::{EncryptionAlgorithm, KdfParams};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::debounce::DebounceConfig;
use crate::error::Result;

/// Tunables for [`crate::ProfilesManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageConfig {
    pub autosave: DebounceConfig,
    pub kdf: KdfParams,
    /// Suite offered for new encrypted profiles.
    pub default_algorithm: EncryptionAlgorithm,
}

const AUTOSAVE_WAIT_MS: &str = "storage.autosaveWaitMs";
const AUTOSAVE_DEADLINE_MS: &str = "storage.autosaveDeadlineMs";
const KDF: &str = "storage.kdf";
const DEFAULT_ALGORITHM: &str = "storage.defaultAlgorithm";

impl StorageConfig {
    /// Read overrides from `store`, falling back to the defaults for missing keys.
    ///
    /// A stored deadline of `null` disables the deadline.
    pub fn load(store: &ConfigStore) -> Result<Self> {
        let defaults = Self::default();
        let wait = store
            .get::<u64>(AUTOSAVE_WAIT_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.autosave.wait);
        let deadline = match store.get::<Option<u64>>(AUTOSAVE_DEADLINE_MS)? {
            Some(ms) => ms.map(Duration::from_millis),
            None => defaults.autosave.deadline,
        };
        Ok(Self {
            autosave: DebounceConfig { wait, deadline },
            kdf: store.get(KDF)?.unwrap_or(defaults.kdf),
            default_algorithm: store
                .get(DEFAULT_ALGORITHM)?
                .unwrap_or(defaults.default_algorithm),
        })
    }

    pub fn save(&self, store: &ConfigStore) -> Result<()> {
        store.set(AUTOSAVE_WAIT_MS, self.autosave.wait.as_millis() as u64)?;
        store.set(
            AUTOSAVE_DEADLINE_MS,
            self.autosave.deadline.map(|d| d.as_millis() as u64),
        )?;
        store.set(KDF, self.kdf)?;
        store.set(DEFAULT_ALGORITHM, self.default_algorithm)?;
        Ok(())
    }
}

/// Application settings persisted as one JSON object.
///
/// Opened once at startup and passed to whoever needs it; changes reach disk
/// on [`ConfigStore::flush`] or [`ConfigStore::close`].
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    dirty: AtomicBool,
}

impl ConfigStore {
    /// A missing file opens an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        notevault_fs::recover_atomic_file(&path)?;
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self.values.lock().expect("config mutex poisoned");
        match values.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.values.lock().expect("config mutex poisoned");
        if values.get(key) != Some(&value) {
            values.insert(key.to_string(), value);
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Returns whether the key was present.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self
            .values
            .lock()
            .expect("config mutex poisoned")
            .remove(key)
            .is_some();
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let bytes = {
            let values = self.values.lock().expect("config mutex poisoned");
            serde_json::to_vec_pretty(&*values)?
        };
        if let Err(err) = notevault_fs::atomic_write_bytes(&self.path, &bytes) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err.into());
        }
        log::debug!("saved config to {:?}", self.path);
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.flush()
    }
}
