use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::Mutex;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{is_under, normalize_path, FilesStorage};
use crate::error::Result;

/// A zip archive held in memory. Changes become durable only through
/// [`ZipFilesStorage::save`] (or by persisting [`ZipFilesStorage::to_bytes`]).
#[derive(Debug, Default)]
pub struct ZipFilesStorage {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl ZipFilesStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        Self::read_archive(&mut archive)
    }

    /// Load an archive from disk; a missing file yields an empty archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read(path.as_ref()) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn read_archive<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            // Entry names come from untrusted input; skip anything outside the root.
            let name = match normalize_path(file.name()) {
                Ok(name) => name,
                Err(err) => {
                    log::warn!("skipping zip entry {:?}: {err}", file.name());
                    continue;
                }
            };
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            entries.insert(name, buf);
        }
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let entries = self.entries.lock().expect("zip mutex poisoned");
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in entries.iter() {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Atomically replace `path` with the current archive.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        notevault_fs::atomic_write_bytes(path, &bytes)?;
        Ok(())
    }
}

impl FilesStorage for ZipFilesStorage {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path)?;
        Ok(self.entries.lock().expect("zip mutex poisoned").get(&path).cloned())
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = normalize_path(path)?;
        self.entries
            .lock()
            .expect("zip mutex poisoned")
            .insert(path, bytes.to_vec());
        Ok(())
    }

    fn delete(&self, paths: &[&str]) -> Result<()> {
        let normalized = paths
            .iter()
            .map(|p| normalize_path(p))
            .collect::<Result<Vec<_>>>()?;
        let mut entries = self.entries.lock().expect("zip mutex poisoned");
        for path in normalized {
            entries.remove(&path);
        }
        Ok(())
    }

    fn delete_tree(&self, prefix: &str) -> Result<()> {
        let prefix = normalize_path(prefix)?;
        self.entries
            .lock()
            .expect("zip mutex poisoned")
            .retain(|path, _| !is_under(path, &prefix));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .expect("zip mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }
}
