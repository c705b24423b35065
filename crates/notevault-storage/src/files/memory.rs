use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{is_under, normalize_path, FilesStorage};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct InMemoryFilesStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryFilesStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().expect("files mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FilesStorage for InMemoryFilesStorage {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path)?;
        Ok(self.files.lock().expect("files mutex poisoned").get(&path).cloned())
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = normalize_path(path)?;
        self.files
            .lock()
            .expect("files mutex poisoned")
            .insert(path, bytes.to_vec());
        Ok(())
    }

    fn delete(&self, paths: &[&str]) -> Result<()> {
        let normalized = paths
            .iter()
            .map(|p| normalize_path(p))
            .collect::<Result<Vec<_>>>()?;
        let mut files = self.files.lock().expect("files mutex poisoned");
        for path in normalized {
            files.remove(&path);
        }
        Ok(())
    }

    fn delete_tree(&self, prefix: &str) -> Result<()> {
        let prefix = normalize_path(prefix)?;
        self.files
            .lock()
            .expect("files mutex poisoned")
            .retain(|path, _| !is_under(path, &prefix));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .expect("files mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }
}
