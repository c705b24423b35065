use std::sync::Arc;

use super::{join_path, normalize_path, FilesStorage};
use crate::error::Result;

/// A view of the subtree `prefix/` of another storage.
#[derive(Clone)]
pub struct ScopedFilesStorage {
    inner: Arc<dyn FilesStorage>,
    prefix: String,
}

impl ScopedFilesStorage {
    pub fn new(inner: Arc<dyn FilesStorage>, prefix: &str) -> Result<Self> {
        Ok(Self {
            inner,
            prefix: normalize_path(prefix)?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl std::fmt::Debug for ScopedFilesStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedFilesStorage")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl FilesStorage for ScopedFilesStorage {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(&join_path(&self.prefix, path)?)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.inner.write(&join_path(&self.prefix, path)?, bytes)
    }

    fn delete(&self, paths: &[&str]) -> Result<()> {
        let full = paths
            .iter()
            .map(|p| join_path(&self.prefix, p))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        self.inner.delete(&refs)
    }

    fn delete_tree(&self, prefix: &str) -> Result<()> {
        self.inner.delete_tree(&join_path(&self.prefix, prefix)?)
    }

    fn list(&self) -> Result<Vec<String>> {
        let marker = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list()?
            .into_iter()
            .filter_map(|p| p.strip_prefix(&marker).map(str::to_string))
            .collect())
    }
}
