//! The file-namespace contract and its backends.
//!
//! Paths are `/`-separated and relative to the backend's root. They are
//! normalised before use and anything that would escape the root is rejected.

mod archive;
mod encrypted;
mod fs;
mod memory;
mod scoped;

use std::sync::Arc;

pub use archive::ZipFilesStorage;
pub use encrypted::{EncryptedFileController, FileController};
pub use fs::FsFilesStorage;
pub use memory::InMemoryFilesStorage;
pub use scoped::ScopedFilesStorage;

use crate::error::{Result, StorageError};

pub trait FilesStorage: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Missing files are ignored.
    fn delete(&self, paths: &[&str]) -> Result<()>;

    /// Remove every file under `prefix/`, including any the backend keeps
    /// out of [`FilesStorage::list`]. A missing prefix is ignored.
    fn delete_tree(&self, prefix: &str) -> Result<()>;

    /// Every stored file, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

impl<S: FilesStorage + ?Sized> FilesStorage for Arc<S> {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(path)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        (**self).write(path, bytes)
    }

    fn delete(&self, paths: &[&str]) -> Result<()> {
        (**self).delete(paths)
    }

    fn delete_tree(&self, prefix: &str) -> Result<()> {
        (**self).delete_tree(prefix)
    }

    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }
}

/// Resolve `.` and `..` segments and collapse separators.
///
/// Absolute paths, drive prefixes and `..` segments that climb above the root
/// fail with [`StorageError::PathTraversal`]. Both `/` and `\` separate segments.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(StorageError::PathTraversal(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(|c: char| c == '/' || c == '\\') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::PathTraversal(path.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Whether the normalised `path` lies under the normalised `prefix`.
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// `prefix/path` with the result normalised.
pub(crate) fn join_path(prefix: &str, path: &str) -> Result<String> {
    let relative = normalize_path(path)?;
    Ok(format!("{prefix}/{relative}"))
}
