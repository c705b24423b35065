use std::sync::Arc;

use notevault_crypto::EncryptionController;

use super::{normalize_path, FilesStorage};
use crate::error::Result;

/// One file of a storage.
#[derive(Clone)]
pub struct FileController {
    storage: Arc<dyn FilesStorage>,
    path: String,
}

impl FileController {
    pub fn new(storage: Arc<dyn FilesStorage>, path: &str) -> Result<Self> {
        Ok(Self {
            storage,
            path: normalize_path(path)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get(&self) -> Result<Option<Vec<u8>>> {
        self.storage.get(&self.path)
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.storage.write(&self.path, bytes)
    }

    pub fn delete(&self) -> Result<()> {
        self.storage.delete(&[self.path.as_str()])
    }
}

impl std::fmt::Debug for FileController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileController")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A [`FileController`] whose contents are encrypted at rest.
///
/// Writes are fully encrypted before anything touches the storage, and reads
/// are fully decrypted before they return.
#[derive(Debug, Clone)]
pub struct EncryptedFileController {
    file: FileController,
    encryption: EncryptionController,
}

impl EncryptedFileController {
    pub fn new(file: FileController, encryption: EncryptionController) -> Self {
        Self { file, encryption }
    }

    pub fn path(&self) -> &str {
        self.file.path()
    }

    pub async fn get(&self) -> Result<Option<Vec<u8>>> {
        match self.file.get()? {
            Some(bytes) => Ok(Some(self.encryption.decrypt(bytes).await?)),
            None => Ok(None),
        }
    }

    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let sealed = self.encryption.encrypt(bytes).await?;
        self.file.write(&sealed)
    }

    pub async fn delete(&self) -> Result<()> {
        self.file.delete()
    }
}
