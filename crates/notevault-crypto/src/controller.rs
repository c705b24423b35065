use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::algorithm::EncryptionAlgorithm;
use crate::error::Result;
use crate::worker::CryptoWorker;

/// Data the controller can carry. Text travels as base64 ciphertext and bytes
/// travel as raw frames, so the output type always matches the input type.
pub trait Payload: Sized + Send {
    fn into_plaintext(self) -> Result<Vec<u8>>;
    fn from_ciphertext(bytes: Vec<u8>) -> Self;
    fn into_ciphertext(self) -> Result<Vec<u8>>;
    fn from_plaintext(bytes: Vec<u8>) -> Result<Self>;
}

impl Payload for Vec<u8> {
    fn into_plaintext(self) -> Result<Vec<u8>> {
        Ok(self)
    }

    fn from_ciphertext(bytes: Vec<u8>) -> Self {
        bytes
    }

    fn into_ciphertext(self) -> Result<Vec<u8>> {
        Ok(self)
    }

    fn from_plaintext(bytes: Vec<u8>) -> Result<Self> {
        Ok(bytes)
    }
}

impl Payload for String {
    fn into_plaintext(self) -> Result<Vec<u8>> {
        Ok(self.into_bytes())
    }

    fn from_ciphertext(bytes: Vec<u8>) -> Self {
        BASE64.encode(bytes)
    }

    fn into_ciphertext(self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(self)?)
    }

    fn from_plaintext(bytes: Vec<u8>) -> Result<Self> {
        Ok(String::from_utf8(bytes)?)
    }
}

/// The encryption capability handed to everything that touches profile data.
///
/// `Placeholder` is used for unencrypted profiles and passes data through
/// untouched.
#[derive(Debug, Clone, Default)]
pub enum EncryptionController {
    #[default]
    Placeholder,
    Keyed(CryptoWorker),
}

impl EncryptionController {
    /// Build the cipher suite for `key` and move it onto a worker thread.
    pub fn keyed(algorithm: EncryptionAlgorithm, key: &[u8]) -> Result<Self> {
        let cipher = algorithm.build(key)?;
        Ok(EncryptionController::Keyed(CryptoWorker::spawn(cipher)?))
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, EncryptionController::Keyed(_))
    }

    pub async fn encrypt<T: Payload>(&self, data: T) -> Result<T> {
        match self {
            EncryptionController::Placeholder => Ok(data),
            EncryptionController::Keyed(worker) => {
                let frame = worker.encrypt(data.into_plaintext()?).await?;
                Ok(T::from_ciphertext(frame))
            }
        }
    }

    pub async fn decrypt<T: Payload>(&self, data: T) -> Result<T> {
        match self {
            EncryptionController::Placeholder => Ok(data),
            EncryptionController::Keyed(worker) => {
                let plain = worker.decrypt(data.into_ciphertext()?).await?;
                T::from_plaintext(plain)
            }
        }
    }

    /// Stop the worker. A no-op for the placeholder.
    pub fn terminate(&self) {
        if let EncryptionController::Keyed(worker) = self {
            worker.terminate();
        }
    }

    /// Stop the worker and wait until its key material is dropped.
    pub async fn shutdown(&self) {
        if let EncryptionController::Keyed(worker) = self {
            worker.shutdown().await;
        }
    }
}
