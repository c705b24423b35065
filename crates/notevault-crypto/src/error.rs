use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// A buffer or IV handed to the counter-mode primitive is not block aligned.
    #[error("{what} length {len} is not a non-zero multiple of the {block_size}-byte block size")]
    BlockSizeMismatch {
        what: &'static str,
        len: usize,
        block_size: usize,
    },
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    /// The 32-bit block counter would wrap and repeat keystream.
    #[error("buffer of {blocks} blocks exceeds the 2^32-block counter range")]
    KeystreamExhausted { blocks: u64 },
    #[error("ciphertext frame is malformed ({len} bytes)")]
    InvalidFrame { len: usize },
    #[error("invalid padding after decryption")]
    InvalidPadding,
    #[error("decrypted text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("failed to start crypto worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("crypto worker has terminated")]
    WorkerTerminated,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
