use std::fmt;
use std::str::FromStr;

use aes::Aes256;
use serde::{Deserialize, Serialize};
use twofish::Twofish;

use crate::cascade::CascadeCipher;
use crate::ctr::RustCryptoBlock;
use crate::error::{CryptoError, Result};
use crate::processor::{CipherProcessor, CounterModeProcessor};

/// Bytes of key material consumed by each cipher stage.
pub const STAGE_KEY_LEN: usize = 32;

/// The cipher suites a profile can be encrypted with.
///
/// The serialized names are stored in `profile.json` and must stay stable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[default]
    #[serde(rename = "aes256-ctr")]
    Aes256Ctr,
    #[serde(rename = "twofish256-ctr")]
    Twofish256Ctr,
    #[serde(rename = "aes256-twofish256-ctr")]
    Aes256Twofish256Ctr,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Aes256,
    Twofish256,
}

impl Stage {
    fn processor(self, key: &[u8]) -> Result<Box<dyn CipherProcessor>> {
        Ok(match self {
            Stage::Aes256 => Box::new(CounterModeProcessor::new(
                RustCryptoBlock::<Aes256>::new_from_slice(key)?,
            )),
            Stage::Twofish256 => Box::new(CounterModeProcessor::new(
                RustCryptoBlock::<Twofish>::new_from_slice(key)?,
            )),
        })
    }
}

impl EncryptionAlgorithm {
    pub const ALL: [EncryptionAlgorithm; 3] = [
        EncryptionAlgorithm::Aes256Ctr,
        EncryptionAlgorithm::Twofish256Ctr,
        EncryptionAlgorithm::Aes256Twofish256Ctr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256Ctr => "aes256-ctr",
            EncryptionAlgorithm::Twofish256Ctr => "twofish256-ctr",
            EncryptionAlgorithm::Aes256Twofish256Ctr => "aes256-twofish256-ctr",
        }
    }

    fn stages(&self) -> &'static [Stage] {
        match self {
            EncryptionAlgorithm::Aes256Ctr => &[Stage::Aes256],
            EncryptionAlgorithm::Twofish256Ctr => &[Stage::Twofish256],
            EncryptionAlgorithm::Aes256Twofish256Ctr => &[Stage::Aes256, Stage::Twofish256],
        }
    }

    /// Length of the master key this suite expects.
    pub fn key_len(&self) -> usize {
        self.stages().len() * STAGE_KEY_LEN
    }

    /// Build the cascade for `key`, giving each stage its own slice of the key.
    pub fn build(&self, key: &[u8]) -> Result<CascadeCipher> {
        if key.len() != self.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        let processors = self
            .stages()
            .iter()
            .zip(key.chunks(STAGE_KEY_LEN))
            .map(|(stage, stage_key)| stage.processor(stage_key))
            .collect::<Result<Vec<_>>>()?;
        Ok(CascadeCipher::new(processors))
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encryption algorithm `{0}`")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for EncryptionAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EncryptionAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}
