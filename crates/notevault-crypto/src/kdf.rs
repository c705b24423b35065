//! Password based key derivation (Argon2id).

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

pub const SALT_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(len),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new(vec![0u8; len]);
    argon
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Fresh random key material, e.g. a profile master key.
pub fn generate_key(len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: KdfParams = KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = derive_key(b"hunter2", &salt, &CHEAP, 32).expect("derive");
        let b = derive_key(b"hunter2", &salt, &CHEAP, 32).expect("derive");
        assert_eq!(a.len(), 32);
        assert_eq!(*a, *b);
    }

    #[test]
    fn password_and_salt_both_matter() {
        let salt = [7u8; SALT_LEN];
        let base = derive_key(b"hunter2", &salt, &CHEAP, 32).expect("derive");
        let other_pw = derive_key(b"hunter3", &salt, &CHEAP, 32).expect("derive");
        let other_salt = derive_key(b"hunter2", &[8u8; SALT_LEN], &CHEAP, 32).expect("derive");
        assert_ne!(*base, *other_pw);
        assert_ne!(*base, *other_salt);
    }

    #[test]
    fn invalid_params_are_reported() {
        let bad = KdfParams {
            memory_kib: 64,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            derive_key(b"pw", &[0u8; SALT_LEN], &bad, 32),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn salts_and_keys_are_random() {
        assert_eq!(generate_salt().len(), SALT_LEN);
        assert_ne!(generate_salt(), generate_salt());
        assert_ne!(*generate_key(32), *generate_key(32));
    }
}
