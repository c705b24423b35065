//! Counter mode over an injected block-encrypt primitive.
//!
//! For the chunk at byte offset `o` the keystream block is
//! `E(iv[o mod |iv| .. +block] ^ counter)` where `counter` is a big-endian `u32`
//! in the first four bytes of an otherwise zero block, starting at 0 and
//! incrementing once per chunk. The IV repeats when it is shorter than the
//! buffer. Encryption and decryption are the same operation.

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use zeroize::Zeroizing;

use crate::bytes::{ensure_block_multiple, xor_in_place};
use crate::error::{CryptoError, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 16;

const COUNTER_LEN: usize = 4;
const MAX_BLOCKS: u64 = 1 << 32;

/// The injected block-encrypt primitive.
pub trait BlockEncryptor: Send + Sync {
    fn block_size(&self) -> usize;

    /// Encrypt exactly one block in place.
    fn encrypt_block(&self, block: &mut [u8]);
}

/// Adapter from any RustCrypto block cipher to [`BlockEncryptor`].
pub struct RustCryptoBlock<C> {
    cipher: C,
}

impl<C> RustCryptoBlock<C>
where
    C: BlockEncrypt + KeyInit,
{
    pub fn new_from_slice(key: &[u8]) -> Result<Self> {
        let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: C::key_size(),
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }
}

impl<C> BlockEncryptor for RustCryptoBlock<C>
where
    C: BlockEncrypt + Send + Sync,
{
    fn block_size(&self) -> usize {
        C::block_size()
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

pub struct CounterModeCipher<B> {
    block: B,
}

impl<B: BlockEncryptor> CounterModeCipher<B> {
    pub fn new(block: B) -> Self {
        Self { block }
    }

    pub fn block_size(&self) -> usize {
        self.block.block_size()
    }

    pub fn encrypt(&self, buffer: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.apply_keystream(buffer, iv)
    }

    pub fn decrypt(&self, buffer: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.apply_keystream(buffer, iv)
    }

    fn apply_keystream(&self, buffer: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.block_size();
        ensure_block_multiple("buffer", buffer.len(), block_size)?;
        if iv.is_empty() {
            return Err(CryptoError::BlockSizeMismatch {
                what: "iv",
                len: 0,
                block_size,
            });
        }
        ensure_block_multiple("iv", iv.len(), block_size)?;

        let blocks = (buffer.len() / block_size) as u64;
        if blocks > MAX_BLOCKS {
            return Err(CryptoError::KeystreamExhausted { blocks });
        }

        let counter_len = COUNTER_LEN.min(block_size);
        let mut out = buffer.to_vec();
        let mut keystream = Zeroizing::new(vec![0u8; block_size]);
        for (index, chunk) in out.chunks_mut(block_size).enumerate() {
            let iv_start = (index * block_size) % iv.len();
            keystream.copy_from_slice(&iv[iv_start..iv_start + block_size]);

            let counter = (index as u64 as u32).to_be_bytes();
            xor_in_place(&mut keystream[..counter_len], &counter[..counter_len]);

            self.block.encrypt_block(&mut keystream);
            xor_in_place(chunk, &keystream);
        }
        Ok(out)
    }
}
