use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::bytes::{pad, unpad};
use crate::ctr::{BlockEncryptor, CounterModeCipher};
use crate::error::{CryptoError, Result};

/// One stage of a cipher pipeline.
pub trait CipherProcessor: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

impl<P: CipherProcessor + ?Sized> CipherProcessor for Box<P> {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        (**self).encrypt(data)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(data)
    }
}

/// Counter mode with a fresh random IV per message.
///
/// Frame layout: `iv (one block) || ctr(pkcs7_pad(plaintext))`. A frame decrypted
/// under the wrong key almost always fails the padding check, which callers
/// rely on to detect a bad password.
pub struct CounterModeProcessor<B> {
    cipher: CounterModeCipher<B>,
}

impl<B: BlockEncryptor> CounterModeProcessor<B> {
    pub fn new(block: B) -> Self {
        Self {
            cipher: CounterModeCipher::new(block),
        }
    }
}

impl<B: BlockEncryptor> CipherProcessor for CounterModeProcessor<B> {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.cipher.block_size();
        let mut iv = vec![0u8; block_size];
        OsRng.fill_bytes(&mut iv);

        let padded = Zeroizing::new(pad(data, block_size));
        let body = self.cipher.encrypt(&padded, &iv)?;

        let mut frame = Vec::with_capacity(iv.len() + body.len());
        frame.extend_from_slice(&iv);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.cipher.block_size();
        if frame.len() < 2 * block_size || frame.len() % block_size != 0 {
            return Err(CryptoError::InvalidFrame { len: frame.len() });
        }
        let (iv, body) = frame.split_at(block_size);
        let padded = self.cipher.decrypt(body, iv)?;
        unpad(padded, block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctr::RustCryptoBlock;
    use aes::Aes256;

    fn processor(key: u8) -> CounterModeProcessor<RustCryptoBlock<Aes256>> {
        CounterModeProcessor::new(RustCryptoBlock::new_from_slice(&[key; 32]).expect("key"))
    }

    #[test]
    fn frame_is_iv_plus_padded_body() {
        let p = processor(1);
        assert_eq!(p.encrypt(b"").expect("encrypt").len(), 32);
        assert_eq!(p.encrypt(&[0u8; 15]).expect("encrypt").len(), 32);
        assert_eq!(p.encrypt(&[0u8; 16]).expect("encrypt").len(), 48);
    }

    #[test]
    fn round_trips_and_uses_fresh_ivs() {
        let p = processor(2);
        let a = p.encrypt(b"hello vault").expect("encrypt");
        let b = p.encrypt(b"hello vault").expect("encrypt");
        assert_ne!(a, b);
        assert_eq!(p.decrypt(&a).expect("decrypt"), b"hello vault");
        assert_eq!(p.decrypt(&b).expect("decrypt"), b"hello vault");
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let p = processor(3);
        assert!(matches!(p.decrypt(&[]), Err(CryptoError::InvalidFrame { len: 0 })));
        assert!(matches!(p.decrypt(&[0u8; 16]), Err(CryptoError::InvalidFrame { len: 16 })));
        assert!(matches!(p.decrypt(&[0u8; 33]), Err(CryptoError::InvalidFrame { len: 33 })));
    }

    #[test]
    fn wrong_key_fails_consistency_check() {
        let frame = processor(4).encrypt(b"secret notes").expect("encrypt");
        let other = processor(5);
        // A 1/256 chance of a lucky 0x01 pad byte exists; try a few messages.
        let failures = (0..8)
            .map(|i| {
                let frame = processor(4).encrypt(&[i; 20]).expect("encrypt");
                other.decrypt(&frame).is_err()
            })
            .filter(|failed| *failed)
            .count();
        assert!(failures >= 7);
        assert_ne!(other.decrypt(&frame).ok().as_deref(), Some(&b"secret notes"[..]));
    }
}
