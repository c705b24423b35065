//! Byte-buffer helpers shared by the cipher layers.

use crate::error::{CryptoError, Result};

/// XOR `src` into `dst`.
///
/// Both slices must have the same length; a mismatch is a bug in the caller.
pub fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "xor operands must have equal length");
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = a.to_vec();
    xor_in_place(&mut out, b);
    out
}

/// Fail with [`CryptoError::BlockSizeMismatch`] unless `len` is a multiple of `block_size`.
pub fn ensure_block_multiple(what: &'static str, len: usize, block_size: usize) -> Result<()> {
    if block_size == 0 || len % block_size != 0 {
        return Err(CryptoError::BlockSizeMismatch {
            what,
            len,
            block_size,
        });
    }
    Ok(())
}

/// PKCS#7 padding: always appends between 1 and `block_size` bytes.
///
/// `block_size` must fit in a byte.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=255).contains(&block_size));
    let pad_len = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

/// Strip PKCS#7 padding added by [`pad`].
pub fn unpad(mut data: Vec<u8>, block_size: usize) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(CryptoError::InvalidPadding);
    }
    let pad_len = data[data.len() - 1] as usize;
    if pad_len == 0 || pad_len > block_size {
        return Err(CryptoError::InvalidPadding);
    }
    let tail = &data[data.len() - pad_len..];
    // Fold the comparison so every padding byte is inspected.
    let mismatch = tail.iter().fold(0u8, |acc, b| acc | (b ^ pad_len as u8));
    if mismatch != 0 {
        return Err(CryptoError::InvalidPadding);
    }
    data.truncate(data.len() - pad_len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_self_inverse() {
        let a = b"0123456789abcdef";
        let b = [0x5au8; 16];
        let once = xor(a, &b);
        assert_ne!(&once[..], &a[..]);
        assert_eq!(xor(&once, &b), a.to_vec());
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn xor_rejects_mismatched_lengths() {
        let mut dst = [0u8; 4];
        xor_in_place(&mut dst, &[1, 2, 3]);
    }

    #[test]
    fn block_multiple_check() {
        assert!(ensure_block_multiple("buffer", 32, 16).is_ok());
        assert!(ensure_block_multiple("buffer", 0, 16).is_ok());
        let err = ensure_block_multiple("iv", 15, 16).expect_err("misaligned");
        assert!(matches!(
            err,
            CryptoError::BlockSizeMismatch {
                what: "iv",
                len: 15,
                block_size: 16
            }
        ));
    }

    #[test]
    fn padding_always_adds_bytes() {
        assert_eq!(pad(b"", 16), vec![16u8; 16]);
        let aligned = pad(&[7u8; 16], 16);
        assert_eq!(aligned.len(), 32);
        assert_eq!(&aligned[16..], &[16u8; 16]);
        let short = pad(b"abc", 8);
        assert_eq!(short, b"abc\x05\x05\x05\x05\x05".to_vec());
        assert_eq!(unpad(short, 8).expect("unpad"), b"abc".to_vec());
    }

    #[test]
    fn unpad_rejects_garbage() {
        assert!(matches!(unpad(vec![], 16), Err(CryptoError::InvalidPadding)));
        assert!(matches!(unpad(vec![0u8; 16], 16), Err(CryptoError::InvalidPadding)));
        assert!(matches!(unpad(vec![17u8; 16], 16), Err(CryptoError::InvalidPadding)));
        let mut bad = vec![3u8; 16];
        bad[14] = 9;
        assert!(matches!(unpad(bad, 16), Err(CryptoError::InvalidPadding)));
    }
}
