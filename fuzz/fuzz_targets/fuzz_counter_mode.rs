#![no_main]

use aes::Aes256;
use libfuzzer_sys::fuzz_target;
use notevault_crypto::{CounterModeCipher, RustCryptoBlock};

/// Bound the work per input.
const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 + 16 || data.len() > MAX_INPUT_BYTES {
        return;
    }
    let (key, rest) = data.split_at(32);
    let (iv, body) = rest.split_at(16);
    let Ok(block) = RustCryptoBlock::<Aes256>::new_from_slice(key) else {
        return;
    };
    let ctr = CounterModeCipher::new(block);

    match ctr.encrypt(body, iv) {
        Ok(sealed) => {
            assert_eq!(sealed.len(), body.len());
            let opened = ctr.decrypt(&sealed, iv).expect("aligned input must decrypt");
            assert_eq!(opened, body);
            // Self-inverse.
            let twice = ctr.encrypt(&sealed, iv).expect("aligned input must encrypt");
            assert_eq!(twice, body);
        }
        Err(_) => assert_ne!(body.len() % 16, 0),
    }
});
