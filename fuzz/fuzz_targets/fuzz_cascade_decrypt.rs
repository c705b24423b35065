#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_crypto::{CipherProcessor, EncryptionAlgorithm};

const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > MAX_INPUT_BYTES {
        return;
    }
    let alg = EncryptionAlgorithm::ALL[data[0] as usize % EncryptionAlgorithm::ALL.len()];
    let key = vec![0xA5u8; alg.key_len()];
    let cascade = alg.build(&key).expect("fixed key has the right length");

    // Arbitrary ciphertext must fail cleanly, never panic.
    let _ = cascade.decrypt(&data[1..]);

    let sealed = cascade.encrypt(&data[1..]).expect("encrypt");
    assert_eq!(cascade.decrypt(&sealed).expect("decrypt"), &data[1..]);
});
