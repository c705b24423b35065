use aes::Aes256;
use notevault_crypto::{
    CascadeCipher, CipherProcessor, CounterModeCipher, CounterModeProcessor, CryptoError,
    EncryptionAlgorithm, RustCryptoBlock,
};
use proptest::prelude::*;
use twofish::Twofish;

fn decode(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str).expect("valid hex")
}

#[test]
fn aes256_counter_zero_block_matches_fips197() {
    // FIPS-197 C.3: with counter 0 the keystream block is E(iv).
    let key = decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
    let iv = decode("00112233445566778899aabbccddeeff");
    let ctr = CounterModeCipher::new(RustCryptoBlock::<Aes256>::new_from_slice(&key).expect("key"));

    let out = ctr.encrypt(&[0u8; 16], &iv).expect("encrypt");
    assert_eq!(hex::encode(out), "8ea2b7ca516745bfeafc49904b496089");
}

#[test]
fn twofish256_counter_zero_block_matches_reference_vector() {
    let ctr =
        CounterModeCipher::new(RustCryptoBlock::<Twofish>::new_from_slice(&[0u8; 32]).expect("key"));
    let out = ctr.encrypt(&[0u8; 16], &[0u8; 16]).expect("encrypt");
    assert_eq!(hex::encode(out), "57ff739d4dc92c1bd7fc01700cc8216f");
}

#[test]
fn cascade_order_matters() {
    let aes = || -> Box<dyn CipherProcessor> {
        Box::new(CounterModeProcessor::new(
            RustCryptoBlock::<Aes256>::new_from_slice(&[1u8; 32]).expect("key"),
        ))
    };
    let twofish = || -> Box<dyn CipherProcessor> {
        Box::new(CounterModeProcessor::new(
            RustCryptoBlock::<Twofish>::new_from_slice(&[2u8; 32]).expect("key"),
        ))
    };
    let forward = CascadeCipher::new(vec![aes(), twofish()]);
    let backward = CascadeCipher::new(vec![twofish(), aes()]);

    let frame = forward.encrypt(b"ordered").expect("encrypt");
    assert_eq!(forward.decrypt(&frame).expect("decrypt"), b"ordered");
    assert!(!matches!(backward.decrypt(&frame), Ok(ref plain) if plain == b"ordered"));
}

#[test]
fn wrong_key_fails_for_every_suite() {
    for alg in EncryptionAlgorithm::ALL {
        let right = alg.build(&vec![0x10u8; alg.key_len()]).expect("build");
        let wrong = alg.build(&vec![0x20u8; alg.key_len()]).expect("build");
        let frame = right.encrypt(&[0xEEu8; 40]).expect("encrypt");
        match wrong.decrypt(&frame) {
            Err(CryptoError::InvalidPadding) | Err(CryptoError::InvalidFrame { .. }) => {}
            Err(other) => panic!("unexpected error for {alg}: {other}"),
            Ok(plain) => assert_ne!(plain, vec![0xEEu8; 40]),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn counter_mode_is_self_inverse(
        blocks in 0usize..8,
        seed in any::<u8>(),
        iv_blocks in 1usize..4,
    ) {
        let ctr = CounterModeCipher::new(
            RustCryptoBlock::<Aes256>::new_from_slice(&[seed; 32]).expect("key"),
        );
        let data: Vec<u8> = (0..blocks * 16).map(|i| (i as u8).wrapping_mul(seed)).collect();
        let iv = vec![seed.wrapping_add(1); iv_blocks * 16];

        let once = ctr.encrypt(&data, &iv).expect("encrypt");
        prop_assert_eq!(once.len(), data.len());
        prop_assert_eq!(ctr.decrypt(&once, &iv).expect("decrypt"), data);
    }

    #[test]
    fn suites_round_trip_arbitrary_data(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        suite in 0usize..3,
    ) {
        let alg = EncryptionAlgorithm::ALL[suite];
        let cipher = alg.build(&vec![0x5Au8; alg.key_len()]).expect("build");
        let frame = cipher.encrypt(&data).expect("encrypt");
        prop_assert_eq!(cipher.decrypt(&frame).expect("decrypt"), data);
    }

    #[test]
    fn decrypting_garbage_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let alg = EncryptionAlgorithm::Aes256Twofish256Ctr;
        let cipher = alg.build(&vec![0x01u8; alg.key_len()]).expect("build");
        let _ = cipher.decrypt(&data);
    }
}
