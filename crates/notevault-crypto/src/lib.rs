//! Encryption primitives for notevault profiles.
//!
//! The layers stack bottom-up:
//!
//! - [`ctr`]: counter mode over an injected block-encrypt primitive.
//! - [`processor`]: a self-describing frame (`iv || ctr(pad(data))`) around one cipher.
//! - [`cascade`]: several processors chained, each with an independent key.
//! - [`algorithm`]: the named suites a profile stores in its metadata.
//! - [`worker`] and [`controller`]: the key lives on a dedicated thread and callers
//!   talk to it asynchronously.
//!
//! Password handling (Argon2id) lives in [`kdf`].

pub mod algorithm;
pub mod bytes;
pub mod cascade;
pub mod controller;
pub mod ctr;
mod error;
pub mod kdf;
pub mod processor;
pub mod worker;

pub use algorithm::{EncryptionAlgorithm, UnknownAlgorithm};
pub use cascade::CascadeCipher;
pub use controller::{EncryptionController, Payload};
pub use ctr::{BlockEncryptor, CounterModeCipher, RustCryptoBlock, DEFAULT_BLOCK_SIZE};
pub use error::{CryptoError, Result};
pub use kdf::{derive_key, generate_key, generate_salt, KdfParams, SALT_LEN};
pub use processor::{CipherProcessor, CounterModeProcessor};
pub use worker::CryptoWorker;
