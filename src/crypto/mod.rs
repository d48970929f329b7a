//! Recipient keys and the chained encryption pipeline.
//!
//! - `keys`: X25519 recipient keypairs stored as hex text files.
//! - `provider`: the `EncryptionProvider` capability and its X25519 sealed-box implementation.
//! - `envelope`: wire format of one encryption stage.
//! - `chain`: encrypt once per recipient in order; decrypt by peeling in reverse.

pub mod chain;
pub mod envelope;
pub mod keys;
pub mod provider;

pub use chain::{decrypt_chained, encrypt_chained};
pub use keys::{RecipientId, RecipientKey, RecipientSecret};
pub use provider::{open_stage, EncryptionProvider, X25519Provider};
