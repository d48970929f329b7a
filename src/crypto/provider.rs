use anyhow::{anyhow, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::envelope::{encode_header, StageEnvelope, EPHEMERAL_LEN, NONCE_LEN};
use crate::crypto::keys::{RecipientId, RecipientKey, RecipientSecret};

const STAGE_KDF_INFO: &[u8] = b"taxicam:stage:v1";

/// Public-key encryption capability consumed by the persist pipeline.
///
/// The recipient list is fixed for the lifetime of the provider and is
/// never empty.
pub trait EncryptionProvider {
    /// Ordered recipient identifiers; the chain encrypts in this order.
    fn recipients(&self) -> &[RecipientId];

    /// Encrypt `bytes` to a single recipient.
    fn encrypt_stage(&self, bytes: &[u8], recipient: &RecipientId) -> Result<Vec<u8>>;
}

/// X25519 + HKDF-SHA256 + ChaCha20-Poly1305 sealed-box provider.
///
/// Each stage uses a fresh ephemeral key, so only the holder of the
/// recipient's secret can open it.
#[derive(Clone, Debug)]
pub struct X25519Provider {
    keys: Vec<RecipientKey>,
    ids: Vec<RecipientId>,
}

impl X25519Provider {
    pub fn new(keys: Vec<RecipientKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(anyhow!("at least one recipient key is required"));
        }
        let ids = keys.iter().map(RecipientKey::id).collect();
        Ok(Self { keys, ids })
    }

    /// Load recipients from public key files, keeping the given order.
    pub fn from_key_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let keys = paths
            .iter()
            .map(|p| RecipientKey::load(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(keys)
    }

    fn key_for(&self, recipient: &RecipientId) -> Result<&RecipientKey> {
        self.keys
            .iter()
            .find(|k| k.id() == *recipient)
            .ok_or_else(|| anyhow!("unknown recipient {}", recipient))
    }
}

impl EncryptionProvider for X25519Provider {
    fn recipients(&self) -> &[RecipientId] {
        &self.ids
    }

    fn encrypt_stage(&self, bytes: &[u8], recipient: &RecipientId) -> Result<Vec<u8>> {
        let key = self.key_for(recipient)?;
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(key.public());
        let stage_key = derive_stage_key(&shared, &ephemeral_public, key.public())?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ephemeral_bytes: [u8; EPHEMERAL_LEN] = ephemeral_public.to_bytes();
        let header = encode_header(recipient, &ephemeral_bytes, &nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(stage_key.as_slice()));
        let payload = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: bytes,
                    aad: &header,
                },
            )
            .map_err(|_| anyhow!("stage encryption failed for {}", recipient))?;

        Ok(StageEnvelope {
            recipient: *recipient,
            ephemeral: ephemeral_bytes,
            nonce,
            payload,
        }
        .encode())
    }
}

/// Open one stage with the matching secret key.
pub fn open_stage(bytes: &[u8], secret: &RecipientSecret) -> Result<Zeroizing<Vec<u8>>> {
    let envelope = StageEnvelope::decode(bytes)?;
    if envelope.recipient != secret.id() {
        return Err(anyhow!(
            "stage is sealed to {}, not {}",
            envelope.recipient,
            secret.id()
        ));
    }
    let ephemeral_public = PublicKey::from(envelope.ephemeral);
    let shared = secret.static_secret().diffie_hellman(&ephemeral_public);
    let recipient_public = secret.recipient();
    let stage_key = derive_stage_key(&shared, &ephemeral_public, recipient_public.public())?;

    let header = envelope.header();
    let cipher = ChaCha20Poly1305::new(Key::from_slice(stage_key.as_slice()));
    let clear = cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.payload,
                aad: &header,
            },
        )
        .map_err(|_| anyhow!("stage decryption failed for {}", envelope.recipient))?;
    Ok(Zeroizing::new(clear))
}

fn derive_stage_key(
    shared: &SharedSecret,
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    if !shared.was_contributory() {
        return Err(anyhow!("recipient key is a low-order point"));
    }
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(STAGE_KDF_INFO, okm.as_mut_slice())
        .map_err(|e| anyhow!("stage key derivation failed: {}", e))?;
    salt.zeroize();
    Ok(okm)
}
