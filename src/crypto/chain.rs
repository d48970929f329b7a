use anyhow::{anyhow, Context, Result};
use zeroize::Zeroizing;

use crate::crypto::envelope::{is_stage, StageEnvelope};
use crate::crypto::keys::RecipientSecret;
use crate::crypto::provider::{open_stage, EncryptionProvider};

/// Encrypt `plaintext` once per recipient, feeding each stage's output into the next.
///
/// The result is decryptable only by peeling recipients off in reverse order.
/// Any stage failure aborts the whole chain and no intermediate output escapes.
pub fn encrypt_chained<P: EncryptionProvider + ?Sized>(
    provider: &P,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let recipients = provider.recipients();
    if recipients.is_empty() {
        return Err(anyhow!("encryption chain has no recipients"));
    }

    let mut data: Option<Vec<u8>> = None;
    for (stage, recipient) in recipients.iter().enumerate() {
        let input = data.as_deref().unwrap_or(plaintext);
        let sealed = provider
            .encrypt_stage(input, recipient)
            .with_context(|| format!("encryption stage {} ({}) failed", stage, recipient))?;
        log::debug!(
            "encryption stage {} for {}: {} -> {} bytes",
            stage,
            recipient,
            input.len(),
            sealed.len()
        );
        data = Some(sealed);
    }
    data.ok_or_else(|| anyhow!("encryption chain produced no output"))
}

/// Peel every stage off `ciphertext`, picking the secret that matches each layer.
///
/// Stops when the payload no longer carries a stage header.
pub fn decrypt_chained(
    ciphertext: &[u8],
    secrets: &[RecipientSecret],
) -> Result<Zeroizing<Vec<u8>>> {
    if !is_stage(ciphertext) {
        return Err(anyhow!("input is not an encrypted artifact"));
    }
    let mut data = Zeroizing::new(ciphertext.to_vec());
    let mut layers = 0usize;
    while is_stage(&data) {
        let envelope = StageEnvelope::decode(&data)?;
        let secret = secrets
            .iter()
            .find(|s| s.id() == envelope.recipient)
            .ok_or_else(|| {
                anyhow!(
                    "no secret key for layer {} (sealed to {})",
                    layers,
                    envelope.recipient
                )
            })?;
        data = open_stage(&data, secret)?;
        layers += 1;
    }
    log::debug!("peeled {} encryption layers", layers);
    Ok(data)
}
