use anyhow::{anyhow, Result};

use crate::crypto::keys::{RecipientId, FINGERPRINT_LEN};

pub const STAGE_MAGIC: &[u8; 4] = b"TXE1";
pub const STAGE_VERSION: u8 = 1;
pub const EPHEMERAL_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Maximum allowed payload size (1 GiB) to prevent memory exhaustion.
const MAX_PAYLOAD_LEN: usize = 1024 * 1024 * 1024;

/// Fixed-size header preceding the payload length.
pub const HEADER_LEN: usize = STAGE_MAGIC.len() + 1 + FINGERPRINT_LEN + EPHEMERAL_LEN + NONCE_LEN;

/// One layer of the encryption chain, sealed to a single recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageEnvelope {
    pub recipient: RecipientId,
    pub ephemeral: [u8; EPHEMERAL_LEN],
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the trailing AEAD tag.
    pub payload: Vec<u8>,
}

impl StageEnvelope {
    /// Header bytes, also used as AEAD associated data.
    pub fn header(&self) -> Vec<u8> {
        encode_header(&self.recipient, &self.ephemeral, &self.nonce)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 4 + self.payload.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if !is_stage(bytes) {
            return Err(anyhow!("not an encrypted stage envelope"));
        }
        let mut cursor = STAGE_MAGIC.len();
        let version = read_slice(bytes, &mut cursor, 1)?[0];
        if version != STAGE_VERSION {
            return Err(anyhow!("unsupported stage envelope version {}", version));
        }
        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(read_slice(bytes, &mut cursor, FINGERPRINT_LEN)?);
        let mut ephemeral = [0u8; EPHEMERAL_LEN];
        ephemeral.copy_from_slice(read_slice(bytes, &mut cursor, EPHEMERAL_LEN)?);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(read_slice(bytes, &mut cursor, NONCE_LEN)?);

        let len = read_u32(bytes, &mut cursor)? as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(anyhow!(
                "payload length {} exceeds maximum {}",
                len,
                MAX_PAYLOAD_LEN
            ));
        }
        if len < TAG_LEN {
            return Err(anyhow!("stage payload truncated"));
        }
        let payload = read_slice(bytes, &mut cursor, len)?.to_vec();
        if cursor != bytes.len() {
            return Err(anyhow!("trailing bytes after stage envelope"));
        }
        Ok(Self {
            recipient: RecipientId::from_bytes(fingerprint),
            ephemeral,
            nonce,
            payload,
        })
    }
}

/// True when `bytes` carries the stage magic.
pub fn is_stage(bytes: &[u8]) -> bool {
    bytes.starts_with(STAGE_MAGIC)
}

pub(crate) fn encode_header(
    recipient: &RecipientId,
    ephemeral: &[u8; EPHEMERAL_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(STAGE_MAGIC);
    out.push(STAGE_VERSION);
    out.extend_from_slice(recipient.as_bytes());
    out.extend_from_slice(ephemeral);
    out.extend_from_slice(nonce);
    out
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| anyhow!("invalid stage envelope encoding"))?;
    if end > bytes.len() {
        return Err(anyhow!("invalid stage envelope encoding"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StageEnvelope {
        StageEnvelope {
            recipient: RecipientId::from_bytes([1u8; FINGERPRINT_LEN]),
            ephemeral: [2u8; EPHEMERAL_LEN],
            nonce: [3u8; NONCE_LEN],
            payload: vec![4u8; 40],
        }
    }

    #[test]
    fn decodes_what_it_encodes() {
        let envelope = sample();
        let decoded = StageEnvelope::decode(&envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn rejects_oversized_payload_length() {
        let mut bytes = sample().encode();
        bytes[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = StageEnvelope::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn rejects_truncated_and_foreign_input() {
        let bytes = sample().encode();
        assert!(StageEnvelope::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(StageEnvelope::decode(b"\x89PNG\r\n").is_err());
        assert!(StageEnvelope::decode(&STAGE_MAGIC[..]).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample().encode();
        bytes[STAGE_MAGIC.len()] = 9;
        let err = StageEnvelope::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported stage envelope version"));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample().encode();
        bytes.push(0);
        assert!(StageEnvelope::decode(&bytes).is_err());
    }
}
