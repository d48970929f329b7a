use anyhow::{anyhow, Result};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Fingerprint length in bytes (16 hex characters).
pub const FINGERPRINT_LEN: usize = 8;

pub const PUBLIC_KEY_EXT: &str = "pub";
pub const SECRET_KEY_EXT: &str = "key";

/// Short, stable recipient identifier: truncated SHA-256 of the public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecipientId([u8; FINGERPRINT_LEN]);

impl RecipientId {
    pub fn of(public: &PublicKey) -> Self {
        let digest = Sha256::digest(public.as_bytes());
        let mut id = [0u8; FINGERPRINT_LEN];
        id.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Public half of a recipient keypair.
#[derive(Clone, Debug)]
pub struct RecipientKey {
    public: PublicKey,
    id: RecipientId,
}

impl RecipientKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let public = PublicKey::from(bytes);
        Self {
            id: RecipientId::of(&public),
            public,
        }
    }

    pub fn id(&self) -> RecipientId {
        self.id
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Read a hex-encoded public key file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut bytes = read_hex_key(path, "public")?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }
}

/// Secret half of a recipient keypair. Zeroized on drop.
pub struct RecipientSecret {
    secret: StaticSecret,
    public: PublicKey,
}

impl RecipientSecret {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(mut bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        Self::from_secret(secret)
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn recipient(&self) -> RecipientKey {
        RecipientKey::from_bytes(self.public.to_bytes())
    }

    pub fn id(&self) -> RecipientId {
        RecipientId::of(&self.public)
    }

    pub(crate) fn static_secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Read a hex-encoded secret key file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_hex_key(path, "secret")?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Write `<dir>/<name>.pub` and `<dir>/<name>.key`. Refuses to overwrite either file.
pub fn write_keypair(
    dir: &Path,
    name: &str,
    secret: &RecipientSecret,
) -> Result<(PathBuf, PathBuf)> {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return Err(anyhow!("key name must be a plain file stem"));
    }
    fs::create_dir_all(dir)
        .map_err(|e| anyhow!("failed to create key directory {}: {}", dir.display(), e))?;

    let public_path = dir.join(format!("{}.{}", name, PUBLIC_KEY_EXT));
    let secret_path = dir.join(format!("{}.{}", name, SECRET_KEY_EXT));
    if public_path.exists() || secret_path.exists() {
        return Err(anyhow!("keypair '{}' already exists in {}", name, dir.display()));
    }

    let mut secret_hex = hex::encode(secret.static_secret().to_bytes());
    let written = write_key_file(&secret_path, &secret_hex, 0o600);
    secret_hex.zeroize();
    written?;
    write_key_file(&public_path, &hex::encode(secret.public.as_bytes()), 0o644)?;
    Ok((public_path, secret_path))
}

/// Sorted list of `*.pub` files in `dir`.
pub fn public_keys_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to read key directory {}: {}", dir.display(), e))?;
    let mut keys = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == PUBLIC_KEY_EXT) {
            keys.push(path);
        }
    }
    keys.sort();
    Ok(keys)
}

fn read_hex_key(path: &Path, kind: &str) -> Result<[u8; 32]> {
    let mut contents = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {} key {}: {}", kind, path.display(), e))?;
    let decoded = hex::decode(contents.trim());
    contents.zeroize();
    let mut decoded =
        decoded.map_err(|_| anyhow!("{} key {} is not valid hex", kind, path.display()))?;
    if decoded.len() != 32 {
        decoded.zeroize();
        return Err(anyhow!(
            "{} key {} must be 32 bytes, got {}",
            kind,
            path.display(),
            decoded.len()
        ));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&decoded);
    decoded.zeroize();
    Ok(out)
}

fn write_key_file(path: &Path, hex_key: &str, mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .map_err(|e| anyhow!("failed to create key file {}: {}", path.display(), e))?;
    file.write_all(hex_key.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .map_err(|e| anyhow!("failed to write key file {}: {}", path.display(), e))
}
