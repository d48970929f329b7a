//! Per-slot ciphertext artifacts.
//!
//! One file per slot under the target directory, named from the scan stamp
//! and slot index. Writes are atomic (temp file, fsync, rename), so a slot
//! file is always either the previous complete artifact or the new one.
//! A store refuses a stamp that already has artifacts in its directory, so a
//! second scan can never overwrite what an earlier one left behind.
//! Only ciphertext ever reaches this module.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ARTIFACT_EXT: &str = "png.enc";

/// UTC timestamp naming every file one scan produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanStamp(DateTime<Utc>);

impl ScanStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Compact, sortable, filename-safe label with millisecond precision,
    /// e.g. `20240102T030405123Z`.
    pub fn label(&self) -> String {
        self.0.format("%Y%m%dT%H%M%S%3fZ").to_string()
    }
}

impl std::fmt::Display for ScanStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

pub struct ArtifactStore {
    root: PathBuf,
    stamp: ScanStamp,
}

impl ArtifactStore {
    pub fn new(root: &Path, stamp: ScanStamp) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create target directory {}", root.display()))?;
        let prefix = format!("scan-{}-", stamp.label());
        let entries =
            fs::read_dir(root).with_context(|| format!("list {}", root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("list {}", root.display()))?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Err(anyhow!(
                    "artifacts for scan {} already exist in {}",
                    stamp,
                    root.display()
                ));
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            stamp,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stamp(&self) -> ScanStamp {
        self.stamp
    }

    pub fn artifact_path(&self, slot: usize) -> PathBuf {
        self.root.join(artifact_file_name(self.stamp, slot))
    }

    /// Atomically replace the slot's artifact with `ciphertext`.
    pub fn write_artifact(&self, slot: usize, ciphertext: &[u8]) -> Result<PathBuf> {
        let path = self.artifact_path(slot);
        write_atomic(&path, ciphertext)?;
        log::debug!("store: wrote {} ({} bytes)", path.display(), ciphertext.len());
        Ok(path)
    }
}

pub fn artifact_file_name(stamp: ScanStamp, slot: usize) -> String {
    format!("scan-{}-slot{:02}.{}", stamp.label(), slot, ARTIFACT_EXT)
}

/// Write `data` beside `path`, fsync, then rename over `path`.
/// The temp file is removed when any step fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid artifact path {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("rename {} into place", tmp_path.display()))?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}
