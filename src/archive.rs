//! Scan archive.
//!
//! Bundles every finalized slot artifact into one `scan-<stamp>.tar.gz`, then
//! deletes the originals. The archive is complete on disk (temp file, fsync,
//! rename) before anything is deleted, so a failed write leaves every artifact
//! where it was. An existing archive of the same name is never replaced.
//!
//! Entry metadata is fixed (mode 0600, mtime 0, uid/gid 0) and the gzip header
//! carries no timestamp: the same manifest always yields the same bytes.

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::store::ScanStamp;

pub const ARCHIVE_EXT: &str = "tar.gz";
const ENTRY_MODE: u32 = 0o600;

/// Finalized artifact paths of one scan, in slot order. Consumed once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub stamp: ScanStamp,
    pub entries: Vec<PathBuf>,
}

impl ArchiveManifest {
    pub fn new(stamp: ScanStamp, entries: Vec<PathBuf>) -> Self {
        Self { stamp, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Written {
        path: PathBuf,
        entries: usize,
        /// Originals that could not be deleted after the archive was written.
        leftover: Vec<PathBuf>,
    },
    /// The scan kept no artifacts; no archive file was created.
    NothingCaptured,
}

impl ArchiveOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArchiveOutcome::Written { path, .. } => Some(path),
            ArchiveOutcome::NothingCaptured => None,
        }
    }
}

pub struct Archiver {
    dir: PathBuf,
}

impl Archiver {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn archive_path(&self, stamp: ScanStamp) -> PathBuf {
        self.dir.join(archive_file_name(stamp))
    }

    /// Write the archive, then delete the originals.
    pub fn archive(&self, manifest: ArchiveManifest) -> Result<ArchiveOutcome> {
        if manifest.is_empty() {
            log::info!("archive: nothing captured for scan {}", manifest.stamp);
            return Ok(ArchiveOutcome::NothingCaptured);
        }
        let path = self.write_archive(&manifest)?;

        let mut leftover = Vec::new();
        for entry in &manifest.entries {
            if let Err(err) = fs::remove_file(entry) {
                log::warn!(
                    "archive: failed to remove {} after archiving: {}",
                    entry.display(),
                    err
                );
                leftover.push(entry.clone());
            }
        }
        log::info!(
            "archive: wrote {} with {} artifact(s)",
            path.display(),
            manifest.entries.len()
        );
        Ok(ArchiveOutcome::Written {
            path,
            entries: manifest.entries.len(),
            leftover,
        })
    }

    /// Write the archive without touching the originals.
    pub fn write_archive(&self, manifest: &ArchiveManifest) -> Result<PathBuf> {
        if manifest.is_empty() {
            return Err(anyhow!("refusing to write an empty archive"));
        }
        let names = entry_names(&manifest.entries)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create archive directory {}", self.dir.display()))?;

        let path = self.archive_path(manifest.stamp);
        if path.exists() {
            return Err(anyhow!(
                "archive {} already exists; refusing to replace it",
                path.display()
            ));
        }
        let mut tmp_name = archive_file_name(manifest.stamp);
        tmp_name.push_str(".tmp");
        let tmp_path = self.dir.join(tmp_name);

        let written = write_tar_gz(&tmp_path, &manifest.entries, &names).and_then(|_| {
            fs::rename(&tmp_path, &path)
                .with_context(|| format!("rename {} into place", tmp_path.display()))
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        Ok(path)
    }
}

pub fn archive_file_name(stamp: ScanStamp) -> String {
    format!("scan-{}.{}", stamp.label(), ARCHIVE_EXT)
}

/// Read every entry of an archive as (name, bytes), in archive order.
pub fn read_archive_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let file = File::open(path).with_context(|| format!("open archive {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut out = Vec::new();
    for entry in archive
        .entries()
        .with_context(|| format!("read archive {}", path.display()))?
    {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        out.push((name, bytes));
    }
    Ok(out)
}

fn entry_names(entries: &[PathBuf]) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("artifact path {} has no file name", entry.display()))?
            .to_string();
        if !seen.insert(name.clone()) {
            return Err(anyhow!("duplicate artifact name {} in manifest", name));
        }
        names.push(name);
    }
    Ok(names)
}

fn write_tar_gz(tmp_path: &Path, entries: &[PathBuf], names: &[String]) -> Result<()> {
    let file =
        File::create(tmp_path).with_context(|| format!("create {}", tmp_path.display()))?;
    let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for (entry, name) in entries.iter().zip(names) {
        let data =
            fs::read(entry).with_context(|| format!("read artifact {}", entry.display()))?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(ENTRY_MODE);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder
            .append_data(&mut header, name, data.as_slice())
            .with_context(|| format!("append {} to archive", name))?;
    }

    let encoder = builder.into_inner().context("finish tar stream")?;
    let file = encoder.finish().context("finish gzip stream")?;
    file.sync_all().context("sync archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stamp() -> ScanStamp {
        ScanStamp::from_datetime(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
    }

    fn artifacts(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("slot{}.png.enc", i));
                fs::write(&path, vec![i as u8; 16 + i]).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn archives_then_removes_originals() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let entries = artifacts(dir.path(), 2);
        let archiver = Archiver::new(&dir.path().join("archives"));
        let outcome = archiver.archive(ArchiveManifest::new(stamp(), entries.clone()))?;

        let path = outcome.path().expect("archive written").to_path_buf();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "scan-20240506T070809000Z.tar.gz"
        );
        let read = read_archive_entries(&path)?;
        assert_eq!(read.len(), 2);
        assert_eq!(read[1], ("slot1.png.enc".to_string(), vec![1u8; 17]));
        assert!(entries.iter().all(|e| !e.exists()));
        Ok(())
    }

    #[test]
    fn empty_manifest_is_nothing_captured() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archiver = Archiver::new(dir.path());
        let outcome = archiver.archive(ArchiveManifest::new(stamp(), Vec::new()))?;
        assert_eq!(outcome, ArchiveOutcome::NothingCaptured);
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn missing_entry_fails_without_deleting_anything() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut entries = artifacts(dir.path(), 2);
        entries.push(dir.path().join("vanished.png.enc"));
        let archiver = Archiver::new(dir.path());
        assert!(archiver
            .archive(ArchiveManifest::new(stamp(), entries.clone()))
            .is_err());
        assert!(entries[..2].iter().all(|e| e.exists()));
        assert!(!archiver.archive_path(stamp()).exists());
        let tmp = dir.path().join(format!("{}.tmp", archive_file_name(stamp())));
        assert!(!tmp.exists());
        Ok(())
    }

    #[test]
    fn existing_archive_is_never_replaced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archiver = Archiver::new(&dir.path().join("archives"));
        let first = archiver.archive(ArchiveManifest::new(stamp(), artifacts(dir.path(), 2)))?;
        let path = first.path().expect("archive written").to_path_buf();
        let before = fs::read(&path)?;

        let again = dir.path().join("again");
        fs::create_dir(&again)?;
        let entries = artifacts(&again, 1);
        assert!(archiver
            .archive(ArchiveManifest::new(stamp(), entries.clone()))
            .is_err());
        assert_eq!(fs::read(&path)?, before);
        assert!(entries[0].exists());
        Ok(())
    }

    #[test]
    fn rejects_duplicate_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let entries = artifacts(dir.path(), 1);
        let archiver = Archiver::new(dir.path());
        let manifest = ArchiveManifest::new(stamp(), vec![entries[0].clone(), entries[0].clone()]);
        assert!(archiver.write_archive(&manifest).is_err());
        Ok(())
    }
}
