use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};

use taxicam::archive::read_archive_entries;
use taxicam::crypto::{decrypt_chained, EncryptionProvider, RecipientId};
use taxicam::detect::ScriptedBackend;
use taxicam::ingest::synthetic::{synthetic_frame, SyntheticConfig};
use taxicam::ingest::SyntheticSource;
use taxicam::{
    ArchiveOutcome, CancelToken, ConfigError, DetectorSettings, Frame, FrameEvent, FrameSource,
    RecipientSecret, ScanConfig, ScanError, ScanObserver, ScanStamp, Scanner, X25519Provider,
};

fn stamp() -> ScanStamp {
    ScanStamp::from_datetime(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
}

fn config(dir: &Path, max_frames: u64, max_faces: usize, script: &str) -> ScanConfig {
    ScanConfig {
        source: "stub://test".into(),
        max_frames,
        max_faces,
        frame_delay: Duration::ZERO,
        target_dir: dir.join("pictures"),
        archive_dir: Some(dir.join("archives")),
        // Keys are handed to the scanner in memory; this only satisfies validation.
        recipients: vec![PathBuf::from("unused.pub")],
        detector: DetectorSettings {
            backend: "scripted".into(),
            script: Some(script.into()),
            ..DetectorSettings::default()
        },
        ..ScanConfig::default()
    }
}

struct Keys {
    secrets: Vec<RecipientSecret>,
}

impl Keys {
    fn new() -> Self {
        Self {
            secrets: vec![RecipientSecret::generate(), RecipientSecret::generate()],
        }
    }

    /// Chain order: first secret's key is the innermost stage.
    fn provider(&self) -> X25519Provider {
        X25519Provider::new(self.secrets.iter().map(RecipientSecret::recipient).collect())
            .unwrap()
    }
}

fn build_scanner(
    cfg: ScanConfig,
    script: &str,
    provider: Box<dyn EncryptionProvider>,
) -> Scanner {
    Scanner::new(
        cfg,
        Box::new(ScriptedBackend::parse(script).unwrap()),
        provider,
    )
    .unwrap()
}

fn expected_png(index: u64) -> Vec<u8> {
    synthetic_frame(&SyntheticConfig::default(), index)
        .unwrap()
        .encode_png(None)
        .unwrap()
        .to_vec()
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

#[test]
fn keeps_best_frame_per_slot_and_archives_them() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let script = "0:0,2:3,7:1";
    let mut scanner = build_scanner(
        config(dir.path(), 10, 2, script),
        script,
        Box::new(keys.provider()),
    );
    let mut source = SyntheticSource::parse("stub://test")?;

    let report = scanner.run(&mut source, stamp())?.into_result()?;
    assert_eq!(report.frames_processed, 10);
    assert_eq!(report.slots.len(), 2);
    assert_eq!(report.slots[0].range, 0..5);
    assert_eq!(
        (report.slots[0].best_frame, report.slots[0].best_score),
        (Some(2), Some(3))
    );
    assert_eq!(report.slots[1].range, 5..10);
    assert_eq!(
        (report.slots[1].best_frame, report.slots[1].best_score),
        (Some(7), Some(1))
    );

    let archive = match &report.archive {
        ArchiveOutcome::Written {
            path,
            entries,
            leftover,
        } => {
            assert_eq!(*entries, 2);
            assert!(leftover.is_empty());
            path.clone()
        }
        other => panic!("expected an archive, got {:?}", other),
    };
    assert_eq!(
        archive.file_name().unwrap().to_str().unwrap(),
        "scan-20240301T120000000Z.tar.gz"
    );
    assert!(files_in(&dir.path().join("pictures")).is_empty());

    let entries = read_archive_entries(&archive)?;
    assert_eq!(entries.len(), 2);
    for ((name, ciphertext), frame) in entries.iter().zip([2u64, 7]) {
        assert!(name.ends_with(".png.enc"));
        let picture = decrypt_chained(ciphertext, &keys.secrets)?;
        assert_eq!(&*picture, expected_png(frame).as_slice());
    }
    Ok(())
}

#[test]
fn persisted_artifacts_are_never_plaintext() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let mut cfg = config(dir.path(), 4, 2, "");
    // Keep the artifacts on disk: archive into a path that cannot be a directory.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"")?;
    cfg.archive_dir = Some(blocker.join("archives"));
    let mut scanner = build_scanner(cfg, "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test")?;

    let err = scanner.run(&mut source, stamp()).unwrap_err();
    assert!(matches!(err, ScanError::Archival(_)));

    let artifacts = files_in(&dir.path().join("pictures"));
    assert_eq!(artifacts.len(), 2);
    for path in artifacts {
        let bytes = std::fs::read(&path)?;
        assert!(bytes.starts_with(b"TXE1"));
        assert!(!bytes.windows(4).any(|w| w == b"IHDR"));
    }
    Ok(())
}

#[test]
fn equal_scores_keep_the_earlier_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let script = "0:2,1:2,3:2";
    let mut scanner = build_scanner(
        config(dir.path(), 4, 1, script),
        script,
        Box::new(keys.provider()),
    );
    let mut source = SyntheticSource::parse("stub://test")?;

    let report = scanner.run(&mut source, stamp())?.into_result()?;
    assert_eq!(report.slots[0].best_frame, Some(0));
    Ok(())
}

#[test]
fn zero_face_slot_keeps_its_first_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let mut scanner = build_scanner(config(dir.path(), 6, 3, ""), "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test")?;

    let report = scanner.run(&mut source, stamp())?.into_result()?;
    let firsts: Vec<_> = report.slots.iter().map(|s| s.best_frame).collect();
    assert_eq!(firsts, vec![Some(0), Some(2), Some(4)]);
    assert!(matches!(
        report.archive,
        ArchiveOutcome::Written { entries: 3, .. }
    ));
    Ok(())
}

#[test]
fn source_exhaustion_archives_visited_slots_only() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let mut scanner = build_scanner(
        config(dir.path(), 10, 2, "1:1"),
        "1:1",
        Box::new(keys.provider()),
    );
    let mut source = SyntheticSource::parse("stub://test?frames=3")?;

    let report = scanner.run(&mut source, stamp())?.into_result()?;
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.slots.len(), 1);
    assert_eq!(report.slots[0].best_frame, Some(1));
    let archive = report.archive.path().expect("archive written");
    assert_eq!(read_archive_entries(archive)?.len(), 1);
    Ok(())
}

#[test]
fn empty_scans_report_nothing_captured() -> Result<()> {
    let keys = Keys::new();

    let dir = tempfile::tempdir()?;
    let mut zero_budget = build_scanner(
        config(dir.path(), 0, 2, ""),
        "",
        Box::new(keys.provider()),
    );
    let mut source = SyntheticSource::parse("stub://test")?;
    let report = zero_budget.run(&mut source, stamp())?.into_result()?;
    assert_eq!(report.archive, ArchiveOutcome::NothingCaptured);
    assert_eq!(report.frames_processed, 0);
    assert!(files_in(&dir.path().join("archives")).is_empty());

    let dir = tempfile::tempdir()?;
    let mut exhausted = build_scanner(config(dir.path(), 10, 2, ""), "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test?frames=0")?;
    let report = exhausted.run(&mut source, stamp())?.into_result()?;
    assert_eq!(report.archive, ArchiveOutcome::NothingCaptured);
    assert!(report.slots.is_empty());
    Ok(())
}

#[test]
fn scans_within_one_second_keep_separate_archives() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let second = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let early = ScanStamp::from_datetime(second + chrono::Duration::milliseconds(100));
    let late = ScanStamp::from_datetime(second + chrono::Duration::milliseconds(900));

    let mut scanner = build_scanner(config(dir.path(), 4, 2, ""), "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test")?;
    let first = scanner.run(&mut source, early)?.into_result()?;
    let first_path = first.archive.path().expect("archive written").to_path_buf();
    let first_bytes = std::fs::read(&first_path)?;

    let mut scanner = build_scanner(config(dir.path(), 1, 1, ""), "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test")?;
    let second = scanner.run(&mut source, late)?.into_result()?;
    let second_path = second.archive.path().expect("archive written").to_path_buf();

    assert_ne!(first_path, second_path);
    assert_eq!(files_in(&dir.path().join("archives")).len(), 2);
    assert_eq!(read_archive_entries(&first_path)?.len(), 2);
    assert_eq!(read_archive_entries(&second_path)?.len(), 1);

    // Reusing a stamp must fail loudly and leave the earlier archive intact.
    let mut scanner = build_scanner(config(dir.path(), 1, 1, ""), "", Box::new(keys.provider()));
    let mut source = SyntheticSource::parse("stub://test")?;
    let err = scanner.run(&mut source, early).unwrap_err();
    assert!(matches!(err, ScanError::Archival(_)), "got {:?}", err);
    assert_eq!(std::fs::read(&first_path)?, first_bytes);
    assert_eq!(files_in(&dir.path().join("pictures")).len(), 1);
    Ok(())
}

#[test]
fn more_slots_than_frames_is_rejected_before_capture() {
    let dir = tempfile::tempdir().unwrap();
    let keys = Keys::new();
    let result = Scanner::new(
        config(dir.path(), 5, 10, ""),
        Box::new(ScriptedBackend::default()),
        Box::new(keys.provider()),
    );
    assert!(matches!(
        result,
        Err(ScanError::Configuration(ConfigError::MoreSlotsThanFrames {
            max_frames: 5,
            max_faces: 10
        }))
    ));
    assert!(files_in(dir.path()).is_empty());
}

/// Wraps a real provider and fails the n-th stage call.
struct FailingStage {
    inner: X25519Provider,
    fail_at: usize,
    calls: Cell<usize>,
}

impl EncryptionProvider for FailingStage {
    fn recipients(&self) -> &[RecipientId] {
        self.inner.recipients()
    }

    fn encrypt_stage(&self, bytes: &[u8], recipient: &RecipientId) -> Result<Vec<u8>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == self.fail_at {
            return Err(anyhow!("recipient key rejected"));
        }
        self.inner.encrypt_stage(bytes, recipient)
    }
}

#[test]
fn encryption_failure_keeps_previous_artifact_and_is_surfaced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    // Two stages per persist: frame 0 uses calls 0-1, frame 2 fails on call 3.
    let provider = FailingStage {
        inner: keys.provider(),
        fail_at: 3,
        calls: Cell::new(0),
    };
    let script = "0:1,2:3";
    let mut scanner = build_scanner(config(dir.path(), 4, 1, script), script, Box::new(provider));
    let mut source = SyntheticSource::parse("stub://test")?;

    let report = scanner.run(&mut source, stamp())?;
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.slots[0].best_frame, Some(0));
    assert_eq!(report.slots[0].best_score, Some(1));
    let archive = report.archive.path().expect("archive written").to_path_buf();

    let entries = read_archive_entries(&archive)?;
    assert_eq!(entries.len(), 1);
    let picture = decrypt_chained(&entries[0].1, &keys.secrets)?;
    assert_eq!(&*picture, expected_png(0).as_slice());

    match report.into_result() {
        Err(ScanError::Encryption { failures, archive: reported }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!((failures[0].slot, failures[0].frame_index), (0, 2));
            assert!(failures[0].message.contains("recipient key rejected"));
            assert_eq!(reported, Some(archive));
        }
        other => panic!("expected an encryption error, got {:?}", other),
    }
    Ok(())
}

/// Synthetic source that records release and can fail mid-scan.
struct TrackedSource {
    inner: SyntheticSource,
    released: Rc<Cell<bool>>,
    fail_at: Option<u64>,
    reads: u64,
}

impl TrackedSource {
    fn new(released: Rc<Cell<bool>>, fail_at: Option<u64>) -> Self {
        Self {
            inner: SyntheticSource::parse("stub://tracked").unwrap(),
            released,
            fail_at,
            reads: 0,
        }
    }
}

impl FrameSource for TrackedSource {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.reads) {
            return Err(anyhow!("device unplugged"));
        }
        self.reads += 1;
        self.inner.read()
    }

    fn release(&mut self) {
        self.released.set(true);
        self.inner.release();
    }
}

struct CancelAfter {
    frame: u64,
    token: CancelToken,
}

impl ScanObserver for CancelAfter {
    fn on_frame(&mut self, event: &FrameEvent) {
        if event.frame_index == self.frame {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_releases_device_and_leaves_artifacts_unarchived() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let token = CancelToken::new();
    let mut scanner = build_scanner(config(dir.path(), 10, 2, ""), "", Box::new(keys.provider()))
        .with_cancel(token.clone())
        .with_observer(Box::new(CancelAfter {
            frame: 2,
            token: token.clone(),
        }));
    let released = Rc::new(Cell::new(false));
    let mut source = TrackedSource::new(released.clone(), None);

    match scanner.run(&mut source, stamp()) {
        Err(ScanError::Cancelled { artifacts }) => {
            assert_eq!(artifacts.len(), 1);
            assert!(artifacts[0].exists());
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert!(released.get());
    assert!(files_in(&dir.path().join("archives")).is_empty());
    Ok(())
}

#[test]
fn device_failure_aborts_and_releases() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keys = Keys::new();
    let mut scanner = build_scanner(config(dir.path(), 10, 2, ""), "", Box::new(keys.provider()));
    let released = Rc::new(Cell::new(false));
    let mut source = TrackedSource::new(released.clone(), Some(6));

    let err = scanner.run(&mut source, stamp()).unwrap_err();
    assert!(matches!(err, ScanError::Device(_)));
    assert!(err.to_string().contains("device unplugged"));
    assert!(released.get());
    // Both visited slots keep their ciphertext; nothing was archived.
    assert_eq!(files_in(&dir.path().join("pictures")).len(), 2);
    assert!(files_in(&dir.path().join("archives")).is_empty());
    Ok(())
}
