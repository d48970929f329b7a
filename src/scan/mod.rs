//! Slot-based best-candidate scan.
//!
//! One frame at a time: capture, schedule into a slot, detect, and (when the
//! selector says so) encode, chain-encrypt and atomically persist. When the
//! loop ends the device is released, every slot is finalized and the
//! artifacts are archived.
//!
//! Plaintext never reaches the filesystem: the PNG encoding lives in a
//! zeroizing buffer that only the encryption chain reads.

mod scheduler;
mod selector;

pub use scheduler::{SlotScheduler, SlotTransition};
pub use selector::{CandidateSelector, Decision, Slot};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive::{ArchiveManifest, ArchiveOutcome, Archiver};
use crate::config::ScanConfig;
use crate::crypto::{encrypt_chained, EncryptionProvider};
use crate::detect::{DetectionResult, FaceDetector};
use crate::error::{EncryptionFailure, ScanError};
use crate::frame::Frame;
use crate::ingest::{CaptureSession, FrameSource};
use crate::store::{ArtifactStore, ScanStamp};

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared cancellation flag, set from a signal handler and polled between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next scan.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleep for `delay`, waking early on cancellation. Returns false if cancelled.
    pub fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

/// Per-frame progress, for previews and status lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameEvent {
    pub frame_index: u64,
    pub slot: usize,
    pub faces: u32,
    /// `None` when persisting failed.
    pub decision: Option<Decision>,
}

pub trait ScanObserver {
    fn on_frame(&mut self, _event: &FrameEvent) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Outcome of a scan that ran to completion.
#[derive(Debug)]
#[must_use = "encryption failures are only surfaced through into_result"]
pub struct ScanReport {
    pub stamp: ScanStamp,
    pub frames_processed: u64,
    pub slots: Vec<Slot>,
    pub archive: ArchiveOutcome,
    pub encryption_failures: Vec<EncryptionFailure>,
}

impl ScanReport {
    /// `Err(ScanError::Encryption)` when any selected frame failed to persist.
    pub fn into_result(self) -> Result<ScanReport, ScanError> {
        if self.encryption_failures.is_empty() {
            return Ok(self);
        }
        Err(ScanError::Encryption {
            archive: self.archive.path().map(PathBuf::from),
            failures: self.encryption_failures,
        })
    }
}

enum PersistError {
    Encryption(anyhow::Error),
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for PersistError {
    fn from(err: anyhow::Error) -> Self {
        PersistError::Storage(err)
    }
}

/// One scan invocation: configuration, detector and encryption provider are
/// fixed for its lifetime.
pub struct Scanner {
    config: ScanConfig,
    detector: Box<dyn FaceDetector>,
    provider: Box<dyn EncryptionProvider>,
    cancel: CancelToken,
    observer: Box<dyn ScanObserver>,
}

impl Scanner {
    /// Rejects invalid configuration before anything is opened or written.
    pub fn new(
        config: ScanConfig,
        detector: Box<dyn FaceDetector>,
        provider: Box<dyn EncryptionProvider>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            provider,
            cancel: CancelToken::new(),
            observer: Box::new(NoopObserver),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run one scan against `source`, naming every output after `stamp`.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        stamp: ScanStamp,
    ) -> Result<ScanReport, ScanError> {
        let mut scheduler = SlotScheduler::new(self.config.max_frames, self.config.max_faces)?;
        let store = ArtifactStore::new(&self.config.target_dir, stamp).map_err(ScanError::Storage)?;
        self.detector.warm_up().map_err(ScanError::Detection)?;

        log::info!(
            "scan {}: {} frame(s) across {} slot(s) of {} using {} detector",
            stamp,
            scheduler.max_frames(),
            scheduler.slot_count(),
            scheduler.slot_size(),
            self.detector.name()
        );

        let mut selector = CandidateSelector::new();
        let mut failures = Vec::new();
        let mut frames_processed = 0u64;

        if scheduler.max_frames() > 0 {
            let mut session = CaptureSession::open(source).map_err(ScanError::Device)?;
            let params = self.config.detector.params();

            for frame_index in 0..scheduler.max_frames() {
                if self.cancel.is_cancelled() {
                    return Err(cancelled(&selector));
                }
                let Some(frame) = session.next_frame().map_err(ScanError::Device)? else {
                    log::info!("scan {}: source exhausted after {} frame(s)", stamp, frame_index);
                    break;
                };
                let Some(transition) = scheduler.advance(frame_index) else {
                    break;
                };
                if let SlotTransition::Entered { slot, previous } = transition {
                    if let Some(previous) = previous {
                        selector.finalize(previous);
                    }
                    selector
                        .enter_slot(slot, scheduler.slot_range(slot))
                        .map_err(ScanError::Storage)?;
                    log::info!(
                        "scan {}: entered slot {} (frames {:?})",
                        stamp,
                        slot,
                        scheduler.slot_range(slot)
                    );
                }
                let slot = transition.slot();

                let detection = self
                    .detector
                    .detect(&frame, &params)
                    .map_err(ScanError::Detection)?;
                let score = detection.score();
                log::debug!("scan {}: frame {} slot {} faces {}", stamp, frame_index, slot, score);
                if self.config.print_coordinates_on_match && score > 0 {
                    for bbox in &detection.boxes {
                        log::info!(
                            "frame {}: face at x={} y={} w={} h={}",
                            frame_index,
                            bbox.x,
                            bbox.y,
                            bbox.width,
                            bbox.height
                        );
                    }
                }

                let offered = selector.offer(slot, frame_index, score, || {
                    self.persist(&store, slot, &frame, &detection)
                });
                let decision = match offered {
                    Ok(decision) => {
                        match decision {
                            Decision::Baseline => log::info!(
                                "scan {}: slot {} baseline frame {} ({} face(s))",
                                stamp,
                                slot,
                                frame_index,
                                score
                            ),
                            Decision::Improved { previous } => log::info!(
                                "scan {}: slot {} replaced with frame {} ({} > {} face(s))",
                                stamp,
                                slot,
                                frame_index,
                                score,
                                previous
                            ),
                            Decision::Keep { .. } => {}
                        }
                        Some(decision)
                    }
                    Err(PersistError::Encryption(err)) => {
                        log::warn!(
                            "scan {}: slot {} frame {} not persisted: {:#}",
                            stamp,
                            slot,
                            frame_index,
                            err
                        );
                        failures.push(EncryptionFailure {
                            slot,
                            frame_index,
                            message: format!("{:#}", err),
                        });
                        None
                    }
                    Err(PersistError::Storage(err)) => return Err(ScanError::Storage(err)),
                };
                drop(frame);
                frames_processed += 1;

                self.observer.on_frame(&FrameEvent {
                    frame_index,
                    slot,
                    faces: score,
                    decision,
                });

                if frame_index + 1 < scheduler.max_frames()
                    && !self.config.frame_delay.is_zero()
                    && !self.cancel.sleep(self.config.frame_delay)
                {
                    return Err(cancelled(&selector));
                }
            }
            session.release();
        }

        selector.finalize_all();
        let manifest = ArchiveManifest::new(stamp, selector.artifacts());
        let archive = Archiver::new(self.config.archive_dir())
            .archive(manifest)
            .map_err(ScanError::Archival)?;

        Ok(ScanReport {
            stamp,
            frames_processed,
            slots: selector.into_slots(),
            archive,
            encryption_failures: failures,
        })
    }

    /// Encode, chain-encrypt, then write. Nothing touches disk unless every
    /// stage succeeded.
    fn persist(
        &self,
        store: &ArtifactStore,
        slot: usize,
        frame: &Frame,
        detection: &DetectionResult,
    ) -> Result<PathBuf, PersistError> {
        let overlay = self
            .config
            .annotation
            .draw
            .then_some((detection.boxes.as_slice(), &self.config.annotation.style));
        let png = frame.encode_png(overlay).map_err(PersistError::Encryption)?;
        let ciphertext =
            encrypt_chained(self.provider.as_ref(), &png).map_err(PersistError::Encryption)?;
        drop(png);
        store
            .write_artifact(slot, &ciphertext)
            .map_err(PersistError::Storage)
    }
}

fn cancelled(selector: &CandidateSelector) -> ScanError {
    let artifacts = selector.artifacts();
    log::warn!(
        "scan cancelled; {} artifact(s) left unarchived",
        artifacts.len()
    );
    ScanError::Cancelled { artifacts }
}
