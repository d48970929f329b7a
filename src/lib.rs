//! Taxicam
//!
//! Periodically captures frames, keeps the frame most likely to contain a face
//! within each fixed window of a scan, and persists only encrypted copies of
//! the chosen frames before bundling them into one archive.
//!
//! # Guarantees
//!
//! 1. **Ciphertext only**: frames and their encodings stay in memory; only the
//!    output of the full encryption chain is written to disk.
//! 2. **Monotonic candidates**: a slot's artifact is replaced only by a frame
//!    with strictly more faces. Ties keep the earlier frame.
//! 3. **All-or-nothing archival**: slot artifacts are deleted only after the
//!    archive is completely on disk.
//!
//! # Module Structure
//!
//! - `config`: typed scan configuration (defaults, JSON file, environment)
//! - `ingest`: frame sources and the release-on-drop capture session
//! - `detect`: face detection capability and backends
//! - `crypto`: recipient keys and chained encryption
//! - `scan`: slot scheduler, candidate selector and the scan loop
//! - `store`: per-slot artifact files
//! - `archive`: deterministic scan archives

pub mod annotate;
pub mod archive;
pub mod config;
pub mod crypto;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod scan;
pub mod store;

pub use archive::{ArchiveManifest, ArchiveOutcome, Archiver};
pub use config::{ConfigError, DetectorSettings, ScanConfig};
pub use crypto::{EncryptionProvider, RecipientKey, RecipientSecret, X25519Provider};
pub use detect::{BoundingBox, DetectParams, DetectionResult, FaceDetector};
pub use error::{EncryptionFailure, ScanError};
pub use frame::Frame;
pub use ingest::{open_source, CaptureSession, FrameSource};
pub use scan::{
    CancelToken, CandidateSelector, Decision, FrameEvent, ScanObserver, ScanReport, Scanner,
    Slot, SlotScheduler, SlotTransition,
};
pub use store::{ArtifactStore, ScanStamp};
