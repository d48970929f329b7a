use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::AnnotationStyle;
use crate::crypto::keys::public_keys_in;
use crate::detect::DetectParams;

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_MAX_FRAMES: u64 = 50;
const DEFAULT_MAX_FACES: usize = 3;
const DEFAULT_FRAME_DELAY_MS: u64 = 100;
const DEFAULT_TARGET_DIR: &str = "pictures";
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: (u32, u32) = (320, 240);
const DEFAULT_DETECTOR_THRESHOLD: f32 = 0.5;
const DEFAULT_LOGLEVEL: &str = "info";

/// Rejected configuration. Raised before any capture begins.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("max_faces must be at least 1")]
    NoSlots,
    #[error("max_faces ({max_faces}) exceeds max_frames ({max_frames}); slots would be empty")]
    MoreSlotsThanFrames { max_frames: u64, max_faces: usize },
    #[error("at least one recipient key is required")]
    NoRecipients,
    #[error("detector scale factor must be greater than 1.0 (got {0})")]
    ScaleFactor(f32),
    #[error("annotation width must be at least 1")]
    AnnotationWidth,
    #[error("target directory must not be empty")]
    TargetDir,
    #[error("frame source must not be empty")]
    Source,
}

#[derive(Debug, Deserialize, Default)]
struct ScanConfigFile {
    source: Option<String>,
    max_frames: Option<u64>,
    max_faces: Option<usize>,
    frame_delay_ms: Option<u64>,
    show_preview: Option<bool>,
    print_coordinates_on_match: Option<bool>,
    target_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    recipients: Option<Vec<PathBuf>>,
    key_dir: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    annotation: Option<AnnotationConfigFile>,
    loglevel: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    model_input: Option<(u32, u32)>,
    script: Option<String>,
    scale_factor: Option<f32>,
    min_neighbors: Option<u32>,
    min_size: Option<(u32, u32)>,
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    draw: Option<bool>,
    color: Option<[u8; 3]>,
    width: Option<u32>,
}

/// Every recognised scan option, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Frame source identifier: `stub://name[?frames=N]`, a device index,
    /// a device path, or a directory of images.
    pub source: String,
    /// Total frame budget for one scan.
    pub max_frames: u64,
    /// Number of slots, i.e. the most pictures one scan can keep.
    pub max_faces: usize,
    /// Sleep between frames.
    pub frame_delay: Duration,
    pub show_preview: bool,
    pub print_coordinates_on_match: bool,
    /// Where per-slot ciphertext artifacts are written.
    pub target_dir: PathBuf,
    /// Where archives go; `target_dir` when unset.
    pub archive_dir: Option<PathBuf>,
    /// Recipient public key files, in chain order.
    pub recipients: Vec<PathBuf>,
    /// Directory scanned for `*.pub` files when `recipients` is empty.
    pub key_dir: Option<PathBuf>,
    pub detector: DetectorSettings,
    pub annotation: AnnotationSettings,
    /// `env_logger` filter used by the binaries.
    pub loglevel: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// `stub`, `scripted`, or `tract`.
    pub backend: String,
    /// Model file for model-backed detectors.
    pub model_path: Option<PathBuf>,
    /// Model input (width, height).
    pub model_input: (u32, u32),
    /// `index:count` list for the scripted backend.
    pub script: Option<String>,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
    pub threshold: f32,
}

impl DetectorSettings {
    pub fn params(&self) -> DetectParams {
        DetectParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_size: self.min_size,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let params = DetectParams::default();
        Self {
            backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            model_path: None,
            model_input: DEFAULT_MODEL_INPUT,
            script: None,
            scale_factor: params.scale_factor,
            min_neighbors: params.min_neighbors,
            min_size: params.min_size,
            threshold: DEFAULT_DETECTOR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSettings {
    pub draw: bool,
    pub style: AnnotationStyle,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_file(ScanConfigFile::default())
    }
}

impl ScanConfig {
    /// Defaults, then the JSON file named by `TAXICAM_CONFIG`, then `TAXICAM_*` overrides.
    /// Validated before returning.
    pub fn load() -> Result<Self> {
        let cfg = Self::load_unvalidated()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Same layering as `load`, leaving validation to the caller so later
    /// layers (CLI flags) can still apply.
    pub fn load_unvalidated() -> Result<Self> {
        let config_path = std::env::var("TAXICAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Read a config file directly, without environment overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::from_file(read_config_file(path)?))
    }

    fn from_file(file: ScanConfigFile) -> Self {
        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(defaults.backend),
            model_path: detector_file.model_path,
            model_input: detector_file.model_input.unwrap_or(defaults.model_input),
            script: detector_file.script,
            scale_factor: detector_file.scale_factor.unwrap_or(defaults.scale_factor),
            min_neighbors: detector_file.min_neighbors.unwrap_or(defaults.min_neighbors),
            min_size: detector_file.min_size.unwrap_or(defaults.min_size),
            threshold: detector_file.threshold.unwrap_or(defaults.threshold),
        };

        let annotation_file = file.annotation.unwrap_or_default();
        let style_defaults = AnnotationStyle::default();
        let annotation = AnnotationSettings {
            draw: annotation_file.draw.unwrap_or(false),
            style: AnnotationStyle {
                color: annotation_file.color.unwrap_or(style_defaults.color),
                width: annotation_file.width.unwrap_or(style_defaults.width),
            },
        };

        Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            max_frames: file.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
            max_faces: file.max_faces.unwrap_or(DEFAULT_MAX_FACES),
            frame_delay: Duration::from_millis(
                file.frame_delay_ms.unwrap_or(DEFAULT_FRAME_DELAY_MS),
            ),
            show_preview: file.show_preview.unwrap_or(false),
            print_coordinates_on_match: file.print_coordinates_on_match.unwrap_or(false),
            target_dir: file
                .target_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_DIR)),
            archive_dir: file.archive_dir,
            recipients: file.recipients.unwrap_or_default(),
            key_dir: file.key_dir,
            detector,
            annotation,
            loglevel: file
                .loglevel
                .unwrap_or_else(|| DEFAULT_LOGLEVEL.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_nonempty("TAXICAM_SOURCE") {
            self.source = source;
        }
        if let Some(value) = env_nonempty("TAXICAM_MAX_FRAMES") {
            self.max_frames = value
                .parse()
                .map_err(|_| anyhow!("TAXICAM_MAX_FRAMES must be a non-negative integer"))?;
        }
        if let Some(value) = env_nonempty("TAXICAM_MAX_FACES") {
            self.max_faces = value
                .parse()
                .map_err(|_| anyhow!("TAXICAM_MAX_FACES must be a non-negative integer"))?;
        }
        if let Some(value) = env_nonempty("TAXICAM_FRAME_DELAY_MS") {
            let ms: u64 = value
                .parse()
                .map_err(|_| anyhow!("TAXICAM_FRAME_DELAY_MS must be an integer number of ms"))?;
            self.frame_delay = Duration::from_millis(ms);
        }
        if let Some(dir) = env_nonempty("TAXICAM_TARGET_DIR") {
            self.target_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_nonempty("TAXICAM_ARCHIVE_DIR") {
            self.archive_dir = Some(PathBuf::from(dir));
        }
        if let Some(list) = env_nonempty("TAXICAM_RECIPIENTS") {
            let parsed: Vec<PathBuf> = split_csv(&list).into_iter().map(PathBuf::from).collect();
            if !parsed.is_empty() {
                self.recipients = parsed;
            }
        }
        if let Some(dir) = env_nonempty("TAXICAM_KEY_DIR") {
            self.key_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = env_nonempty("TAXICAM_DETECTOR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = env_nonempty("TAXICAM_DETECTOR_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(level) = env_nonempty("TAXICAM_LOGLEVEL") {
            self.loglevel = level;
        }
        Ok(())
    }

    /// Eager validation. Nothing is captured or written for a rejected configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Source);
        }
        if self.max_faces == 0 {
            return Err(ConfigError::NoSlots);
        }
        if self.max_frames > 0 && self.max_faces as u64 > self.max_frames {
            return Err(ConfigError::MoreSlotsThanFrames {
                max_frames: self.max_frames,
                max_faces: self.max_faces,
            });
        }
        if self.recipients.is_empty() && self.key_dir.is_none() {
            return Err(ConfigError::NoRecipients);
        }
        if !(self.detector.scale_factor > 1.0) {
            return Err(ConfigError::ScaleFactor(self.detector.scale_factor));
        }
        if self.annotation.style.width == 0 {
            return Err(ConfigError::AnnotationWidth);
        }
        if self.target_dir.as_os_str().is_empty() {
            return Err(ConfigError::TargetDir);
        }
        Ok(())
    }

    /// Archive destination.
    pub fn archive_dir(&self) -> &Path {
        self.archive_dir.as_deref().unwrap_or(&self.target_dir)
    }

    /// Recipient key files in chain order: the explicit list, else every
    /// `*.pub` under `key_dir` sorted by name.
    pub fn resolve_recipients(&self) -> Result<Vec<PathBuf>> {
        if !self.recipients.is_empty() {
            return Ok(self.recipients.clone());
        }
        let keys = match &self.key_dir {
            Some(dir) => public_keys_in(dir)?,
            None => Vec::new(),
        };
        if keys.is_empty() {
            return Err(ConfigError::NoRecipients.into());
        }
        Ok(keys)
    }
}

fn read_config_file(path: &Path) -> Result<ScanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
