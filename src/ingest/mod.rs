//! Frame sources.
//!
//! - `stub://name[?frames=N&size=WxH]`: deterministic synthetic frames (testing)
//! - a directory of PNG/JPEG images, read in file-name order
//! - USB/V4L2 devices by index or path (feature: ingest-v4l2)
//!
//! Every source produces `Frame` values with a monotonically increasing index
//! starting at 0. Sources MUST NOT write frames to disk or log pixel content.
//!
//! `CaptureSession` owns the open/release lifecycle: the device is released on
//! every exit path, including errors, cancellation and panics unwinding through
//! the scan loop.

pub mod image_dir;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use image_dir::ImageDirSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub const STUB_SCHEME: &str = "stub://";

/// Frame capture capability consumed by the scan loop.
pub trait FrameSource {
    /// Human-readable identifier for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame. `Ok(None)` means the source is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// An open capture. Releases the source when dropped.
pub struct CaptureSession<'a> {
    source: &'a mut dyn FrameSource,
    frames_read: u64,
    released: bool,
}

impl<'a> CaptureSession<'a> {
    /// Open `source`. A failed open still releases whatever was partially acquired.
    pub fn open(source: &'a mut dyn FrameSource) -> Result<Self> {
        if let Err(err) = source.open() {
            source.release();
            return Err(err);
        }
        log::info!("capture: opened {}", source.describe());
        Ok(Self {
            source,
            frames_read: 0,
            released: false,
        })
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(anyhow!("capture session already released"));
        }
        let frame = self.source.read()?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Release explicitly. Dropping the session has the same effect.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            log::info!(
                "capture: released {} after {} frame(s)",
                self.source.describe(),
                self.frames_read
            );
        }
    }
}

impl Drop for CaptureSession<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Resolve a source identifier.
///
/// A bare integer `N` names `/dev/videoN`; `/dev/...` paths are opened as
/// V4L2 devices; directories are read as image sequences.
pub fn open_source(id: &str) -> Result<Box<dyn FrameSource>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(anyhow!("frame source must not be empty"));
    }
    if id.starts_with(STUB_SCHEME) {
        return Ok(Box::new(SyntheticSource::parse(id)?));
    }
    if let Ok(index) = id.parse::<u32>() {
        return device_source(&format!("/dev/video{}", index));
    }
    let path = Path::new(id);
    if path.is_dir() {
        return Ok(Box::new(ImageDirSource::new(path)));
    }
    if id.starts_with("/dev/") {
        return device_source(id);
    }
    if id.contains("://") {
        return Err(anyhow!("unsupported frame source scheme in '{}'", id));
    }
    Err(anyhow!("frame source '{}' is not a device or directory", id))
}

#[cfg(feature = "ingest-v4l2")]
fn device_source(path: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(v4l2::V4l2Config {
        device: path.to_string(),
        ..v4l2::V4l2Config::default()
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn device_source(path: &str) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "capture device {} requires the ingest-v4l2 feature",
        path
    ))
}
