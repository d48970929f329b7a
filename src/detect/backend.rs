use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Tuning knobs handed to every detection call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    /// Image pyramid step between detection scales. Must be > 1.0.
    pub scale_factor: f32,
    /// Raw hits that must overlap before a face is reported. 0 keeps every raw hit.
    pub min_neighbors: u32,
    /// Smallest face reported, as (width, height) in pixels.
    pub min_size: (u32, u32),
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 3,
            min_size: (30, 30),
        }
    }
}

/// Face detection capability.
///
/// # Audit Boundary
///
/// Implementations receive read-only pixels for the duration of `detect` and
/// MUST NOT retain, write, or transmit them. Only bounding boxes flow out.
pub trait FaceDetector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect faces in `frame`.
    fn detect(&mut self, frame: &Frame, params: &DetectParams) -> Result<DetectionResult>;

    /// Optional warm-up hook, called once before a scan starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
