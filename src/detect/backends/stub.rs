use anyhow::Result;

use crate::detect::backend::{DetectParams, FaceDetector};
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Stub backend for wiring checks. Never reports a face.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FaceDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame, _params: &DetectParams) -> Result<DetectionResult> {
        Ok(DetectionResult::default())
    }
}
