/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Result of running face detection on a frame.
///
/// Consumed immediately by the candidate selector and never retained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub boxes: Vec<BoundingBox>,
}

impl DetectionResult {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    /// Candidate score: the number of detected faces.
    pub fn score(&self) -> u32 {
        self.boxes.len().min(u32::MAX as usize) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
