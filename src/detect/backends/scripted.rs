use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectParams, FaceDetector};
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::Frame;

/// Replays a fixed face count per frame index. Unlisted frames report zero faces.
///
/// Boxes are laid out left to right across the top of the frame so overlays
/// stay visible; their geometry carries no meaning.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    counts: BTreeMap<u64, u32>,
}

impl ScriptedBackend {
    pub fn new(counts: impl IntoIterator<Item = (u64, u32)>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
        }
    }

    /// Parse `"index:count,index:count"`, e.g. `"0:0,2:3,7:1"`.
    pub fn parse(script: &str) -> Result<Self> {
        let mut counts = BTreeMap::new();
        for entry in script.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (index, count) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("script entry '{}' must be index:count", entry))?;
            let index: u64 = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid frame index in script entry '{}'", entry))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid face count in script entry '{}'", entry))?;
            counts.insert(index, count);
        }
        Ok(Self { counts })
    }

    pub fn count_for(&self, index: u64) -> u32 {
        self.counts.get(&index).copied().unwrap_or(0)
    }
}

impl FaceDetector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame, _params: &DetectParams) -> Result<DetectionResult> {
        let count = self.count_for(frame.index());
        let side = (frame.width() / count.max(1)).clamp(1, frame.height().max(1));
        let boxes = (0..count)
            .map(|i| BoundingBox::new(i.saturating_mul(side), 0, side, side))
            .collect();
        Ok(DetectionResult::new(boxes))
    }
}
