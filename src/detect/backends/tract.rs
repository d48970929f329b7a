#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;
use zeroize::Zeroize;

use crate::detect::backend::{DetectParams, FaceDetector};
use crate::detect::grouping::group_hits;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::Frame;

/// Values per raw hit in the model output: x, y, w, h (normalised 0..1), score.
const HIT_STRIDE: usize = 5;

/// Tract-based face detector for ONNX models.
///
/// Expects a single-scale model taking `1x3xHxW` RGB in 0..1 and emitting
/// `[.., N, 5]` raw hits. Hits above the threshold are mapped back to frame
/// coordinates, then merged with `min_neighbors` and filtered by `min_size`.
/// The model input size fixes the scale, so `scale_factor` is not used here.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = imageops::resize(&image, self.width, self.height, FilterType::Triangle);
        let mut original = image.into_raw();
        original.zeroize();

        let width = self.width as usize;
        let raw = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| raw[(y * width + x) * 3 + channel] as f32 / 255.0,
        );
        let mut resized = resized.into_raw();
        resized.zeroize();
        Ok(input.into_tensor())
    }

    fn extract_hits(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat: Vec<f32> = values.iter().copied().collect();
        if flat.len() % HIT_STRIDE != 0 {
            return Err(anyhow!(
                "model output length {} is not a multiple of {}",
                flat.len(),
                HIT_STRIDE
            ));
        }

        let fw = frame.width() as f32;
        let fh = frame.height() as f32;
        Ok(flat
            .chunks_exact(HIT_STRIDE)
            .filter(|hit| hit[4].is_finite() && hit[4] >= self.confidence_threshold)
            .map(|hit| {
                let x = (hit[0].clamp(0.0, 1.0) * fw) as u32;
                let y = (hit[1].clamp(0.0, 1.0) * fh) as u32;
                let w = (hit[2].clamp(0.0, 1.0) * fw) as u32;
                let h = (hit[3].clamp(0.0, 1.0) * fh) as u32;
                BoundingBox::new(x, y, w, h)
            })
            .collect())
    }
}

impl FaceDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, params: &DetectParams) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let raw = self.extract_hits(outputs, frame)?;
        Ok(DetectionResult::new(group_hits(
            &raw,
            params.min_neighbors,
            params.min_size,
        )))
    }
}
