//! Captured frame container.
//!
//! - `Frame`: RGB24 pixel buffer plus the sequence index assigned by its source.
//!   Not `Clone`, not `Serialize`; pixels are zeroized on drop.
//! - `Frame::encode_png`: the only encoding path. The output buffer is reserved
//!   at a worst-case size before encoding, so the encoder writes into a single
//!   allocation that is zeroized on drop. The bytes must go straight into the
//!   encryption chain.
//!
//! Nothing in this module touches the filesystem. Plaintext frames and their
//! encodings never leave memory.

use anyhow::{anyhow, Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use zeroize::{Zeroize, Zeroizing};

use crate::annotate::{draw_boxes, AnnotationStyle};
use crate::detect::BoundingBox;

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

/// A single captured frame. Ephemeral: owned by the scan-loop iteration that read it.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
}

// Explicitly NOT implementing Clone or Serialize.

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the buffer length does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            let got = data.len();
            let mut data = data;
            data.zeroize();
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                got
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Monotonically increasing sequence index within its source.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Read-only pixel access for detectors. Row-major RGB24.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Encode as PNG in memory, optionally drawing `boxes` onto a scratch copy first.
    ///
    /// Annotation never alters the frame itself, so detection scores computed from
    /// this frame stay valid.
    pub fn encode_png(
        &self,
        overlay: Option<(&[BoundingBox], &AnnotationStyle)>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(Vec::with_capacity(png_capacity(
            self.data.len(),
            self.height,
        )));
        match overlay {
            Some((boxes, style)) if !boxes.is_empty() => {
                let mut scratch = Zeroizing::new(self.data.clone());
                draw_boxes(&mut scratch, self.width, self.height, boxes, style);
                write_png(&mut out, &scratch, self.width, self.height)?;
            }
            _ => write_png(&mut out, &self.data, self.width, self.height)?,
        }
        Ok(out)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

/// Upper bound for an encoded RGB24 frame: raw pixels, one filter byte per
/// row, deflate stored-block and IDAT chunk overhead, plus header slack.
pub(crate) fn png_capacity(rgb_len: usize, height: u32) -> usize {
    rgb_len
        .saturating_add(rgb_len / 64)
        .saturating_add(height as usize)
        .saturating_add(4096)
}

fn write_png(out: &mut Vec<u8>, pixels: &[u8], width: u32, height: u32) -> Result<()> {
    PngEncoder::new(out)
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .context("encode frame as PNG")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(value: u8, index: u64) -> Frame {
        Frame::from_rgb(vec![value; 8 * 6 * 3], 8, 6, index).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer_length() {
        assert!(Frame::from_rgb(vec![0u8; 10], 8, 6, 0).is_err());
    }

    #[test]
    fn png_encoding_is_deterministic() {
        let frame = solid_frame(40, 0);
        let a = frame.encode_png(None).unwrap();
        let b = frame.encode_png(None).unwrap();
        assert_eq!(*a, *b);
        assert!(a.starts_with(b"\x89PNG"));
    }

    #[test]
    fn incompressible_frame_encodes_without_reallocating() {
        use rand::RngCore;

        let (width, height) = (64u32, 48u32);
        let mut pixels = vec![0u8; rgb_len(width, height).unwrap()];
        rand::thread_rng().fill_bytes(&mut pixels);
        let reserved = png_capacity(pixels.len(), height);
        let frame = Frame::from_rgb(pixels, width, height, 0).unwrap();

        let encoded = frame.encode_png(None).unwrap();
        assert!(encoded.len() <= reserved);
        assert_eq!(encoded.capacity(), reserved);
    }

    #[test]
    fn annotation_changes_encoding_but_not_frame() {
        let frame = solid_frame(40, 3);
        let plain = frame.encode_png(None).unwrap();
        let boxes = [BoundingBox::new(1, 1, 4, 3)];
        let style = AnnotationStyle::default();
        let annotated = frame.encode_png(Some((&boxes, &style))).unwrap();
        assert_ne!(*plain, *annotated);
        assert!(frame.pixels().iter().all(|&p| p == 40));
    }

    #[test]
    fn empty_overlay_matches_plain_encoding() {
        let frame = solid_frame(7, 1);
        let style = AnnotationStyle::default();
        let plain = frame.encode_png(None).unwrap();
        let annotated = frame.encode_png(Some((&[], &style))).unwrap();
        assert_eq!(*plain, *annotated);
    }
}
