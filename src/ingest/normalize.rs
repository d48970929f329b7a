use anyhow::{anyhow, Result};

use crate::frame::rgb_len;

/// Capture formats the V4L2 source knows how to turn into RGB24.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

/// Convert one captured buffer to row-major RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = rgb_len(width, height)?;
    match format {
        PixelFormat::Rgb24 => {
            // Drivers may hand back a buffer padded past the image.
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels[..expected].to_vec())
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height, expected),
    }
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32, rgb_len: usize) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    let expected = (width as usize) * (height as usize) * 2;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(rgb_len);
    for macro_pixel in pixels[..expected].chunks_exact(4) {
        let u = macro_pixel[1] as f32 - 128.0;
        let v = macro_pixel[3] as f32 - 128.0;
        for y in [macro_pixel[0], macro_pixel[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_conversion_produces_gray() -> Result<()> {
        let yuyv = vec![128u8, 128, 128, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![128u8; 6]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_trims_padding() -> Result<()> {
        let mut pixels = vec![1u8; 9];
        pixels.extend_from_slice(&[0, 0]);
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, vec![1u8; 9]);
        assert!(normalize_to_rgb(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn recognises_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
