use serde::Deserialize;

use crate::detect::BoundingBox;
use crate::frame::RGB_CHANNELS;

/// Colour and stroke for bounding-box overlays.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnnotationStyle {
    pub color: [u8; 3],
    pub width: u32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            width: 2,
        }
    }
}

/// Draw hollow rectangles into a row-major RGB24 buffer, clipped to the frame.
pub(crate) fn draw_boxes(
    pixels: &mut [u8],
    width: u32,
    height: u32,
    boxes: &[BoundingBox],
    style: &AnnotationStyle,
) {
    for bbox in boxes {
        let x0 = bbox.x.min(width);
        let y0 = bbox.y.min(height);
        let x1 = bbox.x.saturating_add(bbox.width).min(width);
        let y1 = bbox.y.saturating_add(bbox.height).min(height);
        if x0 >= x1 || y0 >= y1 {
            continue;
        }
        let stroke = style.width.max(1);
        for y in y0..y1 {
            for x in x0..x1 {
                let on_edge = x < x0.saturating_add(stroke)
                    || x + stroke >= x1
                    || y < y0.saturating_add(stroke)
                    || y + stroke >= y1;
                if on_edge {
                    let idx = (y as usize * width as usize + x as usize) * RGB_CHANNELS;
                    pixels[idx..idx + RGB_CHANNELS].copy_from_slice(&style.color);
                }
            }
        }
    }
}
